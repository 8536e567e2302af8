//! Error types for gr-core

use thiserror::Error;

/// Core error type for Granary
#[derive(Error, Debug)]
pub enum CoreError {
    /// GR001: Configuration file not found
    #[error("[GR001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// GR002: Invalid configuration value
    #[error("[GR002] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// GR003: An identifier that must be non-empty was empty or padded
    #[error("[GR003] Invalid {kind}: {reason}")]
    InvalidName { kind: &'static str, reason: String },

    /// GR004: A persisted or user-supplied enum value is not recognised
    #[error("[GR004] Unknown {kind} value '{value}'")]
    UnknownVariant { kind: &'static str, value: String },

    /// GR005: A state machine transition that is not in the transition table
    #[error("[GR005] Illegal {machine} transition: {from} -> {to}")]
    IllegalTransition {
        machine: &'static str,
        from: String,
        to: String,
    },

    /// GR006: Lineage node string could not be parsed
    #[error("[GR006] Invalid lineage node '{spec}': {reason}")]
    InvalidNode { spec: String, reason: String },

    /// GR007: IO error with file path context
    #[error("[GR007] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// GR008: YAML parse error
    #[error("[GR008] Config parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
