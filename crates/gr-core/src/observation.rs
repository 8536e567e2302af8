//! Flags carried by standardized observations.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::CoreError;

/// Data-quality flag assigned by the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityFlag {
    #[default]
    Ok,
    Estimated,
    Provisional,
    Suspect,
    Missing,
}

impl QualityFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityFlag::Ok => "OK",
            QualityFlag::Estimated => "ESTIMATED",
            QualityFlag::Provisional => "PROVISIONAL",
            QualityFlag::Suspect => "SUSPECT",
            QualityFlag::Missing => "MISSING",
        }
    }
}

impl std::fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityFlag {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OK" => Ok(QualityFlag::Ok),
            "ESTIMATED" => Ok(QualityFlag::Estimated),
            "PROVISIONAL" => Ok(QualityFlag::Provisional),
            "SUSPECT" => Ok(QualityFlag::Suspect),
            "MISSING" => Ok(QualityFlag::Missing),
            _ => Err(CoreError::UnknownVariant {
                kind: "quality flag",
                value: s.to_string(),
            }),
        }
    }
}

/// Record-level validity asserted by the collector at write time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationFlag {
    #[default]
    Unchecked,
    Valid,
    Invalid,
}

impl ValidationFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationFlag::Unchecked => "UNCHECKED",
            ValidationFlag::Valid => "VALID",
            ValidationFlag::Invalid => "INVALID",
        }
    }
}

impl std::fmt::Display for ValidationFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationFlag {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UNCHECKED" => Ok(ValidationFlag::Unchecked),
            "VALID" => Ok(ValidationFlag::Valid),
            "INVALID" => Ok(ValidationFlag::Invalid),
            _ => Err(CoreError::UnknownVariant {
                kind: "validation flag",
                value: s.to_string(),
            }),
        }
    }
}

/// What an idempotent write did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpsertAction {
    /// No row existed under the natural key
    Inserted,
    /// An existing row's mutable fields were overwritten
    Updated,
    /// The incoming value matched the current revision; nothing written
    Unchanged,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_flag_parse() {
        assert_eq!("estimated".parse::<QualityFlag>().unwrap(), QualityFlag::Estimated);
        assert_eq!(QualityFlag::default(), QualityFlag::Ok);
        assert!("bogus".parse::<QualityFlag>().is_err());
    }

    #[test]
    fn test_validation_flag_round_trip() {
        for flag in [
            ValidationFlag::Unchecked,
            ValidationFlag::Valid,
            ValidationFlag::Invalid,
        ] {
            assert_eq!(flag.as_str().parse::<ValidationFlag>().unwrap(), flag);
        }
    }
}
