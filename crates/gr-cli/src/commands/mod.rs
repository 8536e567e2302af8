//! CLI command implementations

pub(crate) mod common;
pub(crate) mod gate;
pub(crate) mod init;
pub(crate) mod lineage;
pub(crate) mod meta;
pub(crate) mod run;
pub(crate) mod series;
pub(crate) mod source;
