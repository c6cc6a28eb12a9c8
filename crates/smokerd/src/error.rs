//! The daemon's component error type.
//!
//! `Range` and `Config` are the caller's fault and surface as HTTP 400 at
//! the API layer; `NotReady` and `Hardware` are the cooker's fault and
//! surface as 500. A recoverable control-loop error never exits the
//! process; only init-time failures abort startup.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A parameter fell outside its allowed interval.
    #[error("{0}")]
    Range(String),

    /// An operation ran before its prerequisites were configured.
    #[error("{0}")]
    Config(String),

    /// A probe was read before its first good sample.
    #[error("probe has not taken a reading yet")]
    NotReady,

    /// A pin backend call failed.
    #[error("hardware fault: {0}")]
    Hardware(#[from] sbc_io::IoError),
}

pub type Result<T> = std::result::Result<T, Error>;
