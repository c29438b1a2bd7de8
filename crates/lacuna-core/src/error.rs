use thiserror::Error;

use crate::settings::SettingsError;

#[derive(Error, Debug)]
pub enum LacunaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Invalid mask: {0}")]
    InvalidMask(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(#[from] SettingsError),

    #[error("Invalid patches stream: {0}")]
    InvalidPatchesStream(String),

    #[error("Compute error: {0}")]
    Compute(String),
}

pub type Result<T> = std::result::Result<T, LacunaError>;
