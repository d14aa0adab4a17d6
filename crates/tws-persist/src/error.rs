//! Error types for persistence.

use thiserror::Error;

/// Errors that can occur while reading, writing or decoding slots.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported envelope format {found} (newest supported is {supported})")]
    UnsupportedFormat { found: u32, supported: u32 },

    #[error("Checksum mismatch: stored {stored}, computed {computed}")]
    ChecksumMismatch { stored: String, computed: String },

    #[error("Envelope for {found} stored in slot {slot}")]
    SlotMismatch { slot: String, found: String },

    #[error("Malformed slot blob: {0}")]
    Malformed(String),

    #[error("Invalid slot name: {0}")]
    InvalidSlot(String),
}

pub type Result<T> = std::result::Result<T, PersistError>;
