//! Error types for the allergy cipher.

use thiserror::Error;

/// Why the configured key could not be turned into a cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KeyError {
  #[error("allergy encryption key is not configured")]
  Missing,

  #[error("allergy encryption key is not valid base64")]
  NotBase64,

  #[error("allergy encryption key must be 32 bytes, got {0}")]
  WrongLength(usize),
}

#[derive(Debug, Error)]
pub enum CipherError {
  #[error("configuration error: {0}")]
  Key(#[from] KeyError),

  #[error("AES-GCM encryption failed")]
  Seal,

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = CipherError> = std::result::Result<T, E>;
