//! Error types for `kalas-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown allergy tag: {0:?}")]
  UnknownAllergyTag(String),

  #[error("allergy data was submitted without guardian consent")]
  ConsentMissing,

  #[error("unknown allergy format marker: {0:?}")]
  UnknownFormat(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
