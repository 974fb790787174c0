//! Error type for `kalas-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("party not found: {0}")]
  PartyNotFound(uuid::Uuid),

  #[error("invitation not found: {0}")]
  InvitationNotFound(uuid::Uuid),

  #[error("rsvp not found: {0}")]
  RsvpNotFound(uuid::Uuid),

  /// Allergy records are written once per RSVP.
  #[error("rsvp {0} already has an allergy record")]
  AllergyRecordExists(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
