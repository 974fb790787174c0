//! The owner's guest list, with allergy data decoded for display.

use axum::{
  Json,
  extract::{Path, State},
};
use chrono::{DateTime, Utc};
use kalas_core::allergy::DecodedAllergies;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, Backend, auth::ServiceCaller, error::Error};

#[derive(Debug, Serialize, Deserialize)]
pub struct GuestView {
  pub rsvp_id:        Uuid,
  pub child_name:     String,
  pub attending:      bool,
  pub responded_at:   DateTime<Utc>,
  /// `None` when the guardian disclosed nothing or the record has expired.
  pub allergies:      Option<DecodedAllergies>,
  pub auto_delete_at: Option<DateTime<Utc>>,
}

/// `GET /api/parties/{party_id}/guests`
///
/// A soft-deleted party is gone as far as the API is concerned.
pub async fn list<S: Backend>(
  _: ServiceCaller,
  State(state): State<AppState<S>>,
  Path(party_id): Path<Uuid>,
) -> Result<Json<Vec<GuestView>>, Error> {
  state
    .store
    .get_party(party_id)
    .await
    .map_err(Error::store)?
    .filter(|p| p.deleted_at.is_none())
    .ok_or(Error::NotFound("party"))?;

  let entries = state.store.list_guests(party_id).await.map_err(Error::store)?;

  let mut guests = Vec::with_capacity(entries.len());
  for entry in entries {
    let allergies = entry
      .allergy
      .as_ref()
      .map(|record| state.cipher.decode_stored(&record.stored))
      .transpose()?;
    guests.push(GuestView {
      rsvp_id:        entry.rsvp.rsvp_id,
      child_name:     entry.rsvp.child_name,
      attending:      entry.rsvp.attending,
      responded_at:   entry.rsvp.responded_at,
      allergies,
      auto_delete_at: entry.allergy.map(|record| record.auto_delete_at),
    });
  }

  Ok(Json(guests))
}
