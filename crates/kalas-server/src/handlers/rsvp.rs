//! RSVP intake: a guardian answers an invitation and may disclose allergies.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use chrono::Utc;
use kalas_core::{
  allergy::{AllergyDisclosure, RsvpAllergy},
  party::NewRsvp,
  retention::allergy_deadline,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{AppState, Backend, auth::ServiceCaller, error::Error};

#[derive(Debug, Deserialize)]
pub struct RsvpRequest {
  pub child_name:    String,
  pub attending:     bool,
  #[serde(default)]
  pub allergies:     Vec<String>,
  #[serde(default)]
  pub other_dietary: Option<String>,
  /// The storage consent checkbox.
  #[serde(default)]
  pub consent:       bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RsvpCreated {
  pub rsvp_id:        Uuid,
  pub allergy_stored: bool,
}

/// `POST /api/invitations/{token}/rsvps`
///
/// Everything is validated and encoded before the first write, and the RSVP
/// and its allergy record are written in one store call, so a rejected or
/// failed request leaves nothing behind.
pub async fn submit<S: Backend>(
  _: ServiceCaller,
  State(state): State<AppState<S>>,
  Path(token): Path<String>,
  Json(body): Json<RsvpRequest>,
) -> Result<(StatusCode, Json<RsvpCreated>), Error> {
  let invitation = state
    .store
    .find_invitation(&token)
    .await
    .map_err(Error::store)?
    .ok_or(Error::NotFound("invitation"))?;

  let party = state
    .store
    .get_party(invitation.party_id)
    .await
    .map_err(Error::store)?
    .filter(|p| p.deleted_at.is_none())
    .ok_or(Error::NotFound("party"))?;

  let child_name = body.child_name.trim().to_owned();
  if child_name.is_empty() {
    return Err(Error::BadRequest("child_name must not be empty".into()));
  }

  let disclosure = AllergyDisclosure::from_raw(&body.allergies, body.other_dietary, body.consent)?;
  let encoded = if disclosure.requires_record()? {
    Some(
      state
        .cipher
        .encode(&disclosure.tag_strings(), disclosure.other_dietary_text())?,
    )
  } else {
    None
  };

  let input = NewRsvp {
    invitation_id: invitation.invitation_id,
    child_name,
    attending: body.attending,
  };

  let allergy_stored = encoded.is_some();
  let rsvp = match encoded {
    None => state.store.record_rsvp(input).await.map_err(Error::store)?,
    Some(payload) => {
      let format = payload.format;
      let entry = state
        .store
        .record_rsvp_with_allergy(input, RsvpAllergy {
          stored:           payload.into(),
          consent_given_at: Utc::now(),
          auto_delete_at:   allergy_deadline(party.party_date),
        })
        .await
        .map_err(Error::store)?;
      info!(rsvp_id = %entry.rsvp.rsvp_id, %format, "allergy record stored");
      entry.rsvp
    }
  };

  Ok((
    StatusCode::CREATED,
    Json(RsvpCreated { rsvp_id: rsvp.rsvp_id, allergy_stored }),
  ))
}
