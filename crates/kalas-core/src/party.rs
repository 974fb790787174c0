//! Party aggregate: the party and the rows that hang off it.
//!
//! Everything here is deleted together with its party through the store's
//! foreign-key cascades.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::allergy::AllergyRecord;

/// A birthday party owned by one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
  pub party_id:   Uuid,
  pub owner_id:   Uuid,
  pub child_name: String,
  pub party_date: NaiveDate,
  pub created_at: DateTime<Utc>,
  /// Set when the owner removes the party; the row stays until the sweeper
  /// or an explicit purge takes it.
  pub deleted_at: Option<DateTime<Utc>>,
}

/// Input to [`crate::store::PartyStore::create_party`].
#[derive(Debug, Clone)]
pub struct NewParty {
  pub owner_id:   Uuid,
  pub child_name: String,
  pub party_date: NaiveDate,
}

/// The QR-code invitation guests open to answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
  pub invitation_id: Uuid,
  pub party_id:      Uuid,
  /// Opaque token embedded in the QR code.
  pub token:         String,
  pub created_at:    DateTime<Utc>,
}

/// A child on the owner's guest list, before or without an RSVP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitedGuest {
  pub guest_id:   Uuid,
  pub party_id:   Uuid,
  pub name:       String,
  pub phone:      Option<String>,
  pub created_at: DateTime<Utc>,
}

/// A generated or uploaded invitation image; bytes live in object storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyImage {
  pub image_id:     Uuid,
  pub party_id:     Uuid,
  pub storage_path: String,
  pub created_at:   DateTime<Utc>,
}

/// One answer to an invitation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rsvp {
  pub rsvp_id:       Uuid,
  pub invitation_id: Uuid,
  pub child_name:    String,
  pub attending:     bool,
  pub responded_at:  DateTime<Utc>,
}

/// Input to [`crate::store::PartyStore::record_rsvp`].
#[derive(Debug, Clone)]
pub struct NewRsvp {
  pub invitation_id: Uuid,
  pub child_name:    String,
  pub attending:     bool,
}

/// An RSVP joined with its (still encoded) allergy record, if any.
#[derive(Debug, Clone)]
pub struct GuestEntry {
  pub rsvp:    Rsvp,
  pub allergy: Option<AllergyRecord>,
}
