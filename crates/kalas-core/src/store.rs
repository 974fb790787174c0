//! Store traits and supporting types.
//!
//! The traits are implemented by storage backends (e.g. `kalas-store-sqlite`).
//! The sweeper and the HTTP layer depend on these abstractions, not on any
//! concrete backend.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
  allergy::{AllergyRecord, NewAllergyRecord, RsvpAllergy},
  party::{GuestEntry, Invitation, InvitedGuest, NewParty, NewRsvp, Party, PartyImage, Rsvp},
  retention::{AuditEntry, StaleParty},
};

// ─── Retention ───────────────────────────────────────────────────────────────

/// Delete-by-predicate primitives used by the
/// [`RetentionSweeper`](crate::retention::RetentionSweeper).
pub trait RetentionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Delete every allergy record with `auto_delete_at < now` and return how
  /// many rows went. Touches no other table.
  fn delete_expired_allergy_records(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Delete every party that is not soft-deleted and whose date is strictly
  /// before `cutoff`, cascading to all dependent rows.
  ///
  /// Selection and deletion happen atomically; the returned list is exactly
  /// what was deleted.
  fn delete_stale_parties(
    &self,
    cutoff: NaiveDate,
  ) -> impl Future<Output = Result<Vec<StaleParty>, Self::Error>> + Send + '_;
}

/// Append-only audit trail.
pub trait AuditLog: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn record_audit(
    &self,
    entry: AuditEntry,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Parties and guests ──────────────────────────────────────────────────────

/// The persistence collaborator used by RSVP intake and the guest list.
pub trait PartyStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn create_party(
    &self,
    input: NewParty,
  ) -> impl Future<Output = Result<Party, Self::Error>> + Send + '_;

  /// Retrieve a party by UUID, soft-deleted or not. Returns `None` if absent.
  fn get_party(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Party>, Self::Error>> + Send + '_;

  /// Mark a party as deleted without removing any rows. Returns `false` if
  /// the party does not exist or was already marked.
  fn soft_delete_party(
    &self,
    id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn create_invitation(
    &self,
    party_id: Uuid,
  ) -> impl Future<Output = Result<Invitation, Self::Error>> + Send + '_;

  fn add_invited_guest(
    &self,
    party_id: Uuid,
    name: String,
    phone: Option<String>,
  ) -> impl Future<Output = Result<InvitedGuest, Self::Error>> + Send + '_;

  fn add_party_image(
    &self,
    party_id: Uuid,
    storage_path: String,
  ) -> impl Future<Output = Result<PartyImage, Self::Error>> + Send + '_;

  /// Record an answer to an invitation. Fails if the invitation is unknown.
  fn record_rsvp(
    &self,
    input: NewRsvp,
  ) -> impl Future<Output = Result<Rsvp, Self::Error>> + Send + '_;

  /// Record an answer together with its allergy record. Both rows are
  /// written or neither is.
  fn record_rsvp_with_allergy(
    &self,
    input: NewRsvp,
    allergy: RsvpAllergy,
  ) -> impl Future<Output = Result<GuestEntry, Self::Error>> + Send + '_;

  /// Look up an invitation by the token from its QR code.
  fn find_invitation<'a>(
    &'a self,
    token: &'a str,
  ) -> impl Future<Output = Result<Option<Invitation>, Self::Error>> + Send + 'a;

  /// Persist an allergy record. Records are written once; a second record
  /// for the same RSVP is an error.
  fn save_allergy_record(
    &self,
    input: NewAllergyRecord,
  ) -> impl Future<Output = Result<AllergyRecord, Self::Error>> + Send + '_;

  fn get_allergy_record(
    &self,
    rsvp_id: Uuid,
  ) -> impl Future<Output = Result<Option<AllergyRecord>, Self::Error>> + Send + '_;

  /// Every RSVP for a party, oldest first, with its stored allergy record.
  fn list_guests(
    &self,
    party_id: Uuid,
  ) -> impl Future<Output = Result<Vec<GuestEntry>, Self::Error>> + Send + '_;
}
