//! Retention policy and the sweeper that enforces it.
//!
//! Two independent axes:
//!
//! - allergy records die at their own `auto_delete_at` (party date + 7 days);
//! - whole parties die 30 days after the party date, taking every dependent
//!   row with them through the store's cascades.
//!
//! Both sweeps are stateless and idempotent. Scheduling is somebody else's
//! job; the HTTP layer exposes one endpoint per sweep for a daily cron.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::store::{AuditLog, RetentionStore};

// ─── Policy ──────────────────────────────────────────────────────────────────

/// Days after the party date that allergy data is kept.
pub const ALLERGY_RETENTION_DAYS: u64 = 7;

/// Days after the party date that the whole party is kept.
pub const PARTY_RETENTION_DAYS: u32 = 30;

/// The `auto_delete_at` stamped on an allergy record for a party on
/// `party_date`: midnight UTC, seven days after the party.
pub fn allergy_deadline(party_date: NaiveDate) -> DateTime<Utc> {
  party_date
    .checked_add_days(Days::new(ALLERGY_RETENTION_DAYS))
    .unwrap_or(NaiveDate::MAX)
    .and_time(NaiveTime::MIN)
    .and_utc()
}

/// Parties dated strictly before the returned date are stale.
pub fn stale_party_cutoff(now: DateTime<Utc>, retention_days: u32) -> NaiveDate {
  now
    .date_naive()
    .checked_sub_days(Days::new(u64::from(retention_days)))
    .unwrap_or(NaiveDate::MIN)
}

// ─── Audit ───────────────────────────────────────────────────────────────────

/// A party removed by [`RetentionStore::delete_stale_parties`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleParty {
  pub party_id:   Uuid,
  pub party_date: NaiveDate,
}

/// One row of the audit trail. Audit rows reference their entity by id only
/// so they outlive it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
  pub audit_id:    Uuid,
  pub action:      String,
  pub entity_type: String,
  pub entity_id:   Uuid,
  pub details:     serde_json::Value,
  pub created_at:  DateTime<Utc>,
}

impl AuditEntry {
  /// The entry written for a party removed because its retention ran out.
  pub fn party_expired(party: &StaleParty, at: DateTime<Utc>) -> Self {
    Self {
      audit_id:    Uuid::new_v4(),
      action:      "party_deleted".to_owned(),
      entity_type: "party".to_owned(),
      entity_id:   party.party_id,
      details:     serde_json::json!({
        "reason":     "expired",
        "party_date": party.party_date,
      }),
      created_at:  at,
    }
  }
}

/// Outcome of a best-effort side-channel write.
///
/// Returned instead of a `Result` so that not propagating the failure is
/// visible at the call site. Dropping it is fine; the failure is already
/// logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
  Done,
  Dropped(String),
}

impl SideEffect {
  pub fn settle<E: std::fmt::Display>(what: &str, result: Result<(), E>) -> Self {
    match result {
      Ok(()) => Self::Done,
      Err(e) => {
        warn!(error = %e, "{what} failed; continuing");
        Self::Dropped(e.to_string())
      }
    }
  }

  pub fn is_done(&self) -> bool { matches!(self, Self::Done) }
}

// ─── Sweeper ─────────────────────────────────────────────────────────────────

/// Result of one stale-party sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartySweep {
  pub cutoff:         NaiveDate,
  pub deleted:        u64,
  pub audit_failures: u64,
}

/// Applies the retention policy through a store.
pub struct RetentionSweeper<'a, S> {
  store:                &'a S,
  party_retention_days: u32,
}

impl<'a, S> RetentionSweeper<'a, S>
where
  S: RetentionStore + AuditLog,
{
  pub fn new(store: &'a S) -> Self {
    Self { store, party_retention_days: PARTY_RETENTION_DAYS }
  }

  pub fn with_party_retention_days(mut self, days: u32) -> Self {
    self.party_retention_days = days;
    self
  }

  /// Delete allergy records whose deadline is strictly before `now`.
  ///
  /// No audit entry is written for these.
  pub async fn sweep_allergy_records(
    &self,
    now: DateTime<Utc>,
  ) -> Result<u64, <S as RetentionStore>::Error> {
    let deleted = self.store.delete_expired_allergy_records(now).await?;
    info!(deleted, %now, "allergy retention sweep finished");
    Ok(deleted)
  }

  /// Delete parties dated before `now − retention days`, then write one
  /// audit entry per party.
  ///
  /// An audit failure is counted and logged but never undoes or aborts the
  /// deletion.
  pub async fn sweep_stale_parties(
    &self,
    now: DateTime<Utc>,
  ) -> Result<PartySweep, <S as RetentionStore>::Error> {
    let cutoff = stale_party_cutoff(now, self.party_retention_days);
    let deleted = self.store.delete_stale_parties(cutoff).await?;

    let mut audit_failures = 0;
    for party in &deleted {
      let outcome = SideEffect::settle(
        "audit write for expired party",
        self.store.record_audit(AuditEntry::party_expired(party, now)).await,
      );
      if !outcome.is_done() {
        audit_failures += 1;
      }
    }

    let report = PartySweep {
      cutoff,
      deleted: deleted.len() as u64,
      audit_failures,
    };
    info!(
      deleted = report.deleted,
      audit_failures,
      %cutoff,
      "party retention sweep finished"
    );
    Ok(report)
  }
}
