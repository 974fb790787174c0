//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings with microsecond
//! precision (`2026-04-01T00:00:00.000000Z`) so that text comparison in SQL
//! orders them correctly. Anything finer than a microsecond is truncated, so
//! two instants less than a microsecond apart encode equal and a strict `<`
//! between them is false. Dates are `YYYY-MM-DD`. UUIDs are hyphenated
//! lowercase strings.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use kalas_core::{
  allergy::{AllergyFormat, AllergyRecord, StoredAllergy},
  party::{Invitation, Party, Rsvp},
  retention::{AuditEntry, StaleParty},
};
use tracing::warn;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Allergy columns ─────────────────────────────────────────────────────────

pub fn encode_format(f: AllergyFormat) -> String { f.to_string() }

/// A marker this build does not recognise is treated as no marker at all, so
/// the row is sniffed like legacy data instead of failing the whole read.
pub fn decode_format(s: &str) -> Option<AllergyFormat> {
  match AllergyFormat::parse(s) {
    Ok(format) => Some(format),
    Err(e) => {
      warn!(error = %e, "unrecognised allergy format marker, sniffing row");
      None
    }
  }
}

pub fn encode_allergies(v: &serde_json::Value) -> Result<String> {
  Ok(serde_json::to_string(v)?)
}

/// Rows written outside this store may hold bare text instead of JSON; keep
/// such text as a string value and let the cipher sort it out.
pub fn decode_allergies(s: String) -> serde_json::Value {
  serde_json::from_str(&s).unwrap_or(serde_json::Value::String(s))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `parties` row.
pub struct RawParty {
  pub party_id:   String,
  pub owner_id:   String,
  pub child_name: String,
  pub party_date: String,
  pub created_at: String,
  pub deleted_at: Option<String>,
}

impl RawParty {
  pub const COLUMNS: &'static str =
    "party_id, owner_id, child_name, party_date, created_at, deleted_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      party_id:   row.get(0)?,
      owner_id:   row.get(1)?,
      child_name: row.get(2)?,
      party_date: row.get(3)?,
      created_at: row.get(4)?,
      deleted_at: row.get(5)?,
    })
  }

  pub fn into_party(self) -> Result<Party> {
    Ok(Party {
      party_id:   decode_uuid(&self.party_id)?,
      owner_id:   decode_uuid(&self.owner_id)?,
      child_name: self.child_name,
      party_date: decode_date(&self.party_date)?,
      created_at: decode_dt(&self.created_at)?,
      deleted_at: self.deleted_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// Raw strings read from an `invitations` row.
pub struct RawInvitation {
  pub invitation_id: String,
  pub party_id:      String,
  pub token:         String,
  pub created_at:    String,
}

impl RawInvitation {
  pub fn into_invitation(self) -> Result<Invitation> {
    Ok(Invitation {
      invitation_id: decode_uuid(&self.invitation_id)?,
      party_id:      decode_uuid(&self.party_id)?,
      token:         self.token,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read from an `rsvp_responses` row.
pub struct RawRsvp {
  pub rsvp_id:       String,
  pub invitation_id: String,
  pub child_name:    String,
  pub attending:     bool,
  pub responded_at:  String,
}

impl RawRsvp {
  pub fn into_rsvp(self) -> Result<Rsvp> {
    Ok(Rsvp {
      rsvp_id:       decode_uuid(&self.rsvp_id)?,
      invitation_id: decode_uuid(&self.invitation_id)?,
      child_name:    self.child_name,
      attending:     self.attending,
      responded_at:  decode_dt(&self.responded_at)?,
    })
  }
}

/// Raw strings read from an `allergy_data` row.
pub struct RawAllergyRecord {
  pub rsvp_id:          String,
  pub allergy_format:   Option<String>,
  pub allergies:        String,
  pub other_dietary:    Option<String>,
  pub consent_given_at: String,
  pub auto_delete_at:   String,
  pub created_at:       String,
}

impl RawAllergyRecord {
  pub fn into_record(self) -> Result<AllergyRecord> {
    Ok(AllergyRecord {
      rsvp_id:          decode_uuid(&self.rsvp_id)?,
      stored:           StoredAllergy {
        format:        self.allergy_format.as_deref().and_then(decode_format),
        allergies:     decode_allergies(self.allergies),
        other_dietary: self.other_dietary,
      },
      consent_given_at: decode_dt(&self.consent_given_at)?,
      auto_delete_at:   decode_dt(&self.auto_delete_at)?,
      created_at:       decode_dt(&self.created_at)?,
    })
  }
}

/// `(party_id, party_date)` of a party picked by the stale-party sweep.
pub struct RawStaleParty {
  pub party_id:   String,
  pub party_date: String,
}

impl RawStaleParty {
  pub fn into_stale(self) -> Result<StaleParty> {
    Ok(StaleParty {
      party_id:   decode_uuid(&self.party_id)?,
      party_date: decode_date(&self.party_date)?,
    })
  }
}

/// Raw strings read from an `audit_log` row.
pub struct RawAuditEntry {
  pub audit_id:    String,
  pub action:      String,
  pub entity_type: String,
  pub entity_id:   String,
  pub details:     String,
  pub created_at:  String,
}

impl RawAuditEntry {
  pub fn into_entry(self) -> Result<AuditEntry> {
    Ok(AuditEntry {
      audit_id:    decode_uuid(&self.audit_id)?,
      action:      self.action,
      entity_type: self.entity_type,
      entity_id:   decode_uuid(&self.entity_id)?,
      details:     serde_json::from_str(&self.details)?,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}
