//! [`SqliteStore`], the SQLite implementation of the KalasKoll store traits.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::OptionalExtension as _;
use tracing::debug;
use uuid::Uuid;

use kalas_core::{
  allergy::{AllergyRecord, NewAllergyRecord, RsvpAllergy},
  party::{GuestEntry, Invitation, InvitedGuest, NewParty, NewRsvp, Party, PartyImage, Rsvp},
  retention::{AuditEntry, StaleParty},
  store::{AuditLog, PartyStore, RetentionStore},
};

use crate::{
  encode::{
    encode_allergies, encode_date, encode_dt, encode_format, encode_uuid, RawAllergyRecord,
    RawAuditEntry, RawInvitation, RawParty, RawRsvp, RawStaleParty,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A KalasKoll store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

/// What happened to an allergy-record insert.
enum AllergyInsert {
  Saved,
  MissingRsvp,
  Duplicate,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Audit entries about one entity, oldest first.
  pub async fn audit_entries(&self, entity_id: Uuid) -> Result<Vec<AuditEntry>> {
    let id_str = encode_uuid(entity_id);

    let raws: Vec<RawAuditEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT audit_id, action, entity_type, entity_id, details, created_at
           FROM audit_log WHERE entity_id = ?1
           ORDER BY created_at, audit_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawAuditEntry {
              audit_id:    row.get(0)?,
              action:      row.get(1)?,
              entity_type: row.get(2)?,
              entity_id:   row.get(3)?,
              details:     row.get(4)?,
              created_at:  row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAuditEntry::into_entry).collect()
  }

  /// Number of rows in `table`; test helper for checking cascades.
  #[cfg(test)]
  pub(crate) async fn count_rows(&self, table: &'static str) -> Result<i64> {
    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?)
      })
      .await?;
    Ok(n)
  }

  /// Run arbitrary SQL; test helper for shaping rows the API cannot write.
  #[cfg(test)]
  pub(crate) async fn execute_raw(&self, sql: impl Into<String>) -> Result<()> {
    let sql = sql.into();
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Insert a row owned by a party, failing with [`Error::PartyNotFound`] if
  /// the party is missing.
  async fn insert_party_child(
    &self,
    party_id: Uuid,
    sql: &'static str,
    params: Vec<Option<String>>,
  ) -> Result<()> {
    let party_id_str = encode_uuid(party_id);

    let found = self
      .conn
      .call(move |conn| {
        let exists = conn
          .query_row(
            "SELECT 1 FROM parties WHERE party_id = ?1",
            rusqlite::params![party_id_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok(false);
        }
        conn.execute(sql, rusqlite::params_from_iter(params))?;
        Ok(true)
      })
      .await?;

    if found { Ok(()) } else { Err(Error::PartyNotFound(party_id)) }
  }
}

// ─── Row writers ─────────────────────────────────────────────────────────────

fn new_rsvp(input: NewRsvp) -> Rsvp {
  Rsvp {
    rsvp_id:       Uuid::new_v4(),
    invitation_id: input.invitation_id,
    child_name:    input.child_name,
    attending:     input.attending,
    responded_at:  Utc::now(),
  }
}

fn new_allergy_record(input: NewAllergyRecord) -> AllergyRecord {
  AllergyRecord {
    rsvp_id:          input.rsvp_id,
    stored:           input.stored,
    consent_given_at: input.consent_given_at,
    auto_delete_at:   input.auto_delete_at,
    created_at:       Utc::now(),
  }
}

/// An `rsvp_responses` row, encoded and ready to insert.
struct RsvpRow {
  rsvp_id:       String,
  invitation_id: String,
  child_name:    String,
  attending:     bool,
  responded_at:  String,
}

impl RsvpRow {
  fn new(rsvp: &Rsvp) -> Self {
    Self {
      rsvp_id:       encode_uuid(rsvp.rsvp_id),
      invitation_id: encode_uuid(rsvp.invitation_id),
      child_name:    rsvp.child_name.clone(),
      attending:     rsvp.attending,
      responded_at:  encode_dt(rsvp.responded_at),
    }
  }

  /// Returns `false`, writing nothing, if the invitation does not exist.
  fn insert(&self, conn: &rusqlite::Connection) -> rusqlite::Result<bool> {
    let exists = conn
      .query_row(
        "SELECT 1 FROM invitations WHERE invitation_id = ?1",
        rusqlite::params![self.invitation_id],
        |_| Ok(true),
      )
      .optional()?
      .unwrap_or(false);
    if !exists {
      return Ok(false);
    }
    conn.execute(
      "INSERT INTO rsvp_responses (rsvp_id, invitation_id, child_name, attending, responded_at)
       VALUES (?1, ?2, ?3, ?4, ?5)",
      rusqlite::params![
        self.rsvp_id,
        self.invitation_id,
        self.child_name,
        self.attending,
        self.responded_at,
      ],
    )?;
    Ok(true)
  }
}

/// An `allergy_data` row, encoded and ready to insert.
struct AllergyRow {
  rsvp_id:          String,
  allergy_format:   Option<String>,
  allergies:        String,
  other_dietary:    Option<String>,
  consent_given_at: String,
  auto_delete_at:   String,
  created_at:       String,
}

impl AllergyRow {
  fn new(record: &AllergyRecord) -> Result<Self> {
    Ok(Self {
      rsvp_id:          encode_uuid(record.rsvp_id),
      allergy_format:   record.stored.format.map(encode_format),
      allergies:        encode_allergies(&record.stored.allergies)?,
      other_dietary:    record.stored.other_dietary.clone(),
      consent_given_at: encode_dt(record.consent_given_at),
      auto_delete_at:   encode_dt(record.auto_delete_at),
      created_at:       encode_dt(record.created_at),
    })
  }

  /// Returns `false`, writing nothing, if the RSVP already has a record.
  fn insert(&self, conn: &rusqlite::Connection) -> rusqlite::Result<bool> {
    let inserted = conn.execute(
      "INSERT OR IGNORE INTO allergy_data (
         rsvp_id, allergy_format, allergies, other_dietary,
         consent_given_at, auto_delete_at, created_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
      rusqlite::params![
        self.rsvp_id,
        self.allergy_format,
        self.allergies,
        self.other_dietary,
        self.consent_given_at,
        self.auto_delete_at,
        self.created_at,
      ],
    )?;
    Ok(inserted == 1)
  }
}

// ─── RetentionStore impl ─────────────────────────────────────────────────────

impl RetentionStore for SqliteStore {
  type Error = Error;

  async fn delete_expired_allergy_records(&self, now: DateTime<Utc>) -> Result<u64> {
    let now_str = encode_dt(now);

    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM allergy_data WHERE auto_delete_at < ?1",
          rusqlite::params![now_str],
        )?)
      })
      .await?;

    debug!(deleted, %now, "expired allergy rows deleted");
    Ok(deleted as u64)
  }

  async fn delete_stale_parties(&self, cutoff: NaiveDate) -> Result<Vec<StaleParty>> {
    let cutoff_str = encode_date(cutoff);

    let raws: Vec<RawStaleParty> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let rows = {
          let mut stmt = tx.prepare(
            "SELECT party_id, party_date FROM parties
             WHERE deleted_at IS NULL AND party_date < ?1",
          )?;
          stmt
            .query_map(rusqlite::params![cutoff_str], |row| {
              Ok(RawStaleParty { party_id: row.get(0)?, party_date: row.get(1)? })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        // Same predicate inside the same transaction: the rows selected above
        // are exactly the rows deleted here.
        tx.execute(
          "DELETE FROM parties WHERE deleted_at IS NULL AND party_date < ?1",
          rusqlite::params![cutoff_str],
        )?;
        tx.commit()?;
        Ok(rows)
      })
      .await?;

    debug!(deleted = raws.len(), %cutoff, "stale parties deleted");
    raws.into_iter().map(RawStaleParty::into_stale).collect()
  }
}

// ─── AuditLog impl ───────────────────────────────────────────────────────────

impl AuditLog for SqliteStore {
  type Error = Error;

  async fn record_audit(&self, entry: AuditEntry) -> Result<()> {
    let audit_id_str  = encode_uuid(entry.audit_id);
    let entity_id_str = encode_uuid(entry.entity_id);
    let details_str   = serde_json::to_string(&entry.details)?;
    let at_str        = encode_dt(entry.created_at);
    let action        = entry.action;
    let entity_type   = entry.entity_type;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO audit_log (audit_id, action, entity_type, entity_id, details, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![audit_id_str, action, entity_type, entity_id_str, details_str, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── PartyStore impl ─────────────────────────────────────────────────────────

impl PartyStore for SqliteStore {
  type Error = Error;

  // ── Parties ───────────────────────────────────────────────────────────────

  async fn create_party(&self, input: NewParty) -> Result<Party> {
    let party = Party {
      party_id:   Uuid::new_v4(),
      owner_id:   input.owner_id,
      child_name: input.child_name,
      party_date: input.party_date,
      created_at: Utc::now(),
      deleted_at: None,
    };

    let id_str    = encode_uuid(party.party_id);
    let owner_str = encode_uuid(party.owner_id);
    let name      = party.child_name.clone();
    let date_str  = encode_date(party.party_date);
    let at_str    = encode_dt(party.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO parties (party_id, owner_id, child_name, party_date, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, owner_str, name, date_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(party)
  }

  async fn get_party(&self, id: Uuid) -> Result<Option<Party>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawParty> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {} FROM parties WHERE party_id = ?1", RawParty::COLUMNS),
            rusqlite::params![id_str],
            RawParty::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawParty::into_party).transpose()
  }

  async fn soft_delete_party(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(at);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE parties SET deleted_at = ?2 WHERE party_id = ?1 AND deleted_at IS NULL",
          rusqlite::params![id_str, at_str],
        )?)
      })
      .await?;

    Ok(changed == 1)
  }

  // ── Rows hanging off a party ──────────────────────────────────────────────

  async fn create_invitation(&self, party_id: Uuid) -> Result<Invitation> {
    let invitation = Invitation {
      invitation_id: Uuid::new_v4(),
      party_id,
      token:         Uuid::new_v4().simple().to_string(),
      created_at:    Utc::now(),
    };

    self
      .insert_party_child(
        party_id,
        "INSERT INTO invitations (invitation_id, party_id, token, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        vec![
          Some(encode_uuid(invitation.invitation_id)),
          Some(encode_uuid(party_id)),
          Some(invitation.token.clone()),
          Some(encode_dt(invitation.created_at)),
        ],
      )
      .await?;

    Ok(invitation)
  }

  async fn add_invited_guest(
    &self,
    party_id: Uuid,
    name:     String,
    phone:    Option<String>,
  ) -> Result<InvitedGuest> {
    let guest = InvitedGuest {
      guest_id: Uuid::new_v4(),
      party_id,
      name,
      phone,
      created_at: Utc::now(),
    };

    self
      .insert_party_child(
        party_id,
        "INSERT INTO invited_guests (guest_id, party_id, name, phone, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        vec![
          Some(encode_uuid(guest.guest_id)),
          Some(encode_uuid(party_id)),
          Some(guest.name.clone()),
          guest.phone.clone(),
          Some(encode_dt(guest.created_at)),
        ],
      )
      .await?;

    Ok(guest)
  }

  async fn add_party_image(&self, party_id: Uuid, storage_path: String) -> Result<PartyImage> {
    let image = PartyImage {
      image_id: Uuid::new_v4(),
      party_id,
      storage_path,
      created_at: Utc::now(),
    };

    self
      .insert_party_child(
        party_id,
        "INSERT INTO party_images (image_id, party_id, storage_path, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        vec![
          Some(encode_uuid(image.image_id)),
          Some(encode_uuid(party_id)),
          Some(image.storage_path.clone()),
          Some(encode_dt(image.created_at)),
        ],
      )
      .await?;

    Ok(image)
  }

  // ── RSVPs ─────────────────────────────────────────────────────────────────

  async fn find_invitation(&self, token: &str) -> Result<Option<Invitation>> {
    let token = token.to_owned();

    let raw: Option<RawInvitation> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT invitation_id, party_id, token, created_at
             FROM invitations WHERE token = ?1",
            rusqlite::params![token],
            |row| {
              Ok(RawInvitation {
                invitation_id: row.get(0)?,
                party_id:      row.get(1)?,
                token:         row.get(2)?,
                created_at:    row.get(3)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawInvitation::into_invitation).transpose()
  }

  async fn record_rsvp(&self, input: NewRsvp) -> Result<Rsvp> {
    let rsvp = new_rsvp(input);
    let row = RsvpRow::new(&rsvp);

    let found = self.conn.call(move |conn| Ok(row.insert(conn)?)).await?;

    if !found {
      return Err(Error::InvitationNotFound(rsvp.invitation_id));
    }
    Ok(rsvp)
  }

  async fn record_rsvp_with_allergy(
    &self,
    input:   NewRsvp,
    allergy: RsvpAllergy,
  ) -> Result<GuestEntry> {
    let rsvp = new_rsvp(input);
    let record = new_allergy_record(allergy.bind(rsvp.rsvp_id));
    let rsvp_row = RsvpRow::new(&rsvp);
    let allergy_row = AllergyRow::new(&record)?;

    let found = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !rsvp_row.insert(&tx)? {
          return Ok(false);
        }
        // The RSVP is brand new, so there is no record to collide with.
        allergy_row.insert(&tx)?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !found {
      return Err(Error::InvitationNotFound(rsvp.invitation_id));
    }
    Ok(GuestEntry { rsvp, allergy: Some(record) })
  }

  // ── Allergy records ───────────────────────────────────────────────────────

  async fn save_allergy_record(&self, input: NewAllergyRecord) -> Result<AllergyRecord> {
    let record = new_allergy_record(input);
    let row = AllergyRow::new(&record)?;

    let outcome = self
      .conn
      .call(move |conn| {
        let exists = conn
          .query_row(
            "SELECT 1 FROM rsvp_responses WHERE rsvp_id = ?1",
            rusqlite::params![row.rsvp_id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok(AllergyInsert::MissingRsvp);
        }
        Ok(if row.insert(conn)? { AllergyInsert::Saved } else { AllergyInsert::Duplicate })
      })
      .await?;

    match outcome {
      AllergyInsert::Saved => Ok(record),
      AllergyInsert::MissingRsvp => Err(Error::RsvpNotFound(record.rsvp_id)),
      AllergyInsert::Duplicate => Err(Error::AllergyRecordExists(record.rsvp_id)),
    }
  }

  async fn get_allergy_record(&self, rsvp_id: Uuid) -> Result<Option<AllergyRecord>> {
    let id_str = encode_uuid(rsvp_id);

    let raw: Option<RawAllergyRecord> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT rsvp_id, allergy_format, allergies, other_dietary,
                    consent_given_at, auto_delete_at, created_at
             FROM allergy_data WHERE rsvp_id = ?1",
            rusqlite::params![id_str],
            |row| {
              Ok(RawAllergyRecord {
                rsvp_id:          row.get(0)?,
                allergy_format:   row.get(1)?,
                allergies:        row.get(2)?,
                other_dietary:    row.get(3)?,
                consent_given_at: row.get(4)?,
                auto_delete_at:   row.get(5)?,
                created_at:       row.get(6)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawAllergyRecord::into_record).transpose()
  }

  async fn list_guests(&self, party_id: Uuid) -> Result<Vec<GuestEntry>> {
    let party_id_str = encode_uuid(party_id);

    let raws: Vec<(RawRsvp, Option<RawAllergyRecord>)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT
             r.rsvp_id, r.invitation_id, r.child_name, r.attending, r.responded_at,
             a.rsvp_id, a.allergy_format, a.allergies, a.other_dietary,
             a.consent_given_at, a.auto_delete_at, a.created_at
           FROM rsvp_responses r
           JOIN invitations i       ON i.invitation_id = r.invitation_id
           LEFT JOIN allergy_data a ON a.rsvp_id       = r.rsvp_id
           WHERE i.party_id = ?1
           ORDER BY r.responded_at, r.rsvp_id",
        )?;

        let rows = stmt
          .query_map(rusqlite::params![party_id_str], |row| {
            let rsvp = RawRsvp {
              rsvp_id:       row.get(0)?,
              invitation_id: row.get(1)?,
              child_name:    row.get(2)?,
              attending:     row.get(3)?,
              responded_at:  row.get(4)?,
            };
            let allergy_id: Option<String> = row.get(5)?;
            let allergy = match allergy_id {
              Some(rsvp_id) => Some(RawAllergyRecord {
                rsvp_id,
                allergy_format:   row.get(6)?,
                allergies:        row.get(7)?,
                other_dietary:    row.get(8)?,
                consent_given_at: row.get(9)?,
                auto_delete_at:   row.get(10)?,
                created_at:       row.get(11)?,
              }),
              None => None,
            };
            Ok((rsvp, allergy))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(rsvp, allergy)| {
        Ok(GuestEntry {
          rsvp:    rsvp.into_rsvp()?,
          allergy: allergy.map(RawAllergyRecord::into_record).transpose()?,
        })
      })
      .collect()
  }
}
