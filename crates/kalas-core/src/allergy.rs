//! Allergy disclosures and their at-rest records.
//!
//! A disclosure is what a guardian submits with an RSVP. It only becomes an
//! [`AllergyRecord`] when it carries data and explicit consent; "no allergies"
//! answers are never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Vocabulary ──────────────────────────────────────────────────────────────

/// The fixed vocabulary of allergy tags offered on the RSVP form.
///
/// The string forms are what ends up inside the encrypted tag array, so they
/// must never change once written.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  IntoStaticStr,
)]
pub enum AllergyTag {
  #[serde(rename = "laktos")]
  #[strum(serialize = "laktos")]
  Lactose,
  #[serde(rename = "gluten")]
  #[strum(serialize = "gluten")]
  Gluten,
  #[serde(rename = "nötter")]
  #[strum(serialize = "nötter")]
  Nuts,
  #[serde(rename = "ägg")]
  #[strum(serialize = "ägg")]
  Egg,
  #[serde(rename = "mjölkprotein")]
  #[strum(serialize = "mjölkprotein")]
  MilkProtein,
  #[serde(rename = "soja")]
  #[strum(serialize = "soja")]
  Soy,
  #[serde(rename = "fisk")]
  #[strum(serialize = "fisk")]
  Fish,
  #[serde(rename = "skaldjur")]
  #[strum(serialize = "skaldjur")]
  Shellfish,
}

impl AllergyTag {
  pub fn parse(s: &str) -> Result<Self> {
    s.parse().map_err(|_| Error::UnknownAllergyTag(s.to_owned()))
  }

  pub fn as_str(self) -> &'static str { self.into() }
}

// ─── Disclosure ──────────────────────────────────────────────────────────────

/// Dietary information submitted by a guardian for one RSVP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllergyDisclosure {
  pub allergies:     Vec<AllergyTag>,
  pub other_dietary: Option<String>,
  /// Whether the guardian ticked the storage consent box.
  pub consent:       bool,
}

impl AllergyDisclosure {
  /// Build a disclosure from raw form values, rejecting unknown tags.
  ///
  /// Duplicate tags are dropped; the first occurrence keeps its position.
  pub fn from_raw(
    allergies: &[String],
    other_dietary: Option<String>,
    consent: bool,
  ) -> Result<Self> {
    let mut tags: Vec<AllergyTag> = Vec::with_capacity(allergies.len());
    for raw in allergies {
      let tag = AllergyTag::parse(raw.trim())?;
      if !tags.contains(&tag) {
        tags.push(tag);
      }
    }
    Ok(Self { allergies: tags, other_dietary, consent })
  }

  /// Free text with surrounding whitespace removed; `None` when blank.
  pub fn other_dietary_text(&self) -> Option<&str> {
    self
      .other_dietary
      .as_deref()
      .map(str::trim)
      .filter(|t| !t.is_empty())
  }

  pub fn is_empty(&self) -> bool {
    self.allergies.is_empty() && self.other_dietary_text().is_none()
  }

  /// Whether this disclosure must be stored as an [`AllergyRecord`].
  ///
  /// Returns [`Error::ConsentMissing`] for data submitted without consent.
  pub fn requires_record(&self) -> Result<bool> {
    if self.is_empty() {
      return Ok(false);
    }
    if !self.consent {
      return Err(Error::ConsentMissing);
    }
    Ok(true)
  }

  /// The tag set in the string form handed to the cipher.
  pub fn tag_strings(&self) -> Vec<String> {
    self.allergies.iter().map(|t| t.as_str().to_owned()).collect()
  }
}

// ─── At-rest representation ──────────────────────────────────────────────────

/// Marker stored next to every allergy row written since the marker was
/// introduced. Older rows have no marker and are sniffed on read.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
pub enum AllergyFormat {
  /// Both fields are packed AES-256-GCM blobs.
  #[serde(rename = "aes256gcm")]
  #[strum(serialize = "aes256gcm")]
  Sealed,
  /// Written without a key in a non-production environment.
  #[serde(rename = "plaintext")]
  #[strum(serialize = "plaintext")]
  Plaintext,
}

impl AllergyFormat {
  pub fn parse(s: &str) -> Result<Self> {
    s.parse().map_err(|_| Error::UnknownFormat(s.to_owned()))
  }
}

/// The two allergy columns exactly as they sit in storage.
///
/// `allergies` is untyped on purpose: depending on when the row was written
/// it is a bare array, a base64 blob, or a JSON document encoded as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAllergy {
  pub format:        Option<AllergyFormat>,
  pub allergies:     serde_json::Value,
  pub other_dietary: Option<String>,
}

/// The readable form of an allergy record, as shown to a party owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedAllergies {
  pub tags:          Vec<String>,
  pub other_dietary: Option<String>,
}

/// One guest's stored allergy disclosure, bound one-to-one to an RSVP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllergyRecord {
  pub rsvp_id:          Uuid,
  pub stored:           StoredAllergy,
  pub consent_given_at: DateTime<Utc>,
  /// The record is hard-deleted by the sweeper once this has passed.
  pub auto_delete_at:   DateTime<Utc>,
  pub created_at:       DateTime<Utc>,
}

/// Input to [`crate::store::PartyStore::save_allergy_record`].
#[derive(Debug, Clone)]
pub struct NewAllergyRecord {
  pub rsvp_id:          Uuid,
  pub stored:           StoredAllergy,
  pub consent_given_at: DateTime<Utc>,
  pub auto_delete_at:   DateTime<Utc>,
}

/// An allergy record written together with its RSVP, before the RSVP id
/// exists. See [`crate::store::PartyStore::record_rsvp_with_allergy`].
#[derive(Debug, Clone)]
pub struct RsvpAllergy {
  pub stored:           StoredAllergy,
  pub consent_given_at: DateTime<Utc>,
  pub auto_delete_at:   DateTime<Utc>,
}

impl RsvpAllergy {
  pub fn bind(self, rsvp_id: Uuid) -> NewAllergyRecord {
    NewAllergyRecord {
      rsvp_id,
      stored: self.stored,
      consent_given_at: self.consent_given_at,
      auto_delete_at: self.auto_delete_at,
    }
  }
}

#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator as _;

  use super::*;

  #[test]
  fn tag_strings_round_trip_through_parse() {
    for tag in AllergyTag::iter() {
      assert_eq!(AllergyTag::parse(tag.as_str()).unwrap(), tag);
    }
    assert_eq!(AllergyTag::Nuts.as_str(), "nötter");
    assert_eq!(AllergyTag::MilkProtein.to_string(), "mjölkprotein");
  }

  #[test]
  fn serde_uses_swedish_names() {
    let json = serde_json::to_string(&vec![AllergyTag::Egg, AllergyTag::Soy]).unwrap();
    assert_eq!(json, r#"["ägg","soja"]"#);
  }

  #[test]
  fn unknown_tag_is_rejected() {
    let err = AllergyDisclosure::from_raw(&["peanuts".into()], None, true).unwrap_err();
    assert!(matches!(err, Error::UnknownAllergyTag(ref t) if t == "peanuts"));
  }

  #[test]
  fn duplicates_are_dropped_in_order() {
    let d = AllergyDisclosure::from_raw(
      &["gluten".into(), "laktos".into(), "gluten".into()],
      None,
      true,
    )
    .unwrap();
    assert_eq!(d.tag_strings(), vec!["gluten", "laktos"]);
  }

  #[test]
  fn empty_disclosure_needs_no_record() {
    let d = AllergyDisclosure {
      allergies:     vec![],
      other_dietary: Some("   ".into()),
      consent:       false,
    };
    assert!(d.is_empty());
    assert!(!d.requires_record().unwrap());
  }

  #[test]
  fn disclosure_without_consent_is_refused() {
    let d = AllergyDisclosure {
      allergies:     vec![],
      other_dietary: Some("vegan".into()),
      consent:       false,
    };
    assert!(matches!(d.requires_record(), Err(Error::ConsentMissing)));
  }

  #[test]
  fn disclosure_with_consent_is_stored() {
    let d = AllergyDisclosure {
      allergies:     vec![AllergyTag::Fish],
      other_dietary: None,
      consent:       true,
    };
    assert!(d.requires_record().unwrap());
  }

  #[test]
  fn format_marker_strings() {
    assert_eq!(AllergyFormat::Sealed.to_string(), "aes256gcm");
    assert_eq!(AllergyFormat::parse("plaintext").unwrap(), AllergyFormat::Plaintext);
    assert!(AllergyFormat::parse("rot13").is_err());
  }
}
