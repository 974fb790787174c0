//! [`AllergyCipher`]: encode disclosures for storage and read back every
//! format ever written.

use std::sync::OnceLock;

use kalas_core::allergy::{AllergyFormat, DecodedAllergies, StoredAllergy};
use serde_json::Value;
use tracing::warn;

use crate::{
  config::CipherConfig,
  decode::{chain_for, decode_free_text, decode_tags},
  error::{KeyError, Result},
  seal::SealingKey,
};

/// The at-rest form of one disclosure, as produced by
/// [`AllergyCipher::encode`].
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPayload {
  pub format:        AllergyFormat,
  /// A base64 blob (as a JSON string) when sealed, a bare array otherwise.
  pub allergies:     Value,
  /// `None` exactly when no free text was supplied.
  pub other_dietary: Option<String>,
}

impl From<EncodedPayload> for StoredAllergy {
  fn from(p: EncodedPayload) -> Self {
    Self {
      format:        Some(p.format),
      allergies:     p.allergies,
      other_dietary: p.other_dietary,
    }
  }
}

/// Encrypts and decrypts allergy data under one process-wide key.
///
/// Holds no mutable state apart from the lazily decoded key. Share it behind
/// an `Arc`.
pub struct AllergyCipher {
  config: CipherConfig,
  key:    OnceLock<Result<SealingKey, KeyError>>,
}

impl AllergyCipher {
  pub fn new(config: CipherConfig) -> Self {
    Self { config, key: OnceLock::new() }
  }

  fn key(&self) -> Result<&SealingKey, KeyError> {
    self
      .key
      .get_or_init(|| SealingKey::resolve(self.config.key.as_deref()))
      .as_ref()
      .map_err(|e| *e)
  }

  /// The key for this call, or `None` when the environment allows running
  /// without one.
  fn usable_key(&self) -> Result<Option<&SealingKey>> {
    match self.key() {
      Ok(key) => Ok(Some(key)),
      Err(e) if self.config.environment.is_production() => Err(e.into()),
      Err(e) => {
        warn!(
          error = %e,
          environment = ?self.config.environment,
          "allergy data is being handled as plaintext"
        );
        Ok(None)
      }
    }
  }

  /// Encode a tag set and optional free text for storage.
  ///
  /// Each field gets its own random nonce, so encoding the same input twice
  /// gives different output. Without a usable key this fails in production
  /// and returns the input as plaintext elsewhere.
  pub fn encode(&self, tags: &[String], free_text: Option<&str>) -> Result<EncodedPayload> {
    let Some(key) = self.usable_key()? else {
      return Ok(EncodedPayload {
        format:        AllergyFormat::Plaintext,
        allergies:     Value::from(tags.to_vec()),
        other_dietary: free_text.map(str::to_owned),
      });
    };

    let canonical = serde_json::to_string(tags)?;
    let allergies = key.seal(canonical.as_bytes())?;
    let other_dietary = free_text
      .map(|text| key.seal(text.as_bytes()))
      .transpose()?;

    Ok(EncodedPayload {
      format: AllergyFormat::Sealed,
      allergies: Value::String(allergies),
      other_dietary,
    })
  }

  /// Decode an unmarked row by sniffing its shape.
  ///
  /// Never fails on stored data: anything unreadable becomes an empty tag set
  /// and free text that does not decrypt is returned literally. The only
  /// error is an unusable key in production, raised only when a decryption
  /// is actually needed.
  pub fn decode(
    &self,
    tags_field: &Value,
    free_text_field: Option<&str>,
  ) -> Result<DecodedAllergies> {
    self.decode_with(None, tags_field, free_text_field)
  }

  /// Decode a stored row, honouring its format marker when present.
  pub fn decode_stored(&self, stored: &StoredAllergy) -> Result<DecodedAllergies> {
    self.decode_with(stored.format, &stored.allergies, stored.other_dietary.as_deref())
  }

  fn decode_with(
    &self,
    format: Option<AllergyFormat>,
    tags_field: &Value,
    free_text_field: Option<&str>,
  ) -> Result<DecodedAllergies> {
    let chain = chain_for(format);
    let text_may_be_sealed =
      free_text_field.is_some() && format != Some(AllergyFormat::Plaintext);
    let needs_key =
      text_may_be_sealed || chain.iter().any(|d| d.wants_key(tags_field));

    let key = if needs_key { self.usable_key()? } else { None };

    Ok(DecodedAllergies {
      tags:          decode_tags(chain, tags_field, key),
      other_dietary: if text_may_be_sealed {
        decode_free_text(free_text_field, key)
      } else {
        free_text_field.map(str::to_owned)
      },
    })
  }
}
