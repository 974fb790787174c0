//! Decoder chain for the tags column.
//!
//! Three generations of tag storage exist at rest:
//!
//! 1. a bare JSON array of strings (before encryption);
//! 2. a packed AES-GCM blob holding the canonical array text;
//! 3. a JSON array encoded as a *string* (an early migration artefact, which
//!    also catches blobs that no longer open).
//!
//! Rows carrying a format marker go straight to the matching interpretation.
//! Unmarked rows try each generation in order and take the first hit.

use kalas_core::allergy::AllergyFormat;
use serde_json::Value;

use crate::seal::SealingKey;

/// One historical interpretation of the tags column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TagsDecoder {
  LegacyArray,
  Sealed,
  LegacyJsonText,
}

const UNMARKED: &[TagsDecoder] =
  &[TagsDecoder::LegacyArray, TagsDecoder::Sealed, TagsDecoder::LegacyJsonText];
const SEALED: &[TagsDecoder] = &[TagsDecoder::Sealed];
const PLAINTEXT: &[TagsDecoder] = &[TagsDecoder::LegacyArray, TagsDecoder::LegacyJsonText];

/// The decoders to try, in order, for a row with the given marker.
pub(crate) fn chain_for(format: Option<AllergyFormat>) -> &'static [TagsDecoder] {
  match format {
    None => UNMARKED,
    Some(AllergyFormat::Sealed) => SEALED,
    Some(AllergyFormat::Plaintext) => PLAINTEXT,
  }
}

impl TagsDecoder {
  /// Interpret `field` this way, or `None` to fall through to the next one.
  ///
  /// [`TagsDecoder::Sealed`] always falls through without a key.
  pub(crate) fn try_decode(
    self,
    field: &Value,
    key: Option<&SealingKey>,
  ) -> Option<Vec<String>> {
    match self {
      Self::LegacyArray => string_array(field),
      Self::Sealed => {
        let plain = key?.open(field.as_str()?)?;
        serde_json::from_slice::<Vec<String>>(&plain).ok()
      }
      Self::LegacyJsonText => {
        let parsed: Value = serde_json::from_str(field.as_str()?).ok()?;
        string_array(&parsed)
      }
    }
  }

  /// Whether this decoder could use the key for `field`.
  pub(crate) fn wants_key(self, field: &Value) -> bool {
    matches!(self, Self::Sealed) && field.is_string()
  }
}

fn string_array(value: &Value) -> Option<Vec<String>> {
  let items = value.as_array()?;
  Some(
    items
      .iter()
      .filter_map(|item| item.as_str().map(str::to_owned))
      .collect(),
  )
}

/// Run `chain` over `field`; an exhausted chain yields an empty tag set.
pub(crate) fn decode_tags(
  chain: &[TagsDecoder],
  field: &Value,
  key: Option<&SealingKey>,
) -> Vec<String> {
  for decoder in chain {
    if let Some(tags) = decoder.try_decode(field, key) {
      tracing::debug!(?decoder, "allergy tags decoded");
      return tags;
    }
  }
  tracing::debug!("no decoder accepted the allergy tags; returning none");
  Vec::new()
}

/// Decrypt free text, or take it literally if it does not open.
pub(crate) fn decode_free_text(
  field: Option<&str>,
  key: Option<&SealingKey>,
) -> Option<String> {
  let text = field?;
  let opened = key
    .and_then(|k| k.open(text))
    .and_then(|plain| String::from_utf8(plain).ok());
  Some(opened.unwrap_or_else(|| text.to_owned()))
}
