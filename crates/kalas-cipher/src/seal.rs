//! AES-256-GCM sealing with the packed blob layout.
//!
//! ```text
//! base64( nonce[12] ∥ tag[16] ∥ ciphertext[..] )
//! ```
//!
//! The layout is positional and shared with every blob already at rest, so
//! the sizes below are fixed.

use aes_gcm::{
  Aes256Gcm, KeyInit, Nonce, Tag,
  aead::AeadInPlace,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use rand_core::{OsRng, RngCore};

use crate::error::{CipherError, KeyError, Result};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// A ready-to-use AES-256-GCM key.
pub(crate) struct SealingKey {
  cipher: Aes256Gcm,
}

impl SealingKey {
  pub(crate) fn resolve(encoded: Option<&str>) -> Result<Self, KeyError> {
    let encoded = encoded
      .map(str::trim)
      .filter(|k| !k.is_empty())
      .ok_or(KeyError::Missing)?;
    let raw = B64.decode(encoded).map_err(|_| KeyError::NotBase64)?;
    if raw.len() != KEY_LEN {
      return Err(KeyError::WrongLength(raw.len()));
    }
    let cipher = Aes256Gcm::new_from_slice(&raw).map_err(|_| KeyError::WrongLength(raw.len()))?;
    Ok(Self { cipher })
  }

  /// Encrypt under a fresh random nonce and return the packed base64 blob.
  pub(crate) fn seal(&self, plaintext: &[u8]) -> Result<String> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let mut body = plaintext.to_vec();
    let tag = self
      .cipher
      .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut body)
      .map_err(|_| CipherError::Seal)?;

    let mut packed = Vec::with_capacity(NONCE_LEN + TAG_LEN + body.len());
    packed.extend_from_slice(&nonce);
    packed.extend_from_slice(&tag);
    packed.extend_from_slice(&body);
    Ok(B64.encode(packed))
  }

  /// Unpack and authenticate a blob. `None` for anything that is not a blob
  /// sealed under this key.
  pub(crate) fn open(&self, blob: &str) -> Option<Vec<u8>> {
    let packed = B64.decode(blob.trim()).ok()?;
    if packed.len() < NONCE_LEN + TAG_LEN {
      return None;
    }
    let (nonce, rest) = packed.split_at(NONCE_LEN);
    let (tag, body) = rest.split_at(TAG_LEN);
    let tag: &Tag = Tag::from_slice(tag);

    let mut body = body.to_vec();
    self
      .cipher
      .decrypt_in_place_detached(Nonce::from_slice(nonce), b"", &mut body, tag)
      .ok()?;
    Some(body)
  }
}
