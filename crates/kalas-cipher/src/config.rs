//! Cipher configuration, handed in by whoever builds the service.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Deployment environment. Decides what happens when the key is unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
  /// Missing or malformed key is a hard error.
  #[default]
  Production,
  /// Missing or malformed key falls back to plaintext with a warning.
  Development,
  Test,
}

impl Environment {
  pub fn is_production(self) -> bool { matches!(self, Self::Production) }
}

/// Key material plus the environment policy.
///
/// The key is kept in its external (base64) form and only decoded when the
/// cipher is first used, so a bad key surfaces on the first encode/decode
/// rather than at startup.
#[derive(Clone, Default)]
pub struct CipherConfig {
  /// Base64 encoding of a 32-byte AES-256 key.
  pub key:         Option<String>,
  pub environment: Environment,
}

impl CipherConfig {
  pub fn new(key: Option<String>, environment: Environment) -> Self {
    Self { key, environment }
  }
}

impl fmt::Debug for CipherConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CipherConfig")
      .field("key", &self.key.as_ref().map(|_| "<redacted>"))
      .field("environment", &self.environment)
      .finish()
  }
}
