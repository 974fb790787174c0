//! Allergy-data cipher for KalasKoll.
//!
//! Turns a guardian's allergy disclosure into its at-rest form and back.
//! Pure synchronous; no HTTP or database dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use kalas_cipher::{AllergyCipher, CipherConfig, Environment};
//!
//! let cipher = AllergyCipher::new(CipherConfig::new(
//!   std::env::var("KALAS_ALLERGY_KEY").ok(),
//!   Environment::Production,
//! ));
//! let tags = vec!["gluten".to_owned()];
//! let stored = cipher.encode(&tags, Some("vegan")).unwrap();
//! let read = cipher.decode(&stored.allergies, stored.other_dietary.as_deref()).unwrap();
//! assert_eq!(read.tags, tags);
//! ```

mod cipher;
pub mod config;
mod decode;
pub mod error;
mod seal;

pub use cipher::{AllergyCipher, EncodedPayload};
pub use config::{CipherConfig, Environment};
pub use error::{CipherError, KeyError, Result};
pub use seal::{KEY_LEN, NONCE_LEN, TAG_LEN};
