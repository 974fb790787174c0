//! HTTP layer for the KalasKoll allergy-data service.
//!
//! Exposes an axum [`Router`] with the daily retention endpoints, RSVP
//! intake and the owner's guest list, backed by any store implementing the
//! [`kalas_core::store`] traits.

pub mod auth;
pub mod error;
pub mod handlers;

pub use error::Error;

use std::{fmt, path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use kalas_cipher::{AllergyCipher, CipherConfig, Environment};
use kalas_core::{
  retention::{PARTY_RETENTION_DAYS, RetentionSweeper},
  store::{AuditLog, PartyStore, RetentionStore},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use handlers::{cron, guests, rsvp};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `KALAS_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                 String,
  #[serde(default = "default_port")]
  pub port:                 u16,
  #[serde(default = "default_store_path")]
  pub store_path:           PathBuf,
  #[serde(default)]
  pub environment:          Environment,
  /// Base64 encoding of the 32-byte allergy key.
  #[serde(default)]
  pub allergy_key:          Option<String>,
  #[serde(default)]
  pub cron_secret:          Option<String>,
  #[serde(default)]
  pub service_token:        Option<String>,
  #[serde(default = "default_party_retention_days")]
  pub party_retention_days: u32,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("kalaskoll.db") }

fn default_party_retention_days() -> u32 { PARTY_RETENTION_DAYS }

impl ServerConfig {
  pub fn cipher_config(&self) -> CipherConfig {
    CipherConfig::new(self.allergy_key.clone(), self.environment)
  }
}

impl fmt::Debug for ServerConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let redact = |s: &Option<String>| s.as_ref().map(|_| "<redacted>");
    f.debug_struct("ServerConfig")
      .field("host", &self.host)
      .field("port", &self.port)
      .field("store_path", &self.store_path)
      .field("environment", &self.environment)
      .field("allergy_key", &redact(&self.allergy_key))
      .field("cron_secret", &redact(&self.cron_secret))
      .field("service_token", &redact(&self.service_token))
      .field("party_retention_days", &self.party_retention_days)
      .finish()
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Everything the handlers need from a store.
pub trait Backend: PartyStore + RetentionStore + AuditLog + 'static {}

impl<T> Backend for T where T: PartyStore + RetentionStore + AuditLog + 'static {}

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub store:  Arc<S>,
  pub cipher: Arc<AllergyCipher>,
  pub config: Arc<ServerConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:  Arc::clone(&self.store),
      cipher: Arc::clone(&self.cipher),
      config: Arc::clone(&self.config),
    }
  }
}

impl<S: Backend> AppState<S> {
  pub fn new(store: S, config: ServerConfig) -> Self {
    Self {
      store:  Arc::new(store),
      cipher: Arc::new(AllergyCipher::new(config.cipher_config())),
      config: Arc::new(config),
    }
  }

  /// A sweeper over this state's store, using the configured party window.
  pub fn sweeper(&self) -> RetentionSweeper<'_, S> {
    RetentionSweeper::new(self.store.as_ref())
      .with_party_retention_days(self.config.party_retention_days)
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the service.
pub fn router<S: Backend>(state: AppState<S>) -> Router {
  Router::new()
    .route("/healthz", get(handlers::healthz))
    .route(
      "/api/cron/cleanup-allergies",
      get(cron::cleanup_allergies::<S>).post(cron::cleanup_allergies::<S>),
    )
    .route(
      "/api/cron/cleanup-parties",
      get(cron::cleanup_parties::<S>).post(cron::cleanup_parties::<S>),
    )
    .route("/api/invitations/{token}/rsvps", post(rsvp::submit::<S>))
    .route("/api/parties/{party_id}/guests", get(guests::list::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use base64::Engine as _;
  use base64::engine::general_purpose::STANDARD as B64;
  use chrono::{Days, NaiveDate, Utc};
  use kalas_core::{
    allergy::{AllergyFormat, NewAllergyRecord, StoredAllergy},
    party::{Invitation, NewParty, NewRsvp, Party},
    retention::allergy_deadline,
  };
  use kalas_store_sqlite::SqliteStore;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;
  use uuid::Uuid;

  use crate::handlers::{guests::GuestView, rsvp::RsvpCreated};

  const CRON: &str = "cron-secret";
  const SERVICE: &str = "service-token";

  pub(crate) fn test_config() -> ServerConfig {
    ServerConfig {
      host:                 "127.0.0.1".to_owned(),
      port:                 8080,
      store_path:           PathBuf::from(":memory:"),
      environment:          Environment::Test,
      allergy_key:          Some(B64.encode([7u8; 32])),
      cron_secret:          Some(CRON.to_owned()),
      service_token:        Some(SERVICE.to_owned()),
      party_retention_days: PARTY_RETENTION_DAYS,
    }
  }

  pub(crate) async fn make_state(config: ServerConfig) -> AppState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    AppState::new(store, config)
  }

  async fn send(
    state:  &AppState<SqliteStore>,
    method: &str,
    uri:    &str,
    token:  Option<&str>,
    body:   Option<Value>,
  ) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
      builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
      Some(json) => builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };
    let resp = router(state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
  }

  fn today() -> NaiveDate { Utc::now().date_naive() }

  async fn party_with_invitation(
    state: &AppState<SqliteStore>,
    party_date: NaiveDate,
  ) -> (Party, Invitation) {
    let party = state
      .store
      .create_party(NewParty {
        owner_id: Uuid::new_v4(),
        child_name: "Elsa".into(),
        party_date,
      })
      .await
      .unwrap();
    let invitation = state.store.create_invitation(party.party_id).await.unwrap();
    (party, invitation)
  }

  fn rsvp_uri(invitation: &Invitation) -> String {
    format!("/api/invitations/{}/rsvps", invitation.token)
  }

  // ── Health ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn healthz_needs_no_auth() {
    let state = make_state(test_config()).await;
    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let resp = router(state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
  }

  // ── Cron ────────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn cron_requires_secret() {
    let state = make_state(test_config()).await;
    for uri in ["/api/cron/cleanup-allergies", "/api/cron/cleanup-parties"] {
      let (status, body) = send(&state, "POST", uri, None, None).await;
      assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
      assert_eq!(body["error"], "unauthorized");

      let (status, _) = send(&state, "GET", uri, Some("wrong"), None).await;
      assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");

      // The service token is not a cron credential.
      let (status, _) = send(&state, "GET", uri, Some(SERVICE), None).await;
      assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
    }
  }

  #[tokio::test]
  async fn cron_without_configured_secret_rejects() {
    let state = make_state(ServerConfig { cron_secret: None, ..test_config() }).await;
    let (status, _) =
      send(&state, "POST", "/api/cron/cleanup-allergies", Some(""), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn cleanup_allergies_deletes_expired_records() {
    let state = make_state(test_config()).await;
    let (_, invitation) = party_with_invitation(&state, today()).await;

    let expired = state
      .store
      .record_rsvp(NewRsvp {
        invitation_id: invitation.invitation_id,
        child_name:    "Anna".into(),
        attending:     true,
      })
      .await
      .unwrap();
    state
      .store
      .save_allergy_record(NewAllergyRecord {
        rsvp_id:          expired.rsvp_id,
        stored:           StoredAllergy {
          format:        Some(AllergyFormat::Plaintext),
          allergies:     json!(["gluten"]),
          other_dietary: None,
        },
        consent_given_at: Utc::now(),
        auto_delete_at:   allergy_deadline(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()),
      })
      .await
      .unwrap();

    let (status, _) = send(
      &state,
      "POST",
      &rsvp_uri(&invitation),
      Some(SERVICE),
      Some(json!({ "child_name": "Bo", "attending": true, "allergies": ["fisk"], "consent": true })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) =
      send(&state, "GET", "/api/cron/cleanup-allergies", Some(CRON), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);
    assert!(body["ran_at"].is_string());

    let (_, body) = send(&state, "POST", "/api/cron/cleanup-allergies", Some(CRON), None).await;
    assert_eq!(body["deleted"], 0);

    assert!(state.store.get_allergy_record(expired.rsvp_id).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn cleanup_parties_deletes_and_audits() {
    let state = make_state(test_config()).await;
    let (old, _) = party_with_invitation(&state, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()).await;
    let (recent, _) = party_with_invitation(&state, today()).await;

    let (status, body) =
      send(&state, "POST", "/api/cron/cleanup-parties", Some(CRON), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);
    assert_eq!(body["audit_failures"], 0);
    let expected_cutoff = today().checked_sub_days(Days::new(30)).unwrap();
    assert_eq!(body["cutoff"], expected_cutoff.to_string());

    assert!(state.store.get_party(old.party_id).await.unwrap().is_none());
    assert!(state.store.get_party(recent.party_id).await.unwrap().is_some());

    let audit = state.store.audit_entries(old.party_id).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, "party_deleted");
  }

  // ── RSVP intake ─────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn rsvp_with_allergies_is_sealed() {
    let state = make_state(test_config()).await;
    let (party, invitation) = party_with_invitation(&state, today()).await;

    let (status, body) = send(
      &state,
      "POST",
      &rsvp_uri(&invitation),
      Some(SERVICE),
      Some(json!({
        "child_name": "Anna",
        "attending": true,
        "allergies": ["laktos", "nötter", "laktos"],
        "other_dietary": "  inga jordgubbar ",
        "consent": true,
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let created: RsvpCreated = serde_json::from_value(body).unwrap();
    assert!(created.allergy_stored);

    let record = state.store.get_allergy_record(created.rsvp_id).await.unwrap().unwrap();
    assert_eq!(record.stored.format, Some(AllergyFormat::Sealed));
    assert!(record.stored.allergies.is_string());
    assert_ne!(record.stored.other_dietary.as_deref(), Some("inga jordgubbar"));
    assert_eq!(record.auto_delete_at, allergy_deadline(party.party_date));

    let decoded = state.cipher.decode_stored(&record.stored).unwrap();
    assert_eq!(decoded.tags, vec!["laktos", "nötter"]);
    assert_eq!(decoded.other_dietary.as_deref(), Some("inga jordgubbar"));
  }

  #[tokio::test]
  async fn rsvp_without_disclosure_stores_no_record() {
    let state = make_state(test_config()).await;
    let (party, invitation) = party_with_invitation(&state, today()).await;

    let (status, body) = send(
      &state,
      "POST",
      &rsvp_uri(&invitation),
      Some(SERVICE),
      Some(json!({ "child_name": "Anna", "attending": false, "other_dietary": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let created: RsvpCreated = serde_json::from_value(body).unwrap();
    assert!(!created.allergy_stored);
    assert!(state.store.get_allergy_record(created.rsvp_id).await.unwrap().is_none());
    assert_eq!(state.store.list_guests(party.party_id).await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn rsvp_rejections_store_nothing() {
    let state = make_state(test_config()).await;
    let (party, invitation) = party_with_invitation(&state, today()).await;
    let uri = rsvp_uri(&invitation);

    let no_consent = json!({ "child_name": "Anna", "attending": true, "allergies": ["gluten"] });
    let (status, body) = send(&state, "POST", &uri, Some(SERVICE), Some(no_consent)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("consent"));

    let unknown_tag =
      json!({ "child_name": "Anna", "attending": true, "allergies": ["kiwi"], "consent": true });
    let (status, _) = send(&state, "POST", &uri, Some(SERVICE), Some(unknown_tag)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let blank_name = json!({ "child_name": " ", "attending": true });
    let (status, _) = send(&state, "POST", &uri, Some(SERVICE), Some(blank_name)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(state.store.list_guests(party.party_id).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn rsvp_needs_live_invitation_and_token() {
    let state = make_state(test_config()).await;
    let (party, invitation) = party_with_invitation(&state, today()).await;
    let body = json!({ "child_name": "Anna", "attending": true });

    let (status, _) = send(&state, "POST", &rsvp_uri(&invitation), None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
      &state,
      "POST",
      "/api/invitations/no-such-token/rsvps",
      Some(SERVICE),
      Some(body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    state.store.soft_delete_party(party.party_id, Utc::now()).await.unwrap();
    let (status, body) = send(&state, "POST", &rsvp_uri(&invitation), Some(SERVICE), Some(body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "party not found");
  }

  #[tokio::test]
  async fn production_without_key_refuses_allergy_data() {
    let state = make_state(ServerConfig {
      environment: Environment::Production,
      allergy_key: None,
      ..test_config()
    })
    .await;
    let (party, invitation) = party_with_invitation(&state, today()).await;

    let (status, _) = send(
      &state,
      "POST",
      &rsvp_uri(&invitation),
      Some(SERVICE),
      Some(json!({ "child_name": "Anna", "attending": true, "allergies": ["soja"], "consent": true })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(state.store.list_guests(party.party_id).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn development_without_key_stores_plaintext() {
    let state = make_state(ServerConfig {
      environment: Environment::Development,
      allergy_key: None,
      ..test_config()
    })
    .await;
    let (_, invitation) = party_with_invitation(&state, today()).await;

    let (status, body) = send(
      &state,
      "POST",
      &rsvp_uri(&invitation),
      Some(SERVICE),
      Some(json!({ "child_name": "Anna", "attending": true, "allergies": ["soja"], "consent": true })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let created: RsvpCreated = serde_json::from_value(body).unwrap();

    let record = state.store.get_allergy_record(created.rsvp_id).await.unwrap().unwrap();
    assert_eq!(record.stored.format, Some(AllergyFormat::Plaintext));
    assert_eq!(record.stored.allergies, json!(["soja"]));
  }

  // ── Guest list ──────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn guest_list_decodes_every_generation() {
    let state = make_state(test_config()).await;
    let (party, invitation) = party_with_invitation(&state, today()).await;

    let (_, body) = send(
      &state,
      "POST",
      &rsvp_uri(&invitation),
      Some(SERVICE),
      Some(json!({ "child_name": "Anna", "attending": true, "allergies": ["ägg"], "consent": true })),
    )
    .await;
    let sealed: RsvpCreated = serde_json::from_value(body).unwrap();

    // Rows written before the format marker existed.
    let mut legacy = Vec::new();
    for (child, allergies) in [
      ("Bo", json!(["laktos", "gluten"])),
      ("Cleo", json!(r#"["gluten"]"#)),
      ("Dan", json!("bm90LWEtYmxvYg==")),
    ] {
      let rsvp = state
        .store
        .record_rsvp(NewRsvp {
          invitation_id: invitation.invitation_id,
          child_name:    child.into(),
          attending:     true,
        })
        .await
        .unwrap();
      state
        .store
        .save_allergy_record(NewAllergyRecord {
          rsvp_id:          rsvp.rsvp_id,
          stored:           StoredAllergy {
            format: None,
            allergies,
            other_dietary: Some("vegan".into()),
          },
          consent_given_at: Utc::now(),
          auto_delete_at:   allergy_deadline(party.party_date),
        })
        .await
        .unwrap();
      legacy.push(rsvp.rsvp_id);
    }

    let uri = format!("/api/parties/{}/guests", party.party_id);
    let (status, body) = send(&state, "GET", &uri, Some(SERVICE), None).await;
    assert_eq!(status, StatusCode::OK);
    let guests: Vec<GuestView> = serde_json::from_value(body).unwrap();
    assert_eq!(guests.len(), 4);

    let tags_of = |id: Uuid| {
      guests
        .iter()
        .find(|g| g.rsvp_id == id)
        .and_then(|g| g.allergies.clone())
        .unwrap()
    };
    assert_eq!(tags_of(sealed.rsvp_id).tags, vec!["ägg"]);
    assert_eq!(tags_of(legacy[0]).tags, vec!["laktos", "gluten"]);
    assert_eq!(tags_of(legacy[0]).other_dietary.as_deref(), Some("vegan"));
    assert_eq!(tags_of(legacy[1]).tags, vec!["gluten"]);
    assert!(tags_of(legacy[2]).tags.is_empty());
  }

  #[tokio::test]
  async fn guest_list_for_unknown_party_is_404() {
    let state = make_state(test_config()).await;
    let uri = format!("/api/parties/{}/guests", Uuid::new_v4());
    let (status, _) = send(&state, "GET", &uri, Some(SERVICE), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&state, "GET", &uri, Some(CRON), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn guest_list_for_soft_deleted_party_is_404() {
    let state = make_state(test_config()).await;
    let (party, invitation) = party_with_invitation(&state, today()).await;
    let (status, _) = send(
      &state,
      "POST",
      &rsvp_uri(&invitation),
      Some(SERVICE),
      Some(json!({ "child_name": "Anna", "attending": true, "allergies": ["ägg"], "consent": true })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    state.store.soft_delete_party(party.party_id, Utc::now()).await.unwrap();

    let uri = format!("/api/parties/{}/guests", party.party_id);
    let (status, body) = send(&state, "GET", &uri, Some(SERVICE), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "party not found" }));
  }

  // ── Configuration ───────────────────────────────────────────────────────────

  #[test]
  fn config_defaults_fail_closed() {
    let cfg: ServerConfig = serde_json::from_value(json!({})).unwrap();
    assert_eq!(cfg.environment, Environment::Production);
    assert_eq!(cfg.party_retention_days, 30);
    assert!(cfg.allergy_key.is_none());
    assert!(cfg.cron_secret.is_none());
  }

  #[test]
  fn config_debug_redacts_secrets() {
    let printed = format!("{:?}", test_config());
    assert!(!printed.contains(CRON));
    assert!(!printed.contains(SERVICE));
    assert!(printed.contains("<redacted>"));
  }
}
