//! Bearer-token extractors for the cron and service endpoints.

use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, request::Parts};
use sha2::{Digest as _, Sha256};

use crate::{AppState, Backend, error::Error};

/// Present in a handler's arguments means the caller holds the cron secret.
pub struct CronCaller;

/// Present in a handler's arguments means the caller holds the service token
/// used by the web frontend.
pub struct ServiceCaller;

/// Check `Authorization: Bearer <token>` against `expected`.
///
/// An unset or empty secret rejects every request. Tokens are compared
/// through their SHA-256 digests so the comparison does not depend on where
/// the first differing byte is.
pub fn verify_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), Error> {
  let expected = expected.filter(|s| !s.is_empty()).ok_or(Error::Unauthorized)?;

  let presented = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .ok_or(Error::Unauthorized)?;

  if Sha256::digest(presented.trim().as_bytes()) != Sha256::digest(expected.as_bytes()) {
    return Err(Error::Unauthorized);
  }
  Ok(())
}

impl<S: Backend> FromRequestParts<AppState<S>> for CronCaller {
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    verify_bearer(&parts.headers, state.config.cron_secret.as_deref())?;
    Ok(CronCaller)
  }
}

impl<S: Backend> FromRequestParts<AppState<S>> for ServiceCaller {
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    verify_bearer(&parts.headers, state.config.service_token.as_deref())?;
    Ok(ServiceCaller)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::http::{HeaderValue, Request, header};

  use crate::ServerConfig;

  fn headers(value: &str) -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    h
  }

  #[test]
  fn correct_token() {
    assert!(verify_bearer(&headers("Bearer s3cret"), Some("s3cret")).is_ok());
  }

  #[test]
  fn wrong_token() {
    assert!(matches!(
      verify_bearer(&headers("Bearer nope"), Some("s3cret")),
      Err(Error::Unauthorized)
    ));
  }

  #[test]
  fn missing_header() {
    assert!(matches!(verify_bearer(&HeaderMap::new(), Some("s3cret")), Err(Error::Unauthorized)));
  }

  #[test]
  fn wrong_scheme() {
    assert!(verify_bearer(&headers("Basic czNjcmV0"), Some("s3cret")).is_err());
    assert!(verify_bearer(&headers("s3cret"), Some("s3cret")).is_err());
  }

  #[test]
  fn unset_secret_rejects_everything() {
    assert!(verify_bearer(&headers("Bearer "), None).is_err());
    assert!(verify_bearer(&headers("Bearer "), Some("")).is_err());
    assert!(verify_bearer(&headers("Bearer anything"), None).is_err());
  }

  #[tokio::test]
  async fn extractors_use_their_own_secret() {
    let state = crate::tests::make_state(ServerConfig {
      cron_secret: Some("cron".into()),
      service_token: Some("service".into()),
      ..crate::tests::test_config()
    })
    .await;

    let (mut parts, _) = Request::builder()
      .header(header::AUTHORIZATION, "Bearer cron")
      .body(axum::body::Body::empty())
      .unwrap()
      .into_parts();

    assert!(CronCaller::from_request_parts(&mut parts, &state).await.is_ok());
    assert!(matches!(
      ServiceCaller::from_request_parts(&mut parts, &state).await,
      Err(Error::Unauthorized)
    ));
  }
}
