//! Retention endpoints hit once a day by an external scheduler.
//!
//! Both accept `GET` and `POST`, since hosted cron services differ in which
//! they send.

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use kalas_core::retention::PartySweep;
use serde::Serialize;

use crate::{AppState, Backend, auth::CronCaller, error::Error};

#[derive(Debug, Serialize)]
pub struct AllergySweepReport {
  pub deleted: u64,
  pub ran_at:  DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PartySweepReport {
  #[serde(flatten)]
  pub sweep:  PartySweep,
  pub ran_at: DateTime<Utc>,
}

/// `/api/cron/cleanup-allergies`
pub async fn cleanup_allergies<S: Backend>(
  _: CronCaller,
  State(state): State<AppState<S>>,
) -> Result<Json<AllergySweepReport>, Error> {
  let now = Utc::now();
  let deleted = state
    .sweeper()
    .sweep_allergy_records(now)
    .await
    .map_err(Error::store)?;
  Ok(Json(AllergySweepReport { deleted, ran_at: now }))
}

/// `/api/cron/cleanup-parties`
pub async fn cleanup_parties<S: Backend>(
  _: CronCaller,
  State(state): State<AppState<S>>,
) -> Result<Json<PartySweepReport>, Error> {
  let now = Utc::now();
  let sweep = state
    .sweeper()
    .sweep_stale_parties(now)
    .await
    .map_err(Error::store)?;
  Ok(Json(PartySweepReport { sweep, ran_at: now }))
}
