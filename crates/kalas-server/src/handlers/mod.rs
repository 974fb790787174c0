pub mod cron;
pub mod guests;
pub mod rsvp;

/// `GET /healthz`
pub async fn healthz() -> &'static str { "ok" }
