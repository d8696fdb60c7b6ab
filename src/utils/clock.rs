use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Utc};
use tokio::time::Instant;

/// Represents an entity responsible for providing dates across application. This can allow it to
/// be used for testing
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    fn time(&self) -> DateTime<Utc>;

    /// The logical date every credit and limit check is keyed by. Day rollover happens exactly
    /// when this value changes.
    fn today(&self) -> NaiveDate {
        self.time().with_timezone(&Local).date_naive()
    }

    fn instant(&self) -> Instant;

    async fn sleep_until(&self, instant: tokio::time::Instant);
}

#[derive(Clone, Copy)]
pub struct DefaultClock;

#[async_trait]
impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, instant: tokio::time::Instant) {
        tokio::time::sleep_until(instant).await;
    }
}

#[cfg(test)]
pub use manual::ManualClock;
