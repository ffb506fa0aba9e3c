use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Shortest period any connector is polled at.
pub const MIN_PERIOD: Duration = Duration::from_secs(60);

/// Coarse cadence bucket of a connector's interval, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "unit", content = "every", rename_all = "lowercase")]
pub enum Trigger {
    Hours(u64),
    Minutes(u64),
}

impl Trigger {
    pub fn from_interval_secs(secs: u64) -> Self {
        if secs >= 3600 {
            Self::Hours(secs / 3600)
        } else {
            Self::Minutes((secs / 60).max(1))
        }
    }

    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hours(n) => write!(f, "every {n}h"),
            Self::Minutes(n) => write!(f, "every {n}m"),
        }
    }
}

/// The period a connector's timer actually fires at.
pub fn timer_period(interval_secs: u64) -> Duration {
    Duration::from_secs(interval_secs).max(MIN_PERIOD)
}

/// Fire `pass` immediately and then every `period` until `cancel` trips.
///
/// A pass in progress is never interrupted; cancellation is observed between
/// passes. Ticks missed while a pass overran are dropped.
pub async fn run_every<F, Fut>(name: &str, period: Duration, cancel: CancellationToken, mut pass: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(connector = %name, period_secs = period.as_secs(), "timer started");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => pass().await,
        }
    }
    tracing::info!(connector = %name, "timer stopped");
}
