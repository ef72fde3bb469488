//! Recurring-job scheduling
//!
//! Jobs run on declarative `ScheduleRule`s (interval + optional weekday and
//! hour-range restrictions) instead of cron strings. Cadenced loops re-pick
//! their rule from the activation state on every iteration and react to
//! transitions immediately through the watch channel.

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc, Weekday};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::domain::ActivationState;

/// When and how often a recurring job may run
#[derive(Debug, Clone, Copy)]
pub struct ScheduleRule {
    pub interval: Duration,
    pub weekdays_only: bool,
    /// Local-time range the job is confined to, if any
    pub hour_range: Option<(NaiveTime, NaiveTime)>,
    /// Timezone the weekday/hour restrictions are evaluated in
    pub offset: FixedOffset,
}

impl ScheduleRule {
    /// Unconditional fixed-interval rule
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            weekdays_only: false,
            hour_range: None,
            offset: FixedOffset::east_opt(0).expect("zero offset is valid"),
        }
    }

    pub fn with_weekdays_only(mut self, offset: FixedOffset) -> Self {
        self.weekdays_only = true;
        self.offset = offset;
        self
    }

    pub fn with_hour_range(mut self, start: NaiveTime, end: NaiveTime, offset: FixedOffset) -> Self {
        self.hour_range = Some((start, end));
        self.offset = offset;
        self
    }

    /// Whether the rule allows a run at `now`
    pub fn permits(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset);
        if self.weekdays_only && matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        if let Some((start, end)) = self.hour_range {
            let time = local.time();
            if time < start || time >= end {
                return false;
            }
        }
        true
    }
}

/// Run `job` forever on a fixed interval, until shutdown
pub async fn run_fixed<F, Fut>(
    name: &str,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    job: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    info!(job = name, ?interval, "starting fixed-interval job");
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                job().await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(job = name, "job stopping");
                    return;
                }
            }
        }
    }
}

/// Run `job` on a cadence chosen from the current activation state.
///
/// `pick` is consulted every iteration, so the closing-minutes cadence and
/// activation transitions take effect without waiting out a stale sleep.
pub async fn run_cadenced<P, F, Fut>(
    name: &str,
    mut state_rx: watch::Receiver<ActivationState>,
    mut shutdown: watch::Receiver<bool>,
    pick: P,
    job: F,
) where
    P: Fn(ActivationState) -> ScheduleRule,
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    info!(job = name, "starting cadenced job");
    loop {
        let state = *state_rx.borrow();
        let rule = pick(state);

        tokio::select! {
            _ = tokio::time::sleep(rule.interval) => {
                if rule.permits(Utc::now()) {
                    job().await;
                } else {
                    debug!(job = name, "schedule rule does not permit a run now");
                }
            }
            _ = state_rx.changed() => {
                // re-pick the interval for the new state
                continue;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(job = name, "job stopping");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        offset()
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn fixed_rule_always_permits() {
        let rule = ScheduleRule::fixed(Duration::from_secs(60));
        assert!(rule.permits(local(2026, 3, 7, 3, 0))); // Saturday
    }

    #[test]
    fn weekday_rule_blocks_weekends() {
        let rule = ScheduleRule::fixed(Duration::from_secs(60)).with_weekdays_only(offset());
        assert!(rule.permits(local(2026, 3, 2, 10, 0))); // Monday
        assert!(!rule.permits(local(2026, 3, 7, 10, 0))); // Saturday
    }

    #[test]
    fn hour_range_is_half_open() {
        let start = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let end = NaiveTime::from_hms_opt(15, 0, 0).unwrap();
        let rule =
            ScheduleRule::fixed(Duration::from_secs(60)).with_hour_range(start, end, offset());

        assert!(!rule.permits(local(2026, 3, 2, 8, 59)));
        assert!(rule.permits(local(2026, 3, 2, 9, 0)));
        assert!(rule.permits(local(2026, 3, 2, 14, 59)));
        assert!(!rule.permits(local(2026, 3, 2, 15, 0)));
    }
}
