//! Activation window controller
//!
//! Flips the process between ACTIVE and STANDBY based on a daily wall-clock
//! window in a fixed exchange timezone. Transitions are idempotent and
//! broadcast once; cadence consumers subscribe through a watch channel.
//! The state is re-derived every minute as a failsafe, so a missed boundary
//! tick self-corrects.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, FixedOffset, NaiveTime, Utc, Weekday};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{info, warn};

use crate::config::WindowConfig;
use crate::domain::{topics, ActivationChange, ActivationState};
use crate::error::{EngineError, Result};
use crate::ports::RealtimeBroadcast;
use crate::scheduler::ScheduleRule;

/// Read-only controller status
#[derive(Debug, Clone, Serialize)]
pub struct WindowStatus {
    pub state: ActivationState,
    pub opens_at: String,
    pub closes_at: String,
    pub weekdays_only: bool,
    pub forced: bool,
    pub next_transition: DateTime<Utc>,
}

pub struct ActiveWindowController {
    open: NaiveTime,
    close: NaiveTime,
    offset: FixedOffset,
    weekdays_only: bool,
    failsafe_check: Duration,
    state_tx: watch::Sender<ActivationState>,
    /// Manual override; the failsafe loop honors it until cleared
    forced: RwLock<Option<ActivationState>>,
    /// Lock-free mirror of `forced`, read by schedule-rule construction
    forced_flag: AtomicBool,
    broadcast: Arc<dyn RealtimeBroadcast>,
}

impl ActiveWindowController {
    pub fn new(config: &WindowConfig, broadcast: Arc<dyn RealtimeBroadcast>) -> Result<Self> {
        let open = config.open_time().map_err(EngineError::Validation)?;
        let close = config.close_time().map_err(EngineError::Validation)?;
        let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600).ok_or_else(|| {
            EngineError::Validation(format!(
                "invalid utc_offset_hours: {}",
                config.utc_offset_hours
            ))
        })?;

        let (state_tx, _) = watch::channel(ActivationState::Standby);

        Ok(Self {
            open,
            close,
            offset,
            weekdays_only: config.weekdays_only,
            failsafe_check: Duration::from_secs(config.failsafe_check_secs),
            state_tx,
            forced: RwLock::new(None),
            forced_flag: AtomicBool::new(false),
            broadcast,
        })
    }

    /// Current activation state
    pub fn state(&self) -> ActivationState {
        *self.state_tx.borrow()
    }

    /// Subscribe to state changes for cadence selection
    pub fn subscribe(&self) -> watch::Receiver<ActivationState> {
        self.state_tx.subscribe()
    }

    fn day_allowed(&self, weekday: Weekday) -> bool {
        !self.weekdays_only
            || !matches!(weekday, Weekday::Sat | Weekday::Sun)
    }

    /// Whether the configured window contains `now`
    pub fn window_contains(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset);
        if !self.day_allowed(local.weekday()) {
            return false;
        }
        let time = local.time();
        time >= self.open && time < self.close
    }

    /// Minutes until today's close, when inside the window
    pub fn minutes_to_close(&self, now: DateTime<Utc>) -> Option<i64> {
        if !self.window_contains(now) {
            return None;
        }
        let time = now.with_timezone(&self.offset).time();
        Some((self.close - time).num_minutes())
    }

    /// The next window boundary after `now`
    pub fn next_transition(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.offset);
        let mut earliest: Option<DateTime<Utc>> = None;

        for day in 0..=7 {
            let date = (local + ChronoDuration::days(day)).date_naive();
            if !self.day_allowed(date.weekday()) {
                continue;
            }
            for boundary in [self.open, self.close] {
                if let Some(instant) = date
                    .and_time(boundary)
                    .and_local_timezone(self.offset)
                    .single()
                {
                    let instant = instant.with_timezone(&Utc);
                    if instant > now && earliest.map_or(true, |e| instant < e) {
                        earliest = Some(instant);
                    }
                }
            }
        }

        // A window always has a boundary within the next week
        earliest.unwrap_or(now)
    }

    /// Re-derive the activation state from the clock (or the manual
    /// override) and transition if it changed. Idempotent.
    pub async fn evaluate(&self, now: DateTime<Utc>) {
        let desired = match *self.forced.read().await {
            Some(state) => state,
            None => {
                if self.window_contains(now) {
                    ActivationState::Active
                } else {
                    ActivationState::Standby
                }
            }
        };
        self.transition(desired, now).await;
    }

    async fn transition(&self, desired: ActivationState, now: DateTime<Utc>) {
        let current = *self.state_tx.borrow();
        if current == desired {
            return;
        }

        info!(from = %current, to = %desired, "activation window transition");
        if self.state_tx.send(desired).is_err() {
            warn!("no activation state subscribers");
        }

        let change = ActivationChange {
            state: desired,
            at: now,
        };
        match serde_json::to_value(&change) {
            Ok(payload) => self.broadcast.publish(topics::ACTIVATION, payload).await,
            Err(e) => warn!(error = %e, "failed to serialize activation change"),
        }
    }

    /// Manual override: pin the system to ACTIVE until cleared
    pub async fn force_activate(&self) {
        *self.forced.write().await = Some(ActivationState::Active);
        self.forced_flag.store(true, Ordering::SeqCst);
        self.evaluate(Utc::now()).await;
    }

    /// Manual override: pin the system to STANDBY until cleared
    pub async fn force_deactivate(&self) {
        *self.forced.write().await = Some(ActivationState::Standby);
        self.forced_flag.store(true, Ordering::SeqCst);
        self.evaluate(Utc::now()).await;
    }

    /// Drop any manual override and fall back to the clock
    pub async fn clear_override(&self) {
        *self.forced.write().await = None;
        self.forced_flag.store(false, Ordering::SeqCst);
        self.evaluate(Utc::now()).await;
    }

    /// Cadence rule for jobs confined to the active window: the configured
    /// hour range plus the weekday restriction. While a manual override pins
    /// the state, the restrictions are dropped so forced-active jobs still
    /// run.
    pub fn active_schedule(&self, interval: Duration) -> ScheduleRule {
        if self.forced_flag.load(Ordering::SeqCst) {
            return ScheduleRule::fixed(interval);
        }
        let mut rule =
            ScheduleRule::fixed(interval).with_hour_range(self.open, self.close, self.offset);
        if self.weekdays_only {
            rule = rule.with_weekdays_only(self.offset);
        }
        rule
    }

    /// Read-only status query
    pub async fn status(&self) -> WindowStatus {
        WindowStatus {
            state: self.state(),
            opens_at: self.open.format("%H:%M").to_string(),
            closes_at: self.close.format("%H:%M").to_string(),
            weekdays_only: self.weekdays_only,
            forced: self.forced.read().await.is_some(),
            next_transition: self.next_transition(Utc::now()),
        }
    }

    /// How long the transition loop may sleep from `now`: up to the next
    /// window boundary, capped by the failsafe period
    fn sleep_budget(&self, now: DateTime<Utc>) -> Duration {
        let next = self.next_transition(now);
        let until_boundary = (next - now).to_std().unwrap_or(Duration::ZERO);
        until_boundary.min(self.failsafe_check)
    }

    /// Transition loop; runs until shutdown. Wakes exactly at window
    /// boundaries so the open/close flips land on time, with the
    /// minute-granularity re-derivation as a backstop for clock drift and
    /// override changes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            self.evaluate(Utc::now()).await;
            let sleep_for = self.sleep_budget(Utc::now());
            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("activation window controller stopping");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MockRealtimeBroadcast;
    use chrono::TimeZone;

    fn window_config() -> WindowConfig {
        WindowConfig {
            open: "09:00".to_string(),
            close: "15:00".to_string(),
            utc_offset_hours: 9,
            weekdays_only: true,
            failsafe_check_secs: 60,
        }
    }

    fn controller(publishes: usize) -> ActiveWindowController {
        let mut broadcast = MockRealtimeBroadcast::new();
        broadcast
            .expect_publish()
            .times(publishes)
            .returning(|_, _| ());
        ActiveWindowController::new(&window_config(), Arc::new(broadcast)).unwrap()
    }

    /// Monday 2026-03-02 at the given local (UTC+9) time
    fn monday_at(hour: u32, minute: u32) -> DateTime<Utc> {
        let offset = FixedOffset::east_opt(9 * 3600).unwrap();
        offset
            .with_ymd_and_hms(2026, 3, 2, hour, minute, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn standby_before_open_active_at_open() {
        let controller = controller(1);
        controller.evaluate(monday_at(8, 59)).await;
        assert_eq!(controller.state(), ActivationState::Standby);

        controller.evaluate(monday_at(9, 0)).await;
        assert_eq!(controller.state(), ActivationState::Active);
    }

    #[tokio::test]
    async fn reentering_same_state_is_noop() {
        // exactly one broadcast despite three evaluations
        let controller = controller(1);
        controller.evaluate(monday_at(9, 0)).await;
        controller.evaluate(monday_at(9, 1)).await;
        controller.evaluate(monday_at(9, 2)).await;
        assert_eq!(controller.state(), ActivationState::Active);
    }

    #[tokio::test]
    async fn close_boundary_is_exclusive() {
        let controller = controller(2);
        controller.evaluate(monday_at(14, 59)).await;
        assert_eq!(controller.state(), ActivationState::Active);
        controller.evaluate(monday_at(15, 0)).await;
        assert_eq!(controller.state(), ActivationState::Standby);
    }

    #[tokio::test]
    async fn weekend_is_standby() {
        let controller = controller(0);
        // Saturday 2026-03-07 10:00 local
        let offset = FixedOffset::east_opt(9 * 3600).unwrap();
        let saturday = offset
            .with_ymd_and_hms(2026, 3, 7, 10, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        controller.evaluate(saturday).await;
        assert_eq!(controller.state(), ActivationState::Standby);
    }

    #[tokio::test]
    async fn force_activate_overrides_clock() {
        let controller = controller(1);
        controller.force_activate().await;
        assert_eq!(controller.state(), ActivationState::Active);

        // failsafe evaluation outside the window must not flip it back
        controller.evaluate(monday_at(20, 0)).await;
        assert_eq!(controller.state(), ActivationState::Active);
    }

    #[tokio::test]
    async fn minutes_to_close_inside_window() {
        let controller = controller(0);
        assert_eq!(controller.minutes_to_close(monday_at(14, 50)), Some(10));
        assert_eq!(controller.minutes_to_close(monday_at(16, 0)), None);
    }

    #[tokio::test]
    async fn next_transition_from_inside_window_is_close() {
        let controller = controller(0);
        let next = controller.next_transition(monday_at(10, 0));
        assert_eq!(next, monday_at(15, 0));
    }

    #[tokio::test]
    async fn active_schedule_carries_window_restrictions() {
        let controller = controller(0);
        let rule = controller.active_schedule(std::time::Duration::from_secs(60));

        assert!(rule.permits(monday_at(10, 0)));
        assert!(!rule.permits(monday_at(8, 0)));
        assert!(!rule.permits(monday_at(16, 0)));

        let offset = FixedOffset::east_opt(9 * 3600).unwrap();
        let saturday = offset
            .with_ymd_and_hms(2026, 3, 7, 10, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        assert!(!rule.permits(saturday));
    }

    #[tokio::test]
    async fn active_schedule_is_unrestricted_while_forced() {
        // publish count depends on the wall clock here, so no expectation
        let mut broadcast = MockRealtimeBroadcast::new();
        broadcast.expect_publish().returning(|_, _| ());
        let controller =
            ActiveWindowController::new(&window_config(), Arc::new(broadcast)).unwrap();
        controller.force_activate().await;
        let rule = controller.active_schedule(std::time::Duration::from_secs(60));

        let offset = FixedOffset::east_opt(9 * 3600).unwrap();
        let saturday = offset
            .with_ymd_and_hms(2026, 3, 7, 10, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        assert!(rule.permits(saturday));

        controller.clear_override().await;
        let rule = controller.active_schedule(std::time::Duration::from_secs(60));
        assert!(!rule.permits(saturday));
    }

    #[tokio::test]
    async fn sleep_budget_lands_on_the_boundary() {
        let controller = controller(0);
        let offset = FixedOffset::east_opt(9 * 3600).unwrap();

        // 30 seconds before Monday's open: wake exactly at 09:00
        let near_open = offset
            .with_ymd_and_hms(2026, 3, 2, 8, 59, 30)
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            controller.sleep_budget(near_open),
            std::time::Duration::from_secs(30)
        );

        // far from any boundary the failsafe period caps the sleep
        assert_eq!(
            controller.sleep_budget(monday_at(11, 0)),
            std::time::Duration::from_secs(60)
        );
    }

    #[tokio::test]
    async fn next_transition_from_friday_evening_is_monday_open() {
        let controller = controller(0);
        let offset = FixedOffset::east_opt(9 * 3600).unwrap();
        // Friday 2026-03-06 18:00 local
        let friday_evening = offset
            .with_ymd_and_hms(2026, 3, 6, 18, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        let next = controller.next_transition(friday_evening);
        let monday_open = offset
            .with_ymd_and_hms(2026, 3, 9, 9, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(next, monday_open);
    }
}
