//! Voice alert and coaching trigger rules
//!
//! Three independent rules are re-evaluated on every trip update and on the
//! runtime's scheduler tick:
//!
//! - **Milestone**: once per multiple of `milestone_every_km` per session
//! - **Overspeed**: speed held above the threshold for the confirm period
//! - **Coaching**: periodic request for an analysis of recent samples
//!
//! Nothing fires while an utterance is in progress; the rule is skipped, not
//! queued. Milestone and overspeed conditions persist in state, so they fire
//! on a later idle evaluation if still true. A coaching period that lands on
//! speech or an outstanding request is dropped and the next period waits a
//! full interval. At most one alert is produced per evaluation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::EngineConfig;
use crate::range::RangeMetrics;

/// Timers owned by the scheduler
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerName {
    OverspeedConfirm,
    PeriodicAnalysis,
}

impl fmt::Display for TimerName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TimerName::OverspeedConfirm => write!(f, "overspeed-confirm"),
            TimerName::PeriodicAnalysis => write!(f, "periodic-analysis"),
        }
    }
}

/// Deadline that can be armed and cancelled independently
#[derive(Clone, Debug)]
pub struct NamedTimer {
    name: TimerName,
    deadline: Option<Instant>,
}

impl NamedTimer {
    pub fn new(name: TimerName) -> Self {
        Self {
            name,
            deadline: None,
        }
    }

    pub fn arm(&mut self, at: Instant) {
        self.deadline = Some(at);
    }

    /// Returns whether the timer was pending
    pub fn cancel(&mut self) -> bool {
        let was_armed = self.deadline.take().is_some();
        if was_armed {
            log::debug!("Timer {} cancelled", self.name);
        }
        was_armed
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.map_or(false, |d| now >= d)
    }
}

/// Per-session de-duplication state
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AlertCooldownState {
    pub last_alerted_distance_km: u64,
    pub overspeed_since: Option<Instant>,
    pub last_analysis_at: Option<Instant>,
}

#[derive(Clone, Copy, Debug)]
pub struct AlertConfig {
    pub overspeed_kph: f64,
    pub overspeed_confirm: Duration,
    pub milestone_every_km: u64,
    pub analysis_interval: Duration,
}

impl From<&EngineConfig> for AlertConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            overspeed_kph: config.overspeed_kph,
            overspeed_confirm: config.overspeed_confirm(),
            milestone_every_km: config.milestone_every_km.max(1),
            analysis_interval: config.analysis_interval(),
        }
    }
}

/// Inputs for one evaluation
#[derive(Clone, Copy, Debug)]
pub struct AlertInput {
    pub now: Instant,
    pub speed_kph: f64,
    pub distance_km: f64,
    pub range: Option<RangeMetrics>,
    pub speaking: bool,
    pub analysis_in_flight: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Alert {
    Milestone {
        distance_km: u64,
        remaining_range_km: Option<f64>,
    },
    Overspeed {
        speed_kph: f64,
        threshold_kph: f64,
    },
    /// Time to send the sampling window for analysis
    Coaching,
}

impl Alert {
    /// Text to speak, if the alert is spoken directly
    pub fn message(&self) -> Option<String> {
        match self {
            Alert::Milestone {
                distance_km,
                remaining_range_km: Some(range),
            } => Some(format!(
                "You have covered {} kilometers. Estimated range remaining is {:.0} kilometers.",
                distance_km, range
            )),
            Alert::Milestone { distance_km, .. } => {
                Some(format!("You have covered {} kilometers.", distance_km))
            }
            Alert::Overspeed { threshold_kph, .. } => Some(format!(
                "You are riding above {:.0} kilometers per hour. Ease off to save fuel.",
                threshold_kph
            )),
            Alert::Coaching => None,
        }
    }
}

pub struct AlertScheduler {
    config: AlertConfig,
    cooldown: AlertCooldownState,
    overspeed_timer: NamedTimer,
    analysis_timer: NamedTimer,
    overspeed_alerted: bool,
    active: bool,
}

impl AlertScheduler {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            cooldown: AlertCooldownState::default(),
            overspeed_timer: NamedTimer::new(TimerName::OverspeedConfirm),
            analysis_timer: NamedTimer::new(TimerName::PeriodicAnalysis),
            overspeed_alerted: false,
            active: false,
        }
    }

    /// Reset cooldowns for a new tracking session and arm the rules
    pub fn begin_session(&mut self, now: Instant) {
        self.cooldown = AlertCooldownState::default();
        self.activate(now);
    }

    /// Arm the rules without touching session cooldowns (voice re-enabled)
    pub fn activate(&mut self, now: Instant) {
        self.clear_overspeed();
        self.analysis_timer.arm(now + self.config.analysis_interval);
        self.active = true;
    }

    /// Cancel every timer; required on stop, voice-disable and teardown
    pub fn stand_down(&mut self) {
        if self.active {
            log::debug!("Alert rules standing down");
        }
        self.clear_overspeed();
        self.analysis_timer.cancel();
        self.active = false;
    }

    /// Forget announced milestones after the distance was zeroed
    pub fn reset_milestones(&mut self) {
        self.cooldown.last_alerted_distance_km = 0;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn cooldown(&self) -> &AlertCooldownState {
        &self.cooldown
    }

    pub fn timer(&self, name: TimerName) -> &NamedTimer {
        match name {
            TimerName::OverspeedConfirm => &self.overspeed_timer,
            TimerName::PeriodicAnalysis => &self.analysis_timer,
        }
    }

    fn clear_overspeed(&mut self) {
        self.overspeed_timer.cancel();
        self.cooldown.overspeed_since = None;
        self.overspeed_alerted = false;
    }

    pub fn evaluate(&mut self, input: AlertInput) -> Option<Alert> {
        if !self.active {
            return None;
        }

        self.track_overspeed(&input);

        if input.speaking {
            if self.analysis_timer.is_due(input.now) {
                log::debug!("Coaching skipped: speech in progress");
                self.analysis_timer
                    .arm(input.now + self.config.analysis_interval);
            }
            return None;
        }

        if let Some(alert) = self.check_overspeed(&input) {
            return Some(alert);
        }
        if let Some(alert) = self.check_milestone(&input) {
            return Some(alert);
        }
        self.check_coaching(&input)
    }

    fn track_overspeed(&mut self, input: &AlertInput) {
        if input.speed_kph > self.config.overspeed_kph {
            if self.cooldown.overspeed_since.is_none() && !self.overspeed_alerted {
                self.cooldown.overspeed_since = Some(input.now);
                self.overspeed_timer
                    .arm(input.now + self.config.overspeed_confirm);
            }
        } else if self.cooldown.overspeed_since.is_some() || self.overspeed_alerted {
            self.clear_overspeed();
        }
    }

    fn check_overspeed(&mut self, input: &AlertInput) -> Option<Alert> {
        if !self.overspeed_timer.is_due(input.now) {
            return None;
        }
        self.overspeed_timer.cancel();
        self.cooldown.overspeed_since = None;
        self.overspeed_alerted = true;
        log::info!("Overspeed alert at {:.1} km/h", input.speed_kph);
        Some(Alert::Overspeed {
            speed_kph: input.speed_kph,
            threshold_kph: self.config.overspeed_kph,
        })
    }

    fn check_milestone(&mut self, input: &AlertInput) -> Option<Alert> {
        let every = self.config.milestone_every_km;
        let whole_km = input.distance_km.max(0.0).floor() as u64;
        let milestone = whole_km / every * every;

        if milestone == 0 || milestone <= self.cooldown.last_alerted_distance_km {
            return None;
        }
        self.cooldown.last_alerted_distance_km = milestone;
        log::info!("Distance milestone {} km", milestone);
        Some(Alert::Milestone {
            distance_km: milestone,
            remaining_range_km: input.range.map(|r| r.remaining_range_km),
        })
    }

    fn check_coaching(&mut self, input: &AlertInput) -> Option<Alert> {
        if !self.analysis_timer.is_due(input.now) {
            return None;
        }
        self.analysis_timer
            .arm(input.now + self.config.analysis_interval);
        if input.analysis_in_flight {
            log::debug!("Coaching skipped: analysis already outstanding");
            return None;
        }
        self.cooldown.last_analysis_at = Some(input.now);
        Some(Alert::Coaching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AlertConfig {
        AlertConfig {
            overspeed_kph: 60.0,
            overspeed_confirm: Duration::from_secs(5),
            milestone_every_km: 10,
            analysis_interval: Duration::from_secs(120),
        }
    }

    fn input(now: Instant, speed_kph: f64, distance_km: f64) -> AlertInput {
        AlertInput {
            now,
            speed_kph,
            distance_km,
            range: None,
            speaking: false,
            analysis_in_flight: false,
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_inactive_scheduler_is_silent() {
        let mut s = AlertScheduler::new(config());
        let t0 = Instant::now();
        assert_eq!(s.evaluate(input(t0, 100.0, 50.0)), None);
    }

    #[test]
    fn test_milestones_fire_once_each() {
        let mut s = AlertScheduler::new(config());
        let t0 = Instant::now();
        s.begin_session(t0);

        let mut fired = Vec::new();
        let mut d = 0.0;
        while d <= 35.0 {
            if let Some(Alert::Milestone { distance_km, .. }) = s.evaluate(input(t0, 30.0, d)) {
                fired.push(distance_km);
            }
            d += 0.05;
        }
        assert_eq!(fired, vec![10, 20, 30]);
    }

    #[test]
    fn test_milestone_not_lost_when_fix_skips_over_it() {
        let mut s = AlertScheduler::new(config());
        let t0 = Instant::now();
        s.begin_session(t0);

        assert_eq!(s.evaluate(input(t0, 30.0, 9.8)), None);
        assert_eq!(
            s.evaluate(input(t0, 30.0, 11.2)),
            Some(Alert::Milestone {
                distance_km: 10,
                remaining_range_km: None
            })
        );
        assert_eq!(s.evaluate(input(t0, 30.0, 12.0)), None);
    }

    #[test]
    fn test_milestone_message_includes_range() {
        let alert = Alert::Milestone {
            distance_km: 20,
            remaining_range_km: Some(200.0),
        };
        let msg = alert.message().unwrap();
        assert!(msg.contains("20 kilometers"));
        assert!(msg.contains("200"));
    }

    #[test]
    fn test_overspeed_below_confirm_period_is_silent() {
        let mut s = AlertScheduler::new(config());
        let t0 = Instant::now();
        s.begin_session(t0);

        for step in 0..=49 {
            assert_eq!(s.evaluate(input(t0 + ms(step * 100), 75.0, 0.0)), None);
        }
        assert_eq!(s.evaluate(input(t0 + ms(4950), 55.0, 0.0)), None);
        assert!(!s.timer(TimerName::OverspeedConfirm).is_armed());
        assert_eq!(s.evaluate(input(t0 + ms(6000), 55.0, 0.0)), None);
    }

    #[test]
    fn test_overspeed_held_fires_exactly_once() {
        let mut s = AlertScheduler::new(config());
        let t0 = Instant::now();
        s.begin_session(t0);

        let mut alerts = 0;
        for step in 0..=51 {
            if let Some(Alert::Overspeed { .. }) = s.evaluate(input(t0 + ms(step * 100), 75.0, 0.0)) {
                alerts += 1;
            }
        }
        assert_eq!(alerts, 1);

        // Still above the threshold much later: no repeat
        assert_eq!(s.evaluate(input(t0 + ms(20_000), 75.0, 0.0)), None);
    }

    #[test]
    fn test_overspeed_drop_resets_timer() {
        let mut s = AlertScheduler::new(config());
        let t0 = Instant::now();
        s.begin_session(t0);

        assert_eq!(s.evaluate(input(t0, 75.0, 0.0)), None);
        assert_eq!(s.evaluate(input(t0 + ms(4000), 75.0, 0.0)), None);
        assert_eq!(s.evaluate(input(t0 + ms(4500), 60.0, 0.0)), None);
        assert_eq!(s.evaluate(input(t0 + ms(5000), 75.0, 0.0)), None);
        assert_eq!(
            s.cooldown().overspeed_since,
            Some(t0 + ms(5000))
        );
        assert_eq!(s.evaluate(input(t0 + ms(9900), 75.0, 0.0)), None);
        assert!(matches!(
            s.evaluate(input(t0 + ms(10_000), 75.0, 0.0)),
            Some(Alert::Overspeed { .. })
        ));
    }

    #[test]
    fn test_overspeed_rearms_after_new_breach() {
        let mut s = AlertScheduler::new(config());
        let t0 = Instant::now();
        s.begin_session(t0);

        s.evaluate(input(t0, 75.0, 0.0));
        assert!(s.evaluate(input(t0 + ms(5000), 75.0, 0.0)).is_some());
        s.evaluate(input(t0 + ms(6000), 50.0, 0.0));
        s.evaluate(input(t0 + ms(7000), 75.0, 0.0));
        assert!(matches!(
            s.evaluate(input(t0 + ms(12_000), 75.0, 0.0)),
            Some(Alert::Overspeed { .. })
        ));
    }

    #[test]
    fn test_coaching_cadence() {
        let mut s = AlertScheduler::new(config());
        let t0 = Instant::now();
        s.begin_session(t0);

        assert_eq!(s.evaluate(input(t0 + Duration::from_secs(119), 30.0, 0.0)), None);
        assert_eq!(
            s.evaluate(input(t0 + Duration::from_secs(120), 30.0, 0.0)),
            Some(Alert::Coaching)
        );
        assert_eq!(s.evaluate(input(t0 + Duration::from_secs(121), 30.0, 0.0)), None);
        assert_eq!(
            s.evaluate(input(t0 + Duration::from_secs(240), 30.0, 0.0)),
            Some(Alert::Coaching)
        );
        assert_eq!(
            s.cooldown().last_analysis_at,
            Some(t0 + Duration::from_secs(240))
        );
    }

    #[test]
    fn test_coaching_skipped_while_request_outstanding() {
        let mut s = AlertScheduler::new(config());
        let t0 = Instant::now();
        s.begin_session(t0);

        let mut busy = input(t0 + Duration::from_secs(120), 30.0, 0.0);
        busy.analysis_in_flight = true;
        assert_eq!(s.evaluate(busy), None);
        assert_eq!(s.evaluate(input(t0 + Duration::from_secs(121), 30.0, 0.0)), None);
        assert_eq!(
            s.evaluate(input(t0 + Duration::from_secs(240), 30.0, 0.0)),
            Some(Alert::Coaching)
        );
    }

    #[test]
    fn test_speaking_guard_defers_and_serialises() {
        let mut s = AlertScheduler::new(config());
        let t0 = Instant::now();
        s.begin_session(t0);

        // Overspeed breach begins below the first milestone
        s.evaluate(input(t0, 75.0, 9.0));

        // Both conditions true while speech is active
        let mut speaking = input(t0 + ms(6000), 75.0, 10.2);
        speaking.speaking = true;
        assert_eq!(s.evaluate(speaking), None);
        speaking.now = t0 + ms(7000);
        assert_eq!(s.evaluate(speaking), None);

        // First idle tick: one alert only
        let first = s.evaluate(input(t0 + ms(8000), 75.0, 10.3));
        assert!(matches!(first, Some(Alert::Overspeed { .. })));

        // Next idle tick: the other
        let second = s.evaluate(input(t0 + ms(9000), 75.0, 10.4));
        assert!(matches!(second, Some(Alert::Milestone { distance_km: 10, .. })));

        assert_eq!(s.evaluate(input(t0 + ms(10_000), 75.0, 10.5)), None);
    }

    #[test]
    fn test_coaching_period_dropped_while_speaking() {
        let mut s = AlertScheduler::new(config());
        let t0 = Instant::now();
        s.begin_session(t0);

        let mut speaking = input(t0 + Duration::from_secs(120), 30.0, 0.0);
        speaking.speaking = true;
        assert_eq!(s.evaluate(speaking), None);
        assert_eq!(s.evaluate(input(t0 + Duration::from_secs(125), 30.0, 0.0)), None);
        assert_eq!(
            s.evaluate(input(t0 + Duration::from_secs(240), 30.0, 0.0)),
            Some(Alert::Coaching)
        );
    }

    #[test]
    fn test_stand_down_cancels_timers() {
        let mut s = AlertScheduler::new(config());
        let t0 = Instant::now();
        s.begin_session(t0);
        s.evaluate(input(t0, 75.0, 0.0));
        assert!(s.timer(TimerName::OverspeedConfirm).is_armed());
        assert!(s.timer(TimerName::PeriodicAnalysis).is_armed());

        s.stand_down();
        assert!(!s.is_active());
        assert!(!s.timer(TimerName::OverspeedConfirm).is_armed());
        assert!(!s.timer(TimerName::PeriodicAnalysis).is_armed());
        assert_eq!(s.evaluate(input(t0 + Duration::from_secs(300), 75.0, 25.0)), None);
    }

    #[test]
    fn test_new_session_resets_milestones() {
        let mut s = AlertScheduler::new(config());
        let t0 = Instant::now();
        s.begin_session(t0);
        assert!(s.evaluate(input(t0, 30.0, 10.0)).is_some());

        s.begin_session(t0);
        assert!(s.evaluate(input(t0, 30.0, 10.0)).is_some());
    }

    #[test]
    fn test_reset_milestones_after_distance_reset() {
        let mut s = AlertScheduler::new(config());
        let t0 = Instant::now();
        s.begin_session(t0);
        assert!(s.evaluate(input(t0, 30.0, 20.5)).is_some());

        s.reset_milestones();
        assert!(matches!(
            s.evaluate(input(t0, 30.0, 10.2)),
            Some(Alert::Milestone { distance_km: 10, .. })
        ));
    }

    #[test]
    fn test_activate_keeps_milestone_history() {
        let mut s = AlertScheduler::new(config());
        let t0 = Instant::now();
        s.begin_session(t0);
        assert!(s.evaluate(input(t0, 30.0, 10.0)).is_some());

        s.stand_down();
        s.activate(t0);
        assert_eq!(s.evaluate(input(t0, 30.0, 10.5)), None);
    }
}
