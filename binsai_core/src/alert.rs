//! Edge-triggered alert engine with cooldown and rearm hysteresis.
use binsai_config::Thresholds;
use tracing::{debug, info};

use crate::schedule::deadline_reached;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// Fill and gas both above their critical levels.
    Critical,
    /// Fill above critical while the gas level is normal.
    FillOnly,
}

impl AlertKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::FillOnly => "fill",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    Quiet,
    /// Start an SMS batch now.
    Sms(AlertKind),
    /// Modem unavailable; report through telemetry only.
    CloudOnly(AlertKind),
}

/// What the engine needs to know beyond the classified values.
#[derive(Debug, Clone, Copy)]
pub struct AlertContext {
    pub now_ms: u64,
    pub dialog_idle: bool,
    pub gsm_ok: bool,
}

#[derive(Debug, Clone)]
pub struct AlertEngine {
    critical_fill: f32,
    critical_ppm: f32,
    reset_below: f32,
    fill_only: bool,
    cooldown_ms: u64,
    armed: bool,
    fill_armed: bool,
    last_fired_ms: Option<u64>,
    /// Set while an edge is waiting on the cooldown or a busy dialog.
    pending: bool,
    pub fired: u32,
    pub suppressed: u32,
}

impl AlertEngine {
    pub fn new(th: &Thresholds, cooldown_ms: u64) -> Self {
        Self {
            critical_fill: th.critical_fill,
            critical_ppm: th.critical_ppm,
            reset_below: th.reset_below,
            fill_only: th.fill_only_alerts,
            cooldown_ms,
            armed: false,
            fill_armed: false,
            last_fired_ms: None,
            pending: false,
            fired: 0,
            suppressed: 0,
        }
    }

    pub fn armed(&self) -> bool {
        self.armed
    }

    pub fn fill_armed(&self) -> bool {
        self.fill_armed
    }

    pub fn last_fired_ms(&self) -> Option<u64> {
        self.last_fired_ms
    }

    pub fn is_critical(&self, fill: f32, ppm: f32) -> bool {
        fill > self.critical_fill && ppm > self.critical_ppm
    }

    fn cooldown_elapsed(&self, now_ms: u64) -> bool {
        self.last_fired_ms
            .is_none_or(|t| deadline_reached(now_ms, t, self.cooldown_ms))
    }

    /// Feed one classified sample. Pure with respect to everything but `self`.
    pub fn evaluate(&mut self, fill: f32, ppm: f32, ctx: AlertContext) -> AlertDecision {
        if fill < self.reset_below && (self.armed || self.fill_armed || self.pending) {
            debug!(fill, reset_below = self.reset_below, "alert rearmed");
            self.armed = false;
            self.fill_armed = false;
            self.pending = false;
        }

        let kind = if self.is_critical(fill, ppm) {
            if self.armed {
                return AlertDecision::Quiet;
            }
            AlertKind::Critical
        } else if self.fill_only && fill > self.critical_fill {
            if self.fill_armed || self.armed {
                return AlertDecision::Quiet;
            }
            AlertKind::FillOnly
        } else {
            return AlertDecision::Quiet;
        };

        if !ctx.gsm_ok {
            self.latch(kind);
            info!(kind = kind.label(), fill, ppm, "alert raised; modem down, cloud only");
            return AlertDecision::CloudOnly(kind);
        }
        if !(self.cooldown_elapsed(ctx.now_ms) && ctx.dialog_idle) {
            if !self.pending {
                self.pending = true;
                self.suppressed += 1;
                debug!(kind = kind.label(), dialog_idle = ctx.dialog_idle, "alert held back");
            }
            return AlertDecision::Quiet;
        }
        self.latch(kind);
        self.pending = false;
        self.last_fired_ms = Some(ctx.now_ms);
        self.fired += 1;
        info!(kind = kind.label(), fill, ppm, "alert fired");
        AlertDecision::Sms(kind)
    }

    fn latch(&mut self, kind: AlertKind) {
        // A critical latch also covers the fill-only condition it implies.
        self.fill_armed = true;
        if kind == AlertKind::Critical {
            self.armed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> AlertEngine {
        AlertEngine::new(&Thresholds::default(), 300_000)
    }

    fn at(now_ms: u64) -> AlertContext {
        AlertContext {
            now_ms,
            dialog_idle: true,
            gsm_ok: true,
        }
    }

    #[test]
    fn fires_once_per_edge() {
        let mut e = engine();
        assert_eq!(e.evaluate(95.0, 900.0, at(0)), AlertDecision::Sms(AlertKind::Critical));
        assert_eq!(e.evaluate(95.0, 900.0, at(2_000)), AlertDecision::Quiet);
        assert!(e.armed());
        assert_eq!(e.fired, 1);
    }

    #[test]
    fn stays_latched_between_reset_and_critical() {
        let mut e = engine();
        e.evaluate(95.0, 900.0, at(0));
        e.evaluate(85.0, 900.0, at(2_000));
        assert!(e.armed());
        e.evaluate(79.9, 900.0, at(4_000));
        assert!(!e.armed());
    }

    #[test]
    fn cooldown_holds_edge_until_it_elapses() {
        let mut e = engine();
        e.evaluate(95.0, 900.0, at(0));
        e.evaluate(5.0, 120.0, at(2_000));
        assert_eq!(e.evaluate(95.0, 900.0, at(60_000)), AlertDecision::Quiet);
        assert_eq!(e.evaluate(95.0, 900.0, at(62_000)), AlertDecision::Quiet);
        assert_eq!(e.suppressed, 1);
        assert_eq!(
            e.evaluate(95.0, 900.0, at(300_000)),
            AlertDecision::Sms(AlertKind::Critical)
        );
    }

    #[test]
    fn busy_dialog_does_not_consume_edge() {
        let mut e = engine();
        let busy = AlertContext {
            dialog_idle: false,
            ..at(0)
        };
        assert_eq!(e.evaluate(95.0, 900.0, busy), AlertDecision::Quiet);
        assert!(!e.armed());
        assert_eq!(e.evaluate(95.0, 900.0, at(2_000)), AlertDecision::Sms(AlertKind::Critical));
    }

    #[test]
    fn fill_only_alert_shares_cooldown() {
        let mut e = engine();
        assert_eq!(e.evaluate(95.0, 120.0, at(0)), AlertDecision::Sms(AlertKind::FillOnly));
        assert!(e.fill_armed() && !e.armed());
        // gas rises while still full: a critical edge, but the cooldown is shared
        assert_eq!(e.evaluate(95.0, 900.0, at(2_000)), AlertDecision::Quiet);
        assert_eq!(
            e.evaluate(95.0, 900.0, at(300_000)),
            AlertDecision::Sms(AlertKind::Critical)
        );
    }

    #[test]
    fn fill_only_can_be_disabled() {
        let th = Thresholds {
            fill_only_alerts: false,
            ..Thresholds::default()
        };
        let mut e = AlertEngine::new(&th, 0);
        assert_eq!(e.evaluate(95.0, 120.0, at(0)), AlertDecision::Quiet);
    }

    #[test]
    fn modem_down_degrades_to_cloud_and_latches() {
        let mut e = engine();
        let down = AlertContext {
            gsm_ok: false,
            ..at(0)
        };
        assert_eq!(
            e.evaluate(95.0, 900.0, down),
            AlertDecision::CloudOnly(AlertKind::Critical)
        );
        assert_eq!(e.evaluate(95.0, 900.0, down), AlertDecision::Quiet);
        assert_eq!(e.last_fired_ms(), None);
    }
}
