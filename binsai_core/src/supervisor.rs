//! The cooperative supervisor: bring-up, the tick pipeline and the run loop.
//!
//! Tick order:
//! 1. service the cloud link
//! 2. drain GPS; on the sensor period read, filter, classify and evaluate alerts
//! 3. advance the SMS dialog
//! 4. publish telemetry
//! 5. refresh display and buzzer
//! 6. emit the health CSV line when due
//!
//! Faults are recorded in [`Health`]; nothing after bring-up is fatal.
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use binsai_config::Config;
use binsai_config::store::device_id_from_mac;
use binsai_traits::{
    AnalogIn, CharDisplay, CloudLink, GpsParser, MonotonicClock, OutputPin, SerialPort,
    Ultrasonic, WifiLink,
};
use tracing::{debug, info, warn};

use crate::alert::{AlertContext, AlertDecision, AlertEngine, AlertKind};
use crate::buzzer::{BeepPattern, Beeper};
use crate::calibration::{PpmConverter, R0Outcome, R0Params, calibrate_r0};
use crate::classify::{Classification, classify, fill_percent};
use crate::display::{DisplayRotator, DisplayView};
use crate::error::{BinsaiError, Result};
use crate::health::{CSV_HEADER, Health, csv_line};
use crate::modem::{ModemStatus, init_modem};
use crate::schedule::{Periodic, SharedClock, Ticker};
use crate::sensors::{DistanceReader, GasReader, GpsTracker};
use crate::sms::{BatchReport, DialogState, SmsDialog, compose_message};
use crate::telemetry::{
    EVENT_CRITICAL_ALERT, EVENT_SMS_SENT, EVENT_SYSTEM_START, LinkState, TelemetryPublisher,
};

const NOTICE_MS: u64 = 3_000;

fn panel(display: &mut Option<Box<dyn CharDisplay>>) -> Option<&mut dyn CharDisplay> {
    match display {
        Some(d) => Some(d.as_mut()),
        None => None,
    }
}

/// Every device the supervisor owns for the process lifetime.
pub struct Peripherals {
    pub ultrasonic: Box<dyn Ultrasonic>,
    pub gas_adc: Box<dyn AnalogIn>,
    pub gsm: Box<dyn SerialPort>,
    pub modem_power: Box<dyn OutputPin>,
    pub gps_uart: Box<dyn SerialPort>,
    pub gps_parser: Box<dyn GpsParser>,
    /// `None` when no display is fitted.
    pub display: Option<Box<dyn CharDisplay>>,
    pub buzzer: Box<dyn OutputPin>,
    pub wifi: Box<dyn WifiLink>,
    pub cloud: Box<dyn CloudLink>,
    /// Debug link receiving the health CSV.
    pub debug: Box<dyn Write>,
}

/// Mutable state shared by the tick stages.
pub struct SupervisorCtx {
    pub cfg: Config,
    pub health: Health,
    pub snapshot: crate::types::SensorSnapshot,
    pub classification: Classification,
    pub distance: DistanceReader,
    pub gas: GasReader,
    pub gps: GpsTracker,
    pub alert: AlertEngine,
    pub sms: SmsDialog,
    pub telemetry: TelemetryPublisher,
    pub display: DisplayRotator,
    pub beeper: Beeper,
    sensor_period: Periodic,
    health_period: Periodic,
}

impl SupervisorCtx {
    pub fn new(cfg: Config, adc_full_scale: u16) -> Self {
        let t = &cfg.timing;
        Self {
            health: Health::default(),
            snapshot: crate::types::SensorSnapshot::default(),
            classification: classify(0.0, 0.0),
            distance: DistanceReader::new(cfg.device.us_offset_cm),
            gas: GasReader::new(PpmConverter::from_config(&cfg.gas, adc_full_scale)),
            gps: GpsTracker::new(),
            alert: AlertEngine::new(&cfg.thresholds, cfg.sms.cooldown_ms),
            sms: SmsDialog::new(cfg.sms.phone_numbers.clone()),
            telemetry: TelemetryPublisher::new(
                &cfg.network.wifi_ssid,
                &cfg.network.wifi_pass,
                &cfg.network.cloud_token,
                t.reconnect_ms,
                t.publish_min_ms,
            ),
            display: DisplayRotator::new(t.display_rotate_ms),
            beeper: Beeper::new(),
            sensor_period: Periodic::new(t.sensor_period_ms),
            health_period: Periodic::new(t.health_period_ms),
            cfg,
        }
    }
}

/// Outcome of [`Supervisor::bring_up`].
#[derive(Debug, Clone, PartialEq)]
pub struct BringUpReport {
    pub modem: std::result::Result<ModemStatus, BinsaiError>,
    /// New R₀ when the boot calibration was accepted; the caller persists it.
    pub r0: Option<R0Outcome>,
    pub cloud_connected: bool,
    pub display_present: bool,
}

pub struct Supervisor {
    ctx: SupervisorCtx,
    hw: Peripherals,
    ticker: Ticker,
    r0_params: R0Params,
}

impl core::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Supervisor")
            .field("device_id", &self.ctx.cfg.device.device_id)
            .field("now_ms", &self.ticker.now_ms())
            .field("health", &self.ctx.health)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct SupervisorBuilder {
    config: Option<Config>,
    peripherals: Option<Peripherals>,
    clock: Option<SharedClock>,
    r0_params: Option<R0Params>,
}

impl SupervisorBuilder {
    #[must_use]
    pub fn config(mut self, cfg: Config) -> Self {
        self.config = Some(cfg);
        self
    }

    #[must_use]
    pub fn peripherals(mut self, hw: Peripherals) -> Self {
        self.peripherals = Some(hw);
        self
    }

    /// Time source; defaults to the real monotonic clock.
    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Boot calibration timing (shortened in tests).
    #[must_use]
    pub fn r0_params(mut self, params: R0Params) -> Self {
        self.r0_params = Some(params);
        self
    }

    pub fn try_build(self) -> Result<Supervisor> {
        let cfg = self
            .config
            .ok_or_else(|| eyre::Report::new(BinsaiError::Config("config not set".into())))?;
        cfg.validate()?;
        let hw = self
            .peripherals
            .ok_or_else(|| eyre::Report::new(BinsaiError::Config("peripherals not set".into())))?;
        let clock = self
            .clock
            .unwrap_or_else(|| std::sync::Arc::new(MonotonicClock::new()));
        let mut ctx = SupervisorCtx::new(cfg, hw.gas_adc.full_scale());
        if ctx.cfg.device.device_id.is_empty() {
            ctx.cfg.device.device_id = device_id_from_mac(hw.wifi.mac_address());
        }
        Ok(Supervisor {
            ctx,
            hw,
            ticker: Ticker::new(clock),
            r0_params: self.r0_params.unwrap_or_default(),
        })
    }
}

impl Supervisor {
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::default()
    }

    pub fn ctx(&self) -> &SupervisorCtx {
        &self.ctx
    }

    pub fn health(&self) -> &Health {
        &self.ctx.health
    }

    pub fn config(&self) -> &Config {
        &self.ctx.cfg
    }

    pub fn now_ms(&self) -> u64 {
        self.ticker.now_ms()
    }

    pub fn ticker(&self) -> &Ticker {
        &self.ticker
    }

    pub fn dialog_state(&self) -> DialogState {
        self.ctx.sms.state()
    }

    fn splash(&mut self, line1: &str, line2: &str) {
        if let Some(d) = self.hw.display.as_deref_mut() {
            self.ctx
                .display
                .draw(d, [line1.to_string(), line2.to_string()]);
        }
    }

    /// Blocking start-up: display, modem, network, boot calibration.
    ///
    /// Fails only on a fatal hardware fault (sensor bus dead).
    pub fn bring_up(&mut self) -> Result<BringUpReport> {
        let now = self.ticker.now_ms();
        info!(device_id = %self.ctx.cfg.device.device_id, "bring-up");
        let _ = self.hw.buzzer.set_low();

        let present = self.hw.display.as_deref_mut().is_some_and(|d| d.probe());
        if !present {
            if self.hw.display.is_some() {
                warn!("display did not acknowledge; running headless");
            }
            self.hw.display = None;
        }
        self.ctx.health.display_ok = present;
        self.splash("BINSAI", "Starting...");

        if let Err(e) = self.hw.gas_adc.read_raw() {
            let err = BinsaiError::Fatal(format!("gas ADC: {e}"));
            self.ctx.health.record(err.clone());
            return Err(eyre::Report::new(err));
        }

        let modem = init_modem(
            self.hw.gsm.as_mut(),
            self.hw.modem_power.as_mut(),
            &self.ticker,
        );
        self.ctx.health.gsm_ok = modem.is_ok();
        if let Err(e) = &modem {
            warn!(error = %e, "GSM unavailable; alerts go to telemetry only");
            self.ctx.health.record(e.clone());
            self.splash("GSM FAIL", "Cloud alerts only");
        }

        let attempt_ms = self.ticker.now_ms();
        let cloud_connected =
            self.ctx
                .telemetry
                .connect(self.hw.wifi.as_mut(), self.hw.cloud.as_mut(), attempt_ms);
        self.ctx.health.wifi_ok = self.hw.wifi.is_connected();
        self.ctx.health.cloud_ok = cloud_connected;
        let start_desc = format!("{} online", self.ctx.cfg.device.device_id);
        self.ctx
            .telemetry
            .event(self.hw.cloud.as_mut(), EVENT_SYSTEM_START, &start_desc);

        let r0 = self.boot_calibration();

        if let Err(e) = writeln!(self.hw.debug, "{CSV_HEADER}") {
            debug!(error = %e, "debug link write failed");
        }
        info!(
            gsm_ok = self.ctx.health.gsm_ok,
            cloud_ok = cloud_connected,
            display_ok = present,
            elapsed_ms = self.ticker.now_ms().saturating_sub(now),
            "bring-up complete"
        );
        Ok(BringUpReport {
            modem,
            r0,
            cloud_connected,
            display_present: present,
        })
    }

    fn boot_calibration(&mut self) -> Option<R0Outcome> {
        if self.ctx.cfg.timing.skip_boot_calibration {
            info!(r0 = self.ctx.cfg.gas.mq135_r0, "boot calibration skipped; using stored R0");
            self.ctx.health.mq_calibrated = true;
            return None;
        }
        self.splash("Calibrating MQ", "0%");
        let conv = self.ctx.gas.converter().clone();
        let display = &mut self.ctx.display;
        let mut lcd = panel(&mut self.hw.display);
        let outcome = calibrate_r0(
            self.hw.gas_adc.as_mut(),
            &conv,
            &self.ticker,
            self.r0_params,
            &mut |pct| {
                if let Some(d) = lcd.as_deref_mut() {
                    display.draw(d, ["Calibrating MQ".to_string(), format!("{pct}%")]);
                }
            },
        );
        match outcome {
            Ok(out) => {
                self.ctx.gas.set_r0(out.r0_kohm);
                self.ctx.cfg.gas.mq135_r0 = out.r0_kohm;
                self.ctx.health.mq_calibrated = true;
                Some(out)
            }
            Err(e) => {
                warn!(error = %e, r0 = self.ctx.cfg.gas.mq135_r0, "keeping prior R0");
                self.ctx.health.record(e);
                None
            }
        }
    }

    /// One pass of the cooperative pipeline.
    pub fn tick(&mut self) {
        let now = self.ticker.now_ms();
        self.ctx.health.counters.ticks += 1;

        let sms_busy = !self.ctx.sms.is_idle();
        self.ctx
            .telemetry
            .service(self.hw.wifi.as_mut(), self.hw.cloud.as_mut(), now, sms_busy);

        if self
            .ctx
            .gps
            .drain(self.hw.gps_uart.as_mut(), self.hw.gps_parser.as_mut(), now)
        {
            self.ctx.display.notify("GPS FIX OK", "", now, NOTICE_MS);
            self.ctx.beeper.start(BeepPattern::Chirp, now);
        }
        self.ctx.health.gps_ok = self.ctx.gps.fix(now).is_some();

        if self.ctx.sensor_period.poll(now) {
            self.sense(now);
        }

        let now = self.ticker.now_ms();
        if let Some(report) = self.ctx.sms.tick(now, self.hw.gsm.as_mut()) {
            self.on_batch_done(&report, now);
        }

        if self.ctx.telemetry.publish(
            self.hw.cloud.as_mut(),
            &self.ctx.snapshot,
            &self.ctx.classification,
            now,
        ) {
            self.ctx.health.counters.publishes += 1;
        }
        self.ctx.health.counters.cloud_failures = self.ctx.telemetry.failures;
        self.ctx.health.wifi_ok = self.hw.wifi.is_connected();
        self.ctx.health.cloud_ok = self.ctx.telemetry.state() == LinkState::Connected;

        let view = DisplayView {
            snapshot: &self.ctx.snapshot,
            classification: &self.ctx.classification,
            health: &self.ctx.health,
            device_id: &self.ctx.cfg.device.device_id,
            sms_progress: self.ctx.sms.progress(),
        };
        self.ctx
            .display
            .update(panel(&mut self.hw.display), &view, now);
        self.ctx.health.counters.display_errors = self.ctx.display.errors;
        self.ctx.beeper.tick(self.hw.buzzer.as_mut(), now);

        if self.ctx.health_period.poll(now) {
            self.emit_health();
        }
    }

    fn sense(&mut self, now: u64) {
        let ctx = &mut self.ctx;
        ctx.health.counters.sensor_periods += 1;

        let (distance, err) = ctx.distance.read(self.hw.ultrasonic.as_mut());
        let dc = ctx.distance.counters;
        ctx.health.counters.sensor_timeouts = dc.timeouts;
        ctx.health.counters.sensor_out_of_range = dc.out_of_range;
        ctx.health.counters.sensor_reinits = dc.reinits;
        if let Some(e) = err {
            ctx.health.record(e);
        }
        if let Some(d) = distance {
            ctx.snapshot.distance_cm = Some(d);
            ctx.snapshot.fill_percent = fill_percent(d, ctx.cfg.device.bin_height_cm);
        }

        match ctx.gas.read(self.hw.gas_adc.as_mut(), &self.ticker) {
            Ok(s) => {
                ctx.snapshot.ppm = s.ppm_filtered;
                ctx.snapshot.adc_raw = s.adc_mean;
            }
            Err(e) => {
                ctx.health.counters.gas_errors += 1;
                ctx.health.record(e);
            }
        }

        let now = now.max(self.ticker.now_ms());
        ctx.snapshot.gps = ctx.gps.fix(now);
        ctx.snapshot.t_ms = now;
        ctx.classification = classify(ctx.snapshot.fill_percent, ctx.snapshot.ppm);
        debug!(
            distance = ?ctx.snapshot.distance_cm,
            fill = ctx.snapshot.fill_percent,
            ppm = ctx.snapshot.ppm,
            capacity = ctx.classification.capacity.label(),
            class = ctx.classification.waste_class.label(),
            "sensor period"
        );

        let decision = ctx.alert.evaluate(
            ctx.snapshot.fill_percent,
            ctx.snapshot.ppm,
            AlertContext {
                now_ms: now,
                dialog_idle: ctx.sms.is_idle(),
                gsm_ok: ctx.health.gsm_ok,
            },
        );
        ctx.health.counters.alerts_fired = ctx.alert.fired;
        ctx.health.counters.alerts_suppressed = ctx.alert.suppressed;
        match decision {
            AlertDecision::Quiet => {}
            AlertDecision::Sms(kind) => {
                let msg = compose_message(
                    &ctx.cfg.device.device_id,
                    &ctx.classification,
                    ctx.snapshot.gps,
                );
                if let Err(e) = ctx.sms.request(msg, now) {
                    ctx.health.record(e);
                }
                self.raise_alert(kind, now);
            }
            AlertDecision::CloudOnly(kind) => {
                self.ctx.health.counters.alerts_cloud_only += 1;
                self.raise_alert(kind, now);
            }
        }
    }

    fn raise_alert(&mut self, kind: AlertKind, now: u64) {
        let ctx = &mut self.ctx;
        let desc = format!(
            "{} alert: fill {:.0}%, gas {:.0} ppm, {}",
            kind.label(),
            ctx.classification.fill_percent,
            ctx.classification.ppm,
            ctx.classification.waste_class.label()
        );
        ctx.telemetry
            .event(self.hw.cloud.as_mut(), EVENT_CRITICAL_ALERT, &desc);
        ctx.beeper.start(BeepPattern::Alert, now);
        let headline = match kind {
            AlertKind::Critical => "ALERT: CRITICAL",
            AlertKind::FillOnly => "ALERT: BIN FULL",
        };
        ctx.display
            .notify(headline, ctx.classification.capacity.label(), now, NOTICE_MS);
    }

    fn on_batch_done(&mut self, report: &BatchReport, now: u64) {
        let ctx = &mut self.ctx;
        let c = &mut ctx.health.counters;
        c.sms_batches += 1;
        c.sms_sent += u32::try_from(report.sent).unwrap_or(u32::MAX);
        c.sms_failed += u32::try_from(report.failed).unwrap_or(u32::MAX);
        if let Some(e) = &report.last_failure {
            ctx.health.record(e.clone());
        }
        let line2 = format!("Sent {}/{}", report.sent, report.total);
        ctx.display.notify("SMS DONE", &line2, now, NOTICE_MS);
        ctx.telemetry
            .event(self.hw.cloud.as_mut(), EVENT_SMS_SENT, &line2);
    }

    fn emit_health(&mut self) {
        let h = &self.ctx.health;
        info!(
            wifi_ok = h.wifi_ok,
            cloud_ok = h.cloud_ok,
            gsm_ok = h.gsm_ok,
            gps_ok = h.gps_ok,
            mq_calibrated = h.mq_calibrated,
            display_ok = h.display_ok,
            last_error = h.last_error_kind(),
            sensor_timeouts = h.counters.sensor_timeouts,
            sms_sent = h.counters.sms_sent,
            "health"
        );
        match csv_line(&self.ctx.snapshot, &self.ctx.classification) {
            Ok(line) => {
                if let Err(e) = writeln!(self.hw.debug, "{line}") {
                    debug!(error = %e, "debug link write failed");
                }
            }
            Err(e) => warn!(error = %e, "health CSV encode failed"),
        }
    }

    /// Run `n` ticks, yielding `loop_yield_ms` between them.
    pub fn run_ticks(&mut self, n: u64) {
        for _ in 0..n {
            self.tick();
            self.ticker.sleep_ms(self.ctx.cfg.timing.loop_yield_ms);
        }
    }

    /// Run until `shutdown` is set, then release the hardware.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        info!("supervisor loop started");
        while !shutdown.load(Ordering::Relaxed) {
            self.tick();
            self.ticker.sleep_ms(self.ctx.cfg.timing.loop_yield_ms);
        }
        self.shutdown();
    }

    /// Silence outputs, drop the cloud session and blank the display.
    pub fn shutdown(&mut self) {
        self.ctx.beeper.silence(self.hw.buzzer.as_mut());
        let _ = self.hw.modem_power.set_low();
        self.hw.cloud.disconnect();
        if let Some(d) = self.hw.display.as_deref_mut() {
            let _ = d.clear();
        }
        let _ = self.hw.debug.flush();
        info!(ticks = self.ctx.health.counters.ticks, "supervisor stopped");
    }

    /// Take back the devices (tests, shutdown hand-off).
    pub fn into_peripherals(self) -> Peripherals {
        self.hw
    }
}

/// Result of one self-check probe.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckItem {
    pub name: &'static str,
    pub outcome: std::result::Result<String, BinsaiError>,
}

impl Supervisor {
    /// Probe every peripheral once without starting the loop.
    pub fn self_check(&mut self) -> Vec<CheckItem> {
        let mut items = Vec::with_capacity(6);
        let ping = self.ctx.distance.ping(self.hw.ultrasonic.as_mut());
        items.push(CheckItem {
            name: "ultrasonic",
            outcome: ping.map(|cm| format!("{cm:.1} cm")),
        });
        let gas = self
            .ctx
            .gas
            .read(self.hw.gas_adc.as_mut(), &self.ticker)
            .map(|s| format!("adc {:.0} -> {:.0} ppm", s.adc_mean, s.ppm_instant));
        items.push(CheckItem {
            name: "gas",
            outcome: gas,
        });
        let present = self.hw.display.as_deref_mut().is_some_and(|d| d.probe());
        items.push(CheckItem {
            name: "display",
            outcome: if present {
                Ok("present".into())
            } else {
                Err(BinsaiError::Hardware("no display".into()))
            },
        });
        items.push(CheckItem {
            name: "gsm",
            outcome: init_modem(
                self.hw.gsm.as_mut(),
                self.hw.modem_power.as_mut(),
                &self.ticker,
            )
            .map(|s| match s.rssi {
                Some(r) => format!("ready, rssi {r}"),
                None => "ready".into(),
            }),
        });
        let now = self.ticker.now_ms();
        self.ctx
            .gps
            .drain(self.hw.gps_uart.as_mut(), self.hw.gps_parser.as_mut(), now);
        items.push(CheckItem {
            name: "gps",
            outcome: self
                .ctx
                .gps
                .fix(now)
                .map(|f| format!("{} sats, hdop {:.1}", f.sats, f.hdop))
                .ok_or_else(|| BinsaiError::SensorOutOfRange("no valid fix".into())),
        });
        let connected =
            self.ctx
                .telemetry
                .connect(self.hw.wifi.as_mut(), self.hw.cloud.as_mut(), now);
        items.push(CheckItem {
            name: "cloud",
            outcome: if connected {
                Ok("connected".into())
            } else {
                Err(self
                    .ctx
                    .telemetry
                    .last_error
                    .clone()
                    .unwrap_or_else(|| BinsaiError::CloudDisconnected("unknown".into())))
            },
        });
        items
    }
}
