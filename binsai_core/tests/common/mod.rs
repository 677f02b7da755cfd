//! Simulated bin rig shared by the integration tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use std::sync::Arc;

use binsai_config::{Config, GasCfg};
use binsai_core::calibration::PpmConverter;
use binsai_core::supervisor::{BringUpReport, Peripherals, Supervisor};
use binsai_hardware::NmeaParser;
use binsai_hardware::sim::{
    SimCloud, SimDisplay, SimGasAdc, SimGps, SimModem, SimPin, SimUltrasonic, SimWifi,
};
use binsai_traits::ManualClock;

pub const MAC: [u8; 6] = [0x24, 0x6F, 0x28, 0xA1, 0xB2, 0xC3];
pub const NUMBERS: [&str; 2] = ["+6281234567", "+6289876543"];

/// Debug link capturing every line written by the supervisor.
#[derive(Clone, Default)]
pub struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.device.device_id = "BINSAI-TEST01".into();
    cfg.network.wifi_ssid = "lab".into();
    cfg.network.cloud_token = "token".into();
    cfg.sms.phone_numbers = NUMBERS.iter().map(ToString::to_string).collect();
    cfg.timing.skip_boot_calibration = true;
    cfg
}

/// ADC reading the default power-law model maps to roughly `ppm`.
pub fn adc_for_ppm(ppm: f32) -> u16 {
    PpmConverter::from_config(&GasCfg::default(), 4095).raw_for_ppm(ppm)
}

pub struct Rig {
    pub clock: ManualClock,
    pub us: SimUltrasonic,
    pub adc: SimGasAdc,
    pub modem: SimModem,
    pub gps: SimGps,
    pub display: SimDisplay,
    pub buzzer: SimPin,
    pub power_key: SimPin,
    pub wifi: SimWifi,
    pub cloud: SimCloud,
    pub debug: SharedBuf,
    pub sup: Supervisor,
}

impl Rig {
    pub fn new(cfg: Config) -> Self {
        Self::build(cfg, true)
    }

    /// Build a rig, letting `tweak` adjust the simulators before bring-up.
    pub fn with(cfg: Config, tweak: impl FnOnce(&Self)) -> Self {
        let rig = Self::build(cfg, true);
        tweak(&rig);
        rig
    }

    /// A rig whose display never acknowledges.
    pub fn headless(cfg: Config) -> Self {
        Self::build(cfg, false)
    }

    fn build(cfg: Config, display_present: bool) -> Self {
        let clock = ManualClock::new();
        let us = SimUltrasonic::new(38.0);
        let adc = SimGasAdc::new(adc_for_ppm(120.0));
        let modem = SimModem::new();
        let gps = SimGps::new(2);
        let display = SimDisplay::new(display_present);
        let buzzer = SimPin::default();
        let power_key = SimPin::default();
        let wifi = SimWifi::new(MAC);
        let cloud = SimCloud::new();
        let debug = SharedBuf::default();
        let hw = Peripherals {
            ultrasonic: Box::new(us.clone()),
            gas_adc: Box::new(adc.clone()),
            gsm: Box::new(modem.clone()),
            modem_power: Box::new(power_key.clone()),
            gps_uart: Box::new(gps.clone()),
            gps_parser: Box::new(NmeaParser::new()),
            display: Some(Box::new(display.clone())),
            buzzer: Box::new(buzzer.clone()),
            wifi: Box::new(wifi.clone()),
            cloud: Box::new(cloud.clone()),
            debug: Box::new(debug.clone()),
        };
        let sup = Supervisor::builder()
            .config(cfg)
            .peripherals(hw)
            .clock(Arc::new(clock.clone()))
            .try_build()
            .expect("valid rig");
        Self {
            clock,
            us,
            adc,
            modem,
            gps,
            display,
            buzzer,
            power_key,
            wifi,
            cloud,
            debug,
            sup,
        }
    }

    pub fn bring_up(&mut self) -> BringUpReport {
        self.sup.bring_up().expect("bring-up")
    }

    pub fn now(&self) -> u64 {
        self.sup.now_ms()
    }

    /// Tick until `ms` of simulated time have passed.
    pub fn run_for(&mut self, ms: u64) {
        let end = self.now() + ms;
        while self.now() < end {
            self.sup.run_ticks(1);
        }
    }

    /// Run exactly `n` sensor periods.
    pub fn sensor_periods(&mut self, n: u64) {
        let target = self.sup.health().counters.sensor_periods + n;
        while self.sup.health().counters.sensor_periods < target {
            self.sup.run_ticks(1);
        }
    }

    pub fn set_inputs(&self, distance_cm: f32, ppm: f32) {
        self.us.set_distance_cm(distance_cm);
        self.adc.set_raw(adc_for_ppm(ppm));
    }
}
