//! Peripheral assembly: simulated devices on the host, Raspberry Pi drivers with
//! `--features hardware`.

use crate::cli::SimArgs;
use crate::cloud::JsonlCloud;
use binsai_config::Config;
use binsai_core::{Peripherals, SharedClock, Ticker};
use binsai_hardware::NmeaParser;
use binsai_traits::{ManualClock, MonotonicClock};
use std::sync::Arc;

/// Sim handles kept after the devices are boxed, for the run summary.
#[derive(Debug, Clone)]
pub struct SimHandles {
    pub modem: binsai_hardware::sim::SimModem,
}

pub struct Rig {
    pub hw: Peripherals,
    pub clock: SharedClock,
    pub sim: Option<SimHandles>,
}

pub fn clock_for(sim: &SimArgs) -> SharedClock {
    if sim.sim_time && cfg!(not(feature = "hardware")) {
        Arc::new(ManualClock::new())
    } else {
        Arc::new(MonotonicClock::new())
    }
}

fn cloud(clock: &SharedClock, reachable: bool) -> Box<JsonlCloud> {
    Box::new(JsonlCloud::new(
        Box::new(std::io::stdout()),
        Ticker::new(clock.clone()),
        reachable,
    ))
}

#[cfg(not(feature = "hardware"))]
pub fn assemble(cfg: &Config, sim: &SimArgs) -> eyre::Result<Rig> {
    use binsai_core::calibration::PpmConverter;
    use binsai_hardware::sim::{
        SimDisplay, SimGasAdc, SimGps, SimModem, SimPin, SimUltrasonic, SimWifi,
    };

    let clock = clock_for(sim);
    let conv = PpmConverter::from_config(&cfg.gas, 4095);
    let us = SimUltrasonic::new(sim.distance_cm);
    let adc = SimGasAdc::new(conv.raw_for_ppm(sim.ppm));
    let modem = SimModem::new();
    modem.set_responsive(!sim.modem_down);
    let gps = SimGps::new(4);
    if let Some((lat, lon)) = sim.gps_fix {
        gps.set_fix(lat, lon, 7, 1.2);
    }
    tracing::info!(
        distance_cm = sim.distance_cm,
        ppm = sim.ppm,
        sim_time = sim.sim_time,
        "using simulated peripherals"
    );
    let hw = Peripherals {
        ultrasonic: Box::new(us),
        gas_adc: Box::new(adc),
        gsm: Box::new(modem.clone()),
        modem_power: Box::new(SimPin::default()),
        gps_uart: Box::new(gps),
        gps_parser: Box::new(NmeaParser::new()),
        display: (!sim.no_display).then(|| {
            Box::new(SimDisplay::new(true)) as Box<dyn binsai_traits::CharDisplay>
        }),
        buzzer: Box::new(SimPin::default()),
        wifi: Box::new(SimWifi::new([0x02, 0x42, 0x53, 0x00, 0x00, 0x01])),
        cloud: cloud(&clock, !sim.offline),
        debug: Box::new(std::io::stderr()),
    };
    Ok(Rig {
        hw,
        clock,
        sim: Some(SimHandles { modem }),
    })
}

#[cfg(feature = "hardware")]
pub fn assemble(cfg: &Config, sim: &SimArgs) -> eyre::Result<Rig> {
    use binsai_hardware::host::HostWifi;
    use binsai_hardware::pi::{Mcp3008, Pcf8574Lcd, PiPin, PiUart, PiUltrasonic};
    use eyre::WrapErr;

    let _ = sim;
    let h = &cfg.hardware;
    let clock: SharedClock = Arc::new(MonotonicClock::new());
    let ultrasonic = PiUltrasonic::new(h.trig_pin, h.echo_pin)
        .wrap_err_with(|| format!("open ultrasonic pins trig={} echo={}", h.trig_pin, h.echo_pin))?;
    let gas_adc = Mcp3008::new(h.adc_channel).wrap_err("open MCP3008")?;
    let gsm = PiUart::open(&h.gsm_uart, h.gsm_baud)
        .wrap_err_with(|| format!("open GSM UART {}", h.gsm_uart))?;
    let gps = PiUart::open(&h.gps_uart, h.gps_baud)
        .wrap_err_with(|| format!("open GPS UART {}", h.gps_uart))?;
    let display = match Pcf8574Lcd::new(h.lcd_i2c_addr) {
        Ok(lcd) => Some(Box::new(lcd) as Box<dyn binsai_traits::CharDisplay>),
        Err(e) => {
            tracing::warn!(error = %e, addr = h.lcd_i2c_addr, "LCD unavailable; running headless");
            None
        }
    };
    let hw = Peripherals {
        ultrasonic: Box::new(ultrasonic),
        gas_adc: Box::new(gas_adc),
        gsm: Box::new(gsm),
        modem_power: Box::new(PiPin::new(h.modem_power_pin).wrap_err("open modem power pin")?),
        gps_uart: Box::new(gps),
        gps_parser: Box::new(NmeaParser::new()),
        display,
        buzzer: Box::new(PiPin::new(h.buzzer_pin).wrap_err("open buzzer pin")?),
        wifi: Box::new(HostWifi::new("wlan0")),
        cloud: cloud(&clock, true),
        debug: Box::new(std::io::stderr()),
    };
    Ok(Rig {
        hw,
        clock,
        sim: None,
    })
}
