//! Blocking GSM modem bring-up: power key, AT handshake, SIM and network checks.
use binsai_traits::{OutputPin, SerialPort};
use tracing::{debug, info, warn};

use crate::error::BinsaiError;
use crate::hw_error::map_box;
use crate::schedule::Ticker;

pub const POWER_PULSE_MS: u64 = 1_500;
pub const POWER_SETTLE_MS: u64 = 3_000;
pub const AT_TIMEOUT_MS: u64 = 2_000;
pub const AT_RETRIES: u32 = 5;
pub const SIM_TIMEOUT_MS: u64 = 5_000;
pub const REGISTRATION_TIMEOUT_MS: u64 = 10_000;
const POLL_MS: u64 = 10;
const REGISTRATION_POLL_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModemStatus {
    /// Raw `+CSQ` RSSI (0..=31, 99 unknown).
    pub rssi: Option<u8>,
}

/// Send `cmd` and collect response lines until `OK` or an error line.
fn command(
    port: &mut dyn SerialPort,
    ticker: &Ticker,
    cmd: &str,
    timeout_ms: u64,
) -> Result<Vec<String>, BinsaiError> {
    let mut scratch = [0u8; 64];
    while matches!(port.read_available(&mut scratch), Ok(n) if n > 0) {}

    port.write(format!("{cmd}\r").as_bytes())
        .map_err(|e| map_box(&e))?;
    let start = ticker.now_ms();
    let mut lines = Vec::new();
    let mut partial = Vec::new();
    loop {
        let n = port.read_available(&mut scratch).map_err(|e| map_box(&e))?;
        for &b in &scratch[..n] {
            if b == b'\r' || b == b'\n' {
                if !partial.is_empty() {
                    let line = String::from_utf8_lossy(&partial).trim().to_string();
                    partial.clear();
                    if line == "OK" {
                        debug!(cmd, ?lines, "modem ok");
                        return Ok(lines);
                    }
                    if line.contains("ERROR") {
                        return Err(BinsaiError::ModemNoResponse(format!("{cmd}: {line}")));
                    }
                    lines.push(line);
                }
            } else {
                partial.push(b);
            }
        }
        if ticker.now_ms().saturating_sub(start) >= timeout_ms {
            return Err(BinsaiError::ModemNoResponse(format!(
                "{cmd}: no reply within {timeout_ms} ms"
            )));
        }
        ticker.sleep_ms(POLL_MS);
    }
}

fn registered(lines: &[String]) -> bool {
    lines.iter().any(|l| {
        l.strip_prefix("+CREG:")
            .and_then(|rest| rest.split(',').nth(1))
            .is_some_and(|stat| matches!(stat.trim(), "1" | "5"))
    })
}

fn parse_rssi(lines: &[String]) -> Option<u8> {
    lines.iter().find_map(|l| {
        l.strip_prefix("+CSQ:")
            .and_then(|rest| rest.split(',').next())
            .and_then(|v| v.trim().parse().ok())
    })
}

/// Power the modem and walk the init sequence. Blocks up to ~40 s.
pub fn init_modem(
    port: &mut dyn SerialPort,
    power_key: &mut dyn OutputPin,
    ticker: &Ticker,
) -> Result<ModemStatus, BinsaiError> {
    power_key.set_high().map_err(|e| map_box(&e))?;
    ticker.sleep_ms(POWER_PULSE_MS);
    power_key.set_low().map_err(|e| map_box(&e))?;
    ticker.sleep_ms(POWER_SETTLE_MS);

    let mut alive = false;
    for attempt in 1..=AT_RETRIES {
        match command(port, ticker, "AT", AT_TIMEOUT_MS) {
            Ok(_) => {
                alive = true;
                break;
            }
            Err(e) => debug!(attempt, error = %e, "AT handshake failed"),
        }
    }
    if !alive {
        warn!(retries = AT_RETRIES, "modem silent");
        return Err(BinsaiError::ModemNoResponse(format!(
            "no reply to AT after {AT_RETRIES} attempts"
        )));
    }

    command(port, ticker, "ATE0", AT_TIMEOUT_MS)?;
    command(port, ticker, "AT+CMGF=1", AT_TIMEOUT_MS)?;

    let sim = command(port, ticker, "AT+CPIN?", SIM_TIMEOUT_MS)?;
    if !sim.iter().any(|l| l.contains("READY")) {
        return Err(BinsaiError::ModemNoResponse("SIM not ready".into()));
    }

    let start = ticker.now_ms();
    loop {
        let lines = command(port, ticker, "AT+CREG?", AT_TIMEOUT_MS)?;
        if registered(&lines) {
            break;
        }
        if ticker.now_ms().saturating_sub(start) >= REGISTRATION_TIMEOUT_MS {
            return Err(BinsaiError::ModemNoResponse(
                "not registered on the network".into(),
            ));
        }
        ticker.sleep_ms(REGISTRATION_POLL_MS);
    }

    let rssi = command(port, ticker, "AT+CSQ", AT_TIMEOUT_MS)
        .ok()
        .and_then(|lines| parse_rssi(&lines));
    if rssi.is_none_or(|r| r == 99 || r < 5) {
        warn!(?rssi, "weak or unknown GSM signal");
    }
    info!(?rssi, "modem ready");
    Ok(ModemStatus { rssi })
}
