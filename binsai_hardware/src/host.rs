//! Network link backed by the host's own interface (Linux sysfs).
//!
//! Association is handled by the OS; `connect` only waits for the interface to
//! report `up`.
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use binsai_traits::{BoxError, WifiLink};

use crate::error::HwError;

pub struct HostWifi {
    sys: PathBuf,
}

impl HostWifi {
    pub fn new(iface: &str) -> Self {
        Self {
            sys: PathBuf::from("/sys/class/net").join(iface),
        }
    }

    fn up(&self) -> bool {
        fs::read_to_string(self.sys.join("operstate")).is_ok_and(|s| s.trim() == "up")
    }
}

pub fn parse_mac(text: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = text.trim().split(':');
    for slot in &mut mac {
        *slot = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    parts.next().is_none().then_some(mac)
}

impl WifiLink for HostWifi {
    fn connect(&mut self, ssid: &str, _pass: &str, timeout: Duration) -> Result<(), BoxError> {
        let deadline = Instant::now() + timeout;
        while !self.up() {
            if Instant::now() >= deadline {
                return Err(Box::new(HwError::NoDevice(format!(
                    "{} not up (ssid '{ssid}'): timeout",
                    self.sys.display()
                ))));
            }
            std::thread::sleep(Duration::from_millis(250));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.up()
    }

    fn mac_address(&self) -> [u8; 6] {
        fs::read_to_string(self.sys.join("address"))
            .ok()
            .and_then(|s| parse_mac(&s))
            .unwrap_or_default()
    }
}
