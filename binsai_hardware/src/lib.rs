//! Peripheral bindings for the bin monitor.
//!
//! - `sim`: simulated sensors, modem, GPS, display and cloud for host runs and tests
//! - `nmea`: GGA decoder implementing `GpsParser`
//! - `kv`: in-memory and file-backed key/value areas
//! - `host`: network link using the host interface
//! - `pi` (feature `hardware`): Raspberry Pi GPIO/SPI/I²C/UART drivers
pub mod error;
pub mod host;
pub mod kv;
pub mod nmea;
pub mod sim;
pub mod util;

#[cfg(feature = "hardware")]
pub mod pi;

pub use error::HwError;
pub use nmea::NmeaParser;
