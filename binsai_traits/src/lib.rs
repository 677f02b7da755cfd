//! Hardware and collaborator seams for the bin monitor.
//!
//! Every trait is object-safe and reports failures as boxed errors so that
//! platform bindings, simulators and test doubles can plug in freely. The core
//! maps these errors to its typed error enum at the boundary.
pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

use std::time::Duration;

/// Error type crossing every trait boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// HC-SR04 style ranging sensor (trigger output + echo input).
pub trait Ultrasonic {
    /// Fire a 10 µs trigger pulse and return the echo-high width in
    /// microseconds. Returns `Ok(0)` when no echo arrived within `timeout`.
    fn echo_width_us(&mut self, timeout: Duration) -> Result<u32, BoxError>;
    /// Re-initialise the trigger/echo pins after repeated failures.
    fn reinit(&mut self) -> Result<(), BoxError>;
}

/// Single analog input channel (gas sensor).
pub trait AnalogIn {
    fn read_raw(&mut self) -> Result<u16, BoxError>;
    /// Full-scale raw value (4095 for a 12-bit converter).
    fn full_scale(&self) -> u16 {
        4095
    }
}

/// Byte-oriented UART. Reads never block.
pub trait SerialPort {
    fn write(&mut self, bytes: &[u8]) -> Result<(), BoxError>;
    /// Copy whatever bytes are already buffered into `buf`; `Ok(0)` when none.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, BoxError>;
}

/// One decoded location update from an NMEA stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsReading {
    pub lat: f64,
    pub lon: f64,
    pub sats: u32,
    pub hdop: f32,
}

/// NMEA sentence decoder fed byte by byte.
pub trait GpsParser {
    fn feed(&mut self, byte: u8);
    /// Take the most recent location update, if one arrived since the last call.
    fn take_update(&mut self) -> Option<GpsReading>;
}

/// Character display (e.g. 16x2 LCD behind an I²C backpack).
pub trait CharDisplay {
    /// Returns true when the device acknowledges on its bus.
    fn probe(&mut self) -> bool;
    fn columns(&self) -> usize {
        16
    }
    fn rows(&self) -> usize {
        2
    }
    fn clear(&mut self) -> Result<(), BoxError>;
    fn write_row(&mut self, row: usize, text: &str) -> Result<(), BoxError>;
}

/// Plain digital output (buzzer, modem power key).
pub trait OutputPin {
    fn set_high(&mut self) -> Result<(), BoxError>;
    fn set_low(&mut self) -> Result<(), BoxError>;
}

/// Station-mode network link.
pub trait WifiLink {
    fn connect(&mut self, ssid: &str, pass: &str, timeout: Duration) -> Result<(), BoxError>;
    fn is_connected(&self) -> bool;
    fn mac_address(&self) -> [u8; 6];
}

/// Value written to a cloud virtual channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelValue<'a> {
    Int(i64),
    Float(f64),
    Text(&'a str),
}

/// Cloud telemetry library handle (virtual-pin style API).
pub trait CloudLink {
    fn connect(&mut self, token: &str, timeout: Duration) -> Result<(), BoxError>;
    fn is_connected(&self) -> bool;
    /// Service the library (heartbeats, inbound traffic).
    fn run(&mut self) -> Result<(), BoxError>;
    fn virtual_write(&mut self, channel: u8, value: ChannelValue<'_>) -> Result<(), BoxError>;
    fn set_property(&mut self, channel: u8, property: &str, value: &str) -> Result<(), BoxError>;
    fn log_event(&mut self, name: &str, description: &str) -> Result<(), BoxError>;
    fn disconnect(&mut self);
}

/// Scalar stored in the key/value area, kept in its natural type.
#[derive(Debug, Clone, PartialEq)]
pub enum KvValue {
    Str(String),
    F32(f32),
    U32(u32),
    U64(u64),
    Bool(bool),
}

/// Namespaced non-volatile key/value area.
///
/// A namespace must be opened before `get`/`set`; each `set` is atomic on its own.
pub trait KvStore {
    fn open(&mut self, namespace: &str) -> Result<(), BoxError>;
    fn close(&mut self) -> Result<(), BoxError>;
    fn get(&self, key: &str) -> Result<Option<KvValue>, BoxError>;
    fn set(&mut self, key: &str, value: KvValue) -> Result<(), BoxError>;
}

impl<T: Ultrasonic + ?Sized> Ultrasonic for Box<T> {
    fn echo_width_us(&mut self, timeout: Duration) -> Result<u32, BoxError> {
        (**self).echo_width_us(timeout)
    }
    fn reinit(&mut self) -> Result<(), BoxError> {
        (**self).reinit()
    }
}

impl<T: AnalogIn + ?Sized> AnalogIn for Box<T> {
    fn read_raw(&mut self) -> Result<u16, BoxError> {
        (**self).read_raw()
    }
    fn full_scale(&self) -> u16 {
        (**self).full_scale()
    }
}

impl<T: SerialPort + ?Sized> SerialPort for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), BoxError> {
        (**self).write(bytes)
    }
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, BoxError> {
        (**self).read_available(buf)
    }
}

impl<T: GpsParser + ?Sized> GpsParser for Box<T> {
    fn feed(&mut self, byte: u8) {
        (**self).feed(byte);
    }
    fn take_update(&mut self) -> Option<GpsReading> {
        (**self).take_update()
    }
}

impl<T: CharDisplay + ?Sized> CharDisplay for Box<T> {
    fn probe(&mut self) -> bool {
        (**self).probe()
    }
    fn columns(&self) -> usize {
        (**self).columns()
    }
    fn rows(&self) -> usize {
        (**self).rows()
    }
    fn clear(&mut self) -> Result<(), BoxError> {
        (**self).clear()
    }
    fn write_row(&mut self, row: usize, text: &str) -> Result<(), BoxError> {
        (**self).write_row(row, text)
    }
}

impl<T: OutputPin + ?Sized> OutputPin for Box<T> {
    fn set_high(&mut self) -> Result<(), BoxError> {
        (**self).set_high()
    }
    fn set_low(&mut self) -> Result<(), BoxError> {
        (**self).set_low()
    }
}

impl<T: WifiLink + ?Sized> WifiLink for Box<T> {
    fn connect(&mut self, ssid: &str, pass: &str, timeout: Duration) -> Result<(), BoxError> {
        (**self).connect(ssid, pass, timeout)
    }
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
    fn mac_address(&self) -> [u8; 6] {
        (**self).mac_address()
    }
}

impl<T: CloudLink + ?Sized> CloudLink for Box<T> {
    fn connect(&mut self, token: &str, timeout: Duration) -> Result<(), BoxError> {
        (**self).connect(token, timeout)
    }
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
    fn run(&mut self) -> Result<(), BoxError> {
        (**self).run()
    }
    fn virtual_write(&mut self, channel: u8, value: ChannelValue<'_>) -> Result<(), BoxError> {
        (**self).virtual_write(channel, value)
    }
    fn set_property(&mut self, channel: u8, property: &str, value: &str) -> Result<(), BoxError> {
        (**self).set_property(channel, property, value)
    }
    fn log_event(&mut self, name: &str, description: &str) -> Result<(), BoxError> {
        (**self).log_event(name, description)
    }
    fn disconnect(&mut self) {
        (**self).disconnect();
    }
}

impl<T: KvStore + ?Sized> KvStore for Box<T> {
    fn open(&mut self, namespace: &str) -> Result<(), BoxError> {
        (**self).open(namespace)
    }
    fn close(&mut self) -> Result<(), BoxError> {
        (**self).close()
    }
    fn get(&self, key: &str) -> Result<Option<KvValue>, BoxError> {
        (**self).get(key)
    }
    fn set(&mut self, key: &str, value: KvValue) -> Result<(), BoxError> {
        (**self).set(key, value)
    }
}
