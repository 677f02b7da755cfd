//! Simulated peripherals for host runs and tests.
//!
//! Every type is a cheap handle around shared state: clone it, box one copy for
//! the supervisor and keep the other to steer inputs and inspect outputs.
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use binsai_traits::{
    AnalogIn, BoxError, ChannelValue, CharDisplay, CloudLink, OutputPin, SerialPort, Ultrasonic,
    WifiLink,
};

use crate::error::HwError;
use crate::nmea::format_gga;

/// Echo width per centimetre of range (sound at 343 m/s, round trip).
pub const US_PER_CM: f32 = 1.0 / 0.017_15;

#[derive(Debug, Clone, Default)]
pub struct SimUltrasonic {
    width_us: Rc<Cell<u32>>,
    pings: Rc<Cell<u32>>,
    reinits: Rc<Cell<u32>>,
}

impl SimUltrasonic {
    pub fn new(distance_cm: f32) -> Self {
        let s = Self::default();
        s.set_distance_cm(distance_cm);
        s
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn set_distance_cm(&self, cm: f32) {
        self.width_us.set((cm.max(0.0) * US_PER_CM).round() as u32);
    }

    /// Every following ping times out.
    pub fn set_no_echo(&self) {
        self.width_us.set(0);
    }

    pub fn pings(&self) -> u32 {
        self.pings.get()
    }

    pub fn reinits(&self) -> u32 {
        self.reinits.get()
    }
}

impl Ultrasonic for SimUltrasonic {
    fn echo_width_us(&mut self, _timeout: Duration) -> Result<u32, BoxError> {
        self.pings.set(self.pings.get() + 1);
        Ok(self.width_us.get())
    }

    fn reinit(&mut self) -> Result<(), BoxError> {
        self.reinits.set(self.reinits.get() + 1);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SimGasAdc {
    raw: Rc<Cell<u16>>,
    full_scale: u16,
    fail: Rc<Cell<bool>>,
}

impl SimGasAdc {
    pub fn new(raw: u16) -> Self {
        Self {
            raw: Rc::new(Cell::new(raw)),
            full_scale: 4095,
            fail: Rc::new(Cell::new(false)),
        }
    }

    pub fn set_raw(&self, raw: u16) {
        self.raw.set(raw);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.set(fail);
    }
}

impl AnalogIn for SimGasAdc {
    fn read_raw(&mut self) -> Result<u16, BoxError> {
        if self.fail.get() {
            return Err(Box::new(HwError::Spi("simulated adc fault".into())));
        }
        Ok(self.raw.get().min(self.full_scale))
    }

    fn full_scale(&self) -> u16 {
        self.full_scale
    }
}

/// One message accepted by the simulated modem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentSms {
    pub number: String,
    pub body: String,
}

#[derive(Debug)]
struct ModemState {
    rx: VecDeque<u8>,
    line: Vec<u8>,
    body: Option<(String, Vec<u8>)>,
    responsive: bool,
    sim_ready: bool,
    registered: bool,
    rssi: u8,
    fail_numbers: Vec<String>,
    withhold_confirm: bool,
    commands: Vec<String>,
    sent: Vec<SentSms>,
    next_ref: u32,
}

/// AT-command responder standing in for a SIM800-class modem.
#[derive(Debug, Clone)]
pub struct SimModem {
    st: Rc<RefCell<ModemState>>,
}

impl Default for SimModem {
    fn default() -> Self {
        Self::new()
    }
}

impl SimModem {
    pub fn new() -> Self {
        Self {
            st: Rc::new(RefCell::new(ModemState {
                rx: VecDeque::new(),
                line: Vec::new(),
                body: None,
                responsive: true,
                sim_ready: true,
                registered: true,
                rssi: 18,
                fail_numbers: Vec::new(),
                withhold_confirm: false,
                commands: Vec::new(),
                sent: Vec::new(),
                next_ref: 1,
            })),
        }
    }

    /// A powered-off modem swallows every command.
    pub fn set_responsive(&self, on: bool) {
        self.st.borrow_mut().responsive = on;
    }

    pub fn set_sim_ready(&self, ready: bool) {
        self.st.borrow_mut().sim_ready = ready;
    }

    pub fn set_registered(&self, registered: bool) {
        self.st.borrow_mut().registered = registered;
    }

    /// `AT+CMGS` to this number answers `ERROR`.
    pub fn fail_number(&self, number: &str) {
        self.st.borrow_mut().fail_numbers.push(number.to_string());
    }

    /// Accept bodies but never confirm them.
    pub fn set_withhold_confirm(&self, on: bool) {
        self.st.borrow_mut().withhold_confirm = on;
    }

    pub fn sent(&self) -> Vec<SentSms> {
        self.st.borrow().sent.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.st.borrow().commands.clone()
    }

    fn reply(st: &mut ModemState, text: &str) {
        st.rx.extend(text.as_bytes());
    }

    fn handle_line(st: &mut ModemState, line: &str) {
        st.commands.push(line.to_string());
        if !st.responsive {
            return;
        }
        match line {
            "AT" | "ATE0" | "AT+CMGF=1" => Self::reply(st, "\r\nOK\r\n"),
            "AT+CPIN?" if st.sim_ready => Self::reply(st, "\r\n+CPIN: READY\r\n\r\nOK\r\n"),
            "AT+CPIN?" => Self::reply(st, "\r\n+CME ERROR: 10\r\n"),
            "AT+CREG?" if st.registered => Self::reply(st, "\r\n+CREG: 0,1\r\n\r\nOK\r\n"),
            "AT+CREG?" => Self::reply(st, "\r\n+CREG: 0,2\r\n\r\nOK\r\n"),
            "AT+CSQ" => {
                let text = format!("\r\n+CSQ: {},0\r\n\r\nOK\r\n", st.rssi);
                Self::reply(st, &text);
            }
            _ => {
                let number = line
                    .strip_prefix("AT+CMGS=\"")
                    .and_then(|rest| rest.strip_suffix('"'));
                match number {
                    Some(n) if st.fail_numbers.iter().any(|f| f == n) => {
                        Self::reply(st, "\r\nERROR\r\n");
                    }
                    Some(n) => {
                        st.body = Some((n.to_string(), Vec::new()));
                        Self::reply(st, "\r\n> ");
                    }
                    None => Self::reply(st, "\r\nERROR\r\n"),
                }
            }
        }
    }

    fn finish_body(st: &mut ModemState) {
        let Some((number, body)) = st.body.take() else {
            return;
        };
        if st.withhold_confirm {
            return;
        }
        st.sent.push(SentSms {
            number,
            body: String::from_utf8_lossy(&body).into_owned(),
        });
        let text = format!("\r\n+CMGS: {}\r\n\r\nOK\r\n", st.next_ref);
        st.next_ref += 1;
        Self::reply(st, &text);
    }

    fn handle_byte(st: &mut ModemState, b: u8) {
        if st.body.is_some() {
            match b {
                0x1A => Self::finish_body(st),
                0x1B => st.body = None,
                _ => {
                    if let Some((_, body)) = st.body.as_mut() {
                        body.push(b);
                    }
                }
            }
            return;
        }
        match b {
            b'\r' => {
                let line = String::from_utf8_lossy(&st.line).trim().to_string();
                st.line.clear();
                if !line.is_empty() {
                    Self::handle_line(st, &line);
                }
            }
            b'\n' => {}
            _ => st.line.push(b),
        }
    }
}

impl SerialPort for SimModem {
    fn write(&mut self, bytes: &[u8]) -> Result<(), BoxError> {
        let mut st = self.st.borrow_mut();
        for &b in bytes {
            Self::handle_byte(&mut st, b);
        }
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, BoxError> {
        let mut st = self.st.borrow_mut();
        let n = buf.len().min(st.rx.len());
        for (dst, src) in buf.iter_mut().zip(st.rx.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

#[derive(Debug, Default)]
struct GpsState {
    pending: VecDeque<u8>,
    fix: Option<(f64, f64, u32, f32)>,
    reads: u32,
    every_reads: u32,
}

/// GPS receiver UART emitting a GGA sentence every `every_reads` reads.
#[derive(Debug, Clone)]
pub struct SimGps {
    st: Rc<RefCell<GpsState>>,
}

impl SimGps {
    pub fn new(every_reads: u32) -> Self {
        Self {
            st: Rc::new(RefCell::new(GpsState {
                every_reads: every_reads.max(1),
                ..GpsState::default()
            })),
        }
    }

    pub fn set_fix(&self, lat: f64, lon: f64, sats: u32, hdop: f32) {
        self.st.borrow_mut().fix = Some((lat, lon, sats, hdop));
    }

    /// Receiver goes quiet (e.g. antenna covered).
    pub fn clear_fix(&self) {
        self.st.borrow_mut().fix = None;
    }

    pub fn push_raw(&self, text: &str) {
        self.st.borrow_mut().pending.extend(text.as_bytes());
    }
}

impl SerialPort for SimGps {
    fn write(&mut self, _bytes: &[u8]) -> Result<(), BoxError> {
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, BoxError> {
        let mut st = self.st.borrow_mut();
        if st.pending.is_empty() {
            st.reads = st.reads.wrapping_add(1);
            if st.reads % st.every_reads == 0
                && let Some((lat, lon, sats, hdop)) = st.fix
            {
                let s = format_gga(lat, lon, sats, hdop);
                st.pending.extend(s.as_bytes());
            }
        }
        let n = buf.len().min(st.pending.len());
        for (dst, src) in buf.iter_mut().zip(st.pending.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

#[derive(Debug, Default)]
struct DisplayState {
    present: bool,
    rows: Vec<String>,
    writes: u32,
    clears: u32,
}

#[derive(Debug, Clone)]
pub struct SimDisplay {
    st: Rc<RefCell<DisplayState>>,
}

impl SimDisplay {
    pub fn new(present: bool) -> Self {
        Self {
            st: Rc::new(RefCell::new(DisplayState {
                present,
                rows: vec![String::new(); 2],
                ..DisplayState::default()
            })),
        }
    }

    pub fn rows(&self) -> Vec<String> {
        self.st.borrow().rows.clone()
    }

    pub fn writes(&self) -> u32 {
        self.st.borrow().writes
    }

    pub fn clears(&self) -> u32 {
        self.st.borrow().clears
    }
}

impl CharDisplay for SimDisplay {
    fn probe(&mut self) -> bool {
        self.st.borrow().present
    }

    fn clear(&mut self) -> Result<(), BoxError> {
        let mut st = self.st.borrow_mut();
        if !st.present {
            return Err(Box::new(HwError::NoDevice("display".into())));
        }
        st.clears += 1;
        st.rows.iter_mut().for_each(String::clear);
        Ok(())
    }

    fn write_row(&mut self, row: usize, text: &str) -> Result<(), BoxError> {
        let mut st = self.st.borrow_mut();
        if !st.present {
            return Err(Box::new(HwError::NoDevice("display".into())));
        }
        if let Some(r) = st.rows.get_mut(row) {
            *r = text.chars().take(16).collect();
        }
        st.writes += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimPin {
    high: Rc<Cell<bool>>,
    rises: Rc<Cell<u32>>,
}

impl SimPin {
    pub fn is_high(&self) -> bool {
        self.high.get()
    }

    /// Number of low→high transitions seen.
    pub fn rises(&self) -> u32 {
        self.rises.get()
    }
}

impl OutputPin for SimPin {
    fn set_high(&mut self) -> Result<(), BoxError> {
        if !self.high.get() {
            self.rises.set(self.rises.get() + 1);
        }
        self.high.set(true);
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), BoxError> {
        self.high.set(false);
        Ok(())
    }
}

#[derive(Debug)]
struct WifiState {
    available: bool,
    connected: bool,
    attempts: u32,
    mac: [u8; 6],
}

#[derive(Debug, Clone)]
pub struct SimWifi {
    st: Rc<RefCell<WifiState>>,
}

impl SimWifi {
    pub fn new(mac: [u8; 6]) -> Self {
        Self {
            st: Rc::new(RefCell::new(WifiState {
                available: true,
                connected: false,
                attempts: 0,
                mac,
            })),
        }
    }

    /// Take the access point up or down; down also drops the association.
    pub fn set_available(&self, on: bool) {
        let mut st = self.st.borrow_mut();
        st.available = on;
        if !on {
            st.connected = false;
        }
    }

    pub fn attempts(&self) -> u32 {
        self.st.borrow().attempts
    }
}

impl WifiLink for SimWifi {
    fn connect(&mut self, ssid: &str, _pass: &str, _timeout: Duration) -> Result<(), BoxError> {
        let mut st = self.st.borrow_mut();
        st.attempts += 1;
        if !st.available {
            return Err(format!("wifi '{ssid}' not reachable: timeout").into());
        }
        st.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        let st = self.st.borrow();
        st.available && st.connected
    }

    fn mac_address(&self) -> [u8; 6] {
        self.st.borrow().mac
    }
}

#[derive(Debug, Default)]
struct CloudState {
    reachable: bool,
    connected: bool,
    attempts: u32,
    runs: u32,
    writes: Vec<(u8, String)>,
    properties: Vec<(u8, String, String)>,
    events: Vec<(String, String)>,
}

/// Cloud endpoint recording every channel write and event.
#[derive(Debug, Clone)]
pub struct SimCloud {
    st: Rc<RefCell<CloudState>>,
}

impl Default for SimCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl SimCloud {
    pub fn new() -> Self {
        Self {
            st: Rc::new(RefCell::new(CloudState {
                reachable: true,
                ..CloudState::default()
            })),
        }
    }

    pub fn set_reachable(&self, on: bool) {
        let mut st = self.st.borrow_mut();
        st.reachable = on;
        if !on {
            st.connected = false;
        }
    }

    pub fn attempts(&self) -> u32 {
        self.st.borrow().attempts
    }

    pub fn runs(&self) -> u32 {
        self.st.borrow().runs
    }

    pub fn writes(&self) -> Vec<(u8, String)> {
        self.st.borrow().writes.clone()
    }

    /// Last value written to `channel`, rendered as text.
    pub fn last(&self, channel: u8) -> Option<String> {
        self.st
            .borrow()
            .writes
            .iter()
            .rev()
            .find(|(c, _)| *c == channel)
            .map(|(_, v)| v.clone())
    }

    pub fn properties(&self) -> Vec<(u8, String, String)> {
        self.st.borrow().properties.clone()
    }

    pub fn events(&self) -> Vec<(String, String)> {
        self.st.borrow().events.clone()
    }
}

fn offline() -> BoxError {
    Box::new(HwError::NoDevice("cloud link down".into()))
}

impl CloudLink for SimCloud {
    fn connect(&mut self, _token: &str, _timeout: Duration) -> Result<(), BoxError> {
        let mut st = self.st.borrow_mut();
        st.attempts += 1;
        if !st.reachable {
            return Err("cloud connect timeout".into());
        }
        st.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.st.borrow().connected
    }

    fn run(&mut self) -> Result<(), BoxError> {
        let mut st = self.st.borrow_mut();
        st.runs += 1;
        if !st.reachable {
            st.connected = false;
            return Err(offline());
        }
        Ok(())
    }

    fn virtual_write(&mut self, channel: u8, value: ChannelValue<'_>) -> Result<(), BoxError> {
        let mut st = self.st.borrow_mut();
        if !st.connected {
            return Err(offline());
        }
        let text = match value {
            ChannelValue::Int(i) => i.to_string(),
            ChannelValue::Float(f) => format!("{f:.2}"),
            ChannelValue::Text(s) => s.to_string(),
        };
        st.writes.push((channel, text));
        Ok(())
    }

    fn set_property(&mut self, channel: u8, property: &str, value: &str) -> Result<(), BoxError> {
        let mut st = self.st.borrow_mut();
        if !st.connected {
            return Err(offline());
        }
        st.properties
            .push((channel, property.to_string(), value.to_string()));
        Ok(())
    }

    fn log_event(&mut self, name: &str, description: &str) -> Result<(), BoxError> {
        let mut st = self.st.borrow_mut();
        if !st.connected {
            return Err(offline());
        }
        st.events.push((name.to_string(), description.to_string()));
        Ok(())
    }

    fn disconnect(&mut self) {
        self.st.borrow_mut().connected = false;
    }
}
