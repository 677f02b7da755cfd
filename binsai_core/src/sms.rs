//! Non-blocking SMS batch dialog over the GSM UART.
//!
//! Every wait is a stored deadline checked on `tick`; the dialog never sleeps.
//! One batch walks the recipient list in order. Per-recipient failures are
//! counted and the batch continues.
use core::fmt::Write as _;

use binsai_traits::SerialPort;
use tracing::{debug, info, warn};

use crate::classify::Classification;
use crate::error::BinsaiError;
use crate::hw_error::map_box;
use crate::types::GeoFix;

pub const MESSAGE_CAP: usize = 320;
pub type Message = heapless::String<MESSAGE_CAP>;

pub const PROMPT_TIMEOUT_MS: u64 = 5_000;
pub const CONFIRM_TIMEOUT_MS: u64 = 10_000;
pub const INTER_RECIPIENT_MS: u64 = 2_000;
pub const BATCH_TIMEOUT_MS: u64 = 30_000;

const CTRL_Z: u8 = 0x1A;
const ESC: u8 = 0x1B;
const LINE_CAP: usize = 96;
/// Transitions that need no waiting are chained within one tick, up to this many.
const MAX_STEPS_PER_TICK: usize = 8;

/// Build the alert text. Lines that would overflow the buffer are dropped.
pub fn compose_message(device_id: &str, cls: &Classification, gps: Option<GeoFix>) -> Message {
    let mut msg = Message::new();
    let id: String = device_id.chars().filter(|c| !c.is_control()).collect();
    let mut line = |args: core::fmt::Arguments<'_>| {
        let mut tmp: heapless::String<MESSAGE_CAP> = heapless::String::new();
        if tmp.write_fmt(args).is_ok() && msg.len() + tmp.len() <= MESSAGE_CAP {
            let _ = msg.push_str(&tmp);
        }
    };
    line(format_args!("[BINSAI ALERT] Device: {id}\n"));
    line(format_args!(
        "Capacity: {:.0}% | Gas: {:.0} ppm\n",
        cls.fill_percent, cls.ppm
    ));
    line(format_args!(
        "Priority: {} | Type: {}\n",
        cls.priority,
        cls.waste_class.label()
    ));
    if let Some(fix) = gps {
        line(format_args!(
            "Location: https://maps.google.com/?q={:.6},{:.6}\n",
            fix.lat, fix.lon
        ));
    }
    line(format_args!("Action: {}", cls.recommendation));
    msg
}

/// Rejects empty and placeholder numbers before any modem traffic.
pub fn is_dialable(number: &str) -> bool {
    let digits = number.strip_prefix('+').unwrap_or(number);
    !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && digits.len() >= 6
        && digits.bytes().any(|b| b != b'0')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    Idle,
    OpenRecipient { ix: usize },
    AwaitPrompt { ix: usize, deadline_ms: u64 },
    SendBody { ix: usize },
    AwaitConfirm { ix: usize, deadline_ms: u64, seen_cmgs: bool },
    InterRecipientDelay { next: usize, until_ms: u64 },
    BatchDone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub sent: usize,
    pub failed: usize,
    pub total: usize,
    pub timed_out: bool,
    pub last_failure: Option<BinsaiError>,
}

impl BatchReport {
    pub fn all_sent(&self) -> bool {
        self.failed == 0 && self.sent == self.total
    }
}

enum Step {
    Continue,
    Wait,
}

#[derive(Debug)]
pub struct SmsDialog {
    numbers: Vec<String>,
    state: DialogState,
    message: Message,
    sent: usize,
    failed: usize,
    batch_deadline_ms: u64,
    timed_out: bool,
    last_failure: Option<BinsaiError>,
    line: heapless::Vec<u8, LINE_CAP>,
}

impl SmsDialog {
    pub fn new(numbers: Vec<String>) -> Self {
        Self {
            numbers,
            state: DialogState::Idle,
            message: Message::new(),
            sent: 0,
            failed: 0,
            batch_deadline_ms: 0,
            timed_out: false,
            last_failure: None,
            line: heapless::Vec::new(),
        }
    }

    pub fn state(&self) -> DialogState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == DialogState::Idle
    }

    pub fn recipients(&self) -> usize {
        self.numbers.len()
    }

    /// (recipient being handled, total) while a batch is in flight.
    pub fn progress(&self) -> Option<(usize, usize)> {
        let ix = match self.state {
            DialogState::Idle => return None,
            DialogState::OpenRecipient { ix }
            | DialogState::AwaitPrompt { ix, .. }
            | DialogState::SendBody { ix }
            | DialogState::AwaitConfirm { ix, .. } => ix,
            DialogState::InterRecipientDelay { next, .. } => next,
            DialogState::BatchDone => self.numbers.len(),
        };
        Some((ix.min(self.numbers.len()), self.numbers.len()))
    }

    /// Start a batch. Refused while another batch is in flight.
    pub fn request(&mut self, message: Message, now_ms: u64) -> Result<(), BinsaiError> {
        if !self.is_idle() {
            return Err(BinsaiError::ModemNoResponse("sms dialog busy".into()));
        }
        self.message = message;
        self.sent = 0;
        self.failed = 0;
        self.timed_out = false;
        self.last_failure = None;
        self.batch_deadline_ms = now_ms.saturating_add(BATCH_TIMEOUT_MS);
        self.state = DialogState::OpenRecipient { ix: 0 };
        info!(recipients = self.numbers.len(), "sms batch started");
        Ok(())
    }

    /// Advance the dialog. Returns the report on the tick the batch completes.
    pub fn tick(&mut self, now_ms: u64, port: &mut dyn SerialPort) -> Option<BatchReport> {
        if self.is_idle() {
            return None;
        }
        for _ in 0..MAX_STEPS_PER_TICK {
            if self.state == DialogState::BatchDone {
                return Some(self.finish());
            }
            if now_ms >= self.batch_deadline_ms {
                self.abort_batch(port);
                continue;
            }
            match self.step(now_ms, port) {
                Step::Continue => {}
                Step::Wait => return None,
            }
        }
        None
    }

    fn step(&mut self, now_ms: u64, port: &mut dyn SerialPort) -> Step {
        match self.state {
            DialogState::Idle | DialogState::BatchDone => Step::Wait,
            DialogState::OpenRecipient { ix } => {
                let Some(number) = self.numbers.get(ix) else {
                    self.state = DialogState::BatchDone;
                    return Step::Continue;
                };
                if !is_dialable(number) {
                    warn!(ix, "skipping placeholder or invalid phone number");
                    self.fail(ix, "invalid number".into(), now_ms);
                    return Step::Continue;
                }
                self.line.clear();
                drain(port);
                let cmd = format!("AT+CMGS=\"{number}\"\r");
                match port.write(cmd.as_bytes()) {
                    Ok(()) => {
                        self.state = DialogState::AwaitPrompt {
                            ix,
                            deadline_ms: now_ms + PROMPT_TIMEOUT_MS,
                        };
                    }
                    Err(e) => self.fail(ix, map_box(&e).to_string(), now_ms),
                }
                Step::Continue
            }
            DialogState::AwaitPrompt { ix, deadline_ms } => {
                let mut got_prompt = false;
                let mut got_error = false;
                self.pump(port, |b, line| {
                    if b == Some(b'>') {
                        got_prompt = true;
                    }
                    if line.is_some_and(|l| l.contains("ERROR")) {
                        got_error = true;
                    }
                });
                if got_error {
                    self.fail(ix, "modem rejected recipient".into(), now_ms);
                    Step::Continue
                } else if got_prompt {
                    self.state = DialogState::SendBody { ix };
                    Step::Continue
                } else if now_ms >= deadline_ms {
                    cancel_input(port);
                    self.fail(ix, "no '>' prompt within 5 s".into(), now_ms);
                    Step::Continue
                } else {
                    Step::Wait
                }
            }
            DialogState::SendBody { ix } => {
                let res = port
                    .write(self.message.as_bytes())
                    .and_then(|()| port.write(&[CTRL_Z]));
                match res {
                    Ok(()) => {
                        self.line.clear();
                        self.state = DialogState::AwaitConfirm {
                            ix,
                            deadline_ms: now_ms + CONFIRM_TIMEOUT_MS,
                            seen_cmgs: false,
                        };
                    }
                    Err(e) => self.fail(ix, map_box(&e).to_string(), now_ms),
                }
                Step::Continue
            }
            DialogState::AwaitConfirm {
                ix,
                deadline_ms,
                mut seen_cmgs,
            } => {
                let mut confirmed = false;
                let mut got_error = false;
                self.pump(port, |_, line| match line {
                    Some(l) if l.starts_with("+CMGS") => seen_cmgs = true,
                    Some("OK") if seen_cmgs => confirmed = true,
                    Some(l) if l.contains("ERROR") => got_error = true,
                    _ => {}
                });
                if confirmed {
                    self.sent += 1;
                    debug!(ix, "sms confirmed");
                    self.advance(ix, now_ms);
                    Step::Continue
                } else if got_error {
                    self.fail(ix, "modem reported send error".into(), now_ms);
                    Step::Continue
                } else if now_ms >= deadline_ms {
                    self.fail(ix, "no confirmation within 10 s".into(), now_ms);
                    Step::Continue
                } else {
                    self.state = DialogState::AwaitConfirm {
                        ix,
                        deadline_ms,
                        seen_cmgs,
                    };
                    Step::Wait
                }
            }
            DialogState::InterRecipientDelay { next, until_ms } => {
                if now_ms >= until_ms {
                    self.state = DialogState::OpenRecipient { ix: next };
                    Step::Continue
                } else {
                    Step::Wait
                }
            }
        }
    }

    /// Read every buffered byte, reporting single bytes and completed lines.
    fn pump(&mut self, port: &mut dyn SerialPort, mut on: impl FnMut(Option<u8>, Option<&str>)) {
        let mut buf = [0u8; 64];
        loop {
            let n = match port.read_available(&mut buf) {
                Ok(0) => return,
                Ok(n) => n,
                Err(e) => {
                    debug!(error = %e, "gsm uart read failed");
                    return;
                }
            };
            for &b in &buf[..n] {
                on(Some(b), None);
                if b == b'\n' || b == b'\r' {
                    if !self.line.is_empty() {
                        let text = String::from_utf8_lossy(&self.line).trim().to_string();
                        self.line.clear();
                        on(None, Some(text.as_str()));
                    }
                } else if self.line.push(b).is_err() {
                    self.line.clear();
                }
            }
        }
    }

    fn fail(&mut self, ix: usize, reason: String, now_ms: u64) {
        warn!(ix, %reason, "sms recipient failed");
        self.failed += 1;
        self.last_failure = Some(BinsaiError::ModemSendFailed { index: ix, reason });
        self.advance(ix, now_ms);
    }

    fn advance(&mut self, ix: usize, now_ms: u64) {
        self.state = if ix + 1 < self.numbers.len() {
            DialogState::InterRecipientDelay {
                next: ix + 1,
                until_ms: now_ms + INTER_RECIPIENT_MS,
            }
        } else {
            DialogState::BatchDone
        };
    }

    fn abort_batch(&mut self, port: &mut dyn SerialPort) {
        if matches!(
            self.state,
            DialogState::AwaitPrompt { .. } | DialogState::AwaitConfirm { .. }
        ) {
            cancel_input(port);
        }
        let remaining = self.numbers.len().saturating_sub(self.sent + self.failed);
        warn!(remaining, "sms batch deadline exceeded");
        self.failed += remaining;
        self.timed_out = true;
        self.state = DialogState::BatchDone;
    }

    fn finish(&mut self) -> BatchReport {
        self.state = DialogState::Idle;
        let report = BatchReport {
            sent: self.sent,
            failed: self.failed,
            total: self.numbers.len(),
            timed_out: self.timed_out,
            last_failure: self.last_failure.take(),
        };
        info!(sent = report.sent, failed = report.failed, "sms batch finished");
        report
    }
}

/// Abort a pending text-mode input on the modem.
fn cancel_input(port: &mut dyn SerialPort) {
    if let Err(e) = port.write(&[ESC]) {
        debug!(error = %e, "gsm uart write failed");
    }
}

fn drain(port: &mut dyn SerialPort) {
    let mut buf = [0u8; 64];
    while matches!(port.read_available(&mut buf), Ok(n) if n > 0) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;

    #[test]
    fn placeholder_numbers_rejected() {
        for bad in ["", "+", "+000000000", "12345", "+62 812", "0812-345", "+62+812345"] {
            assert!(!is_dialable(bad), "{bad:?}");
        }
        for good in ["+6281234567890", "081234567", "123456"] {
            assert!(is_dialable(good), "{good:?}");
        }
    }

    #[test]
    fn message_layout_with_and_without_location() {
        let cls = classify(95.0, 900.0);
        let plain = compose_message("BINSAI-A1B2C3", &cls, None);
        assert_eq!(
            plain.as_str(),
            "[BINSAI ALERT] Device: BINSAI-A1B2C3\n\
             Capacity: 95% | Gas: 900 ppm\n\
             Priority: 3 | Type: ORGANIC L2\n\
             Action: Collect immediately; decomposition risk"
        );
        let fix = GeoFix {
            lat: -6.2,
            lon: 106.816_666,
            sats: 7,
            hdop: 1.1,
            fix_age_ms: 0,
        };
        let located = compose_message("BINSAI-A1B2C3", &cls, Some(fix));
        assert!(located.contains("Location: https://maps.google.com/?q=-6.200000,106.816666\n"));
        assert!(located.len() <= MESSAGE_CAP);
    }

    #[test]
    fn oversized_device_id_keeps_message_bounded() {
        let cls = classify(95.0, 900.0);
        let id = "X".repeat(400);
        let msg = compose_message(&id, &cls, None);
        assert!(msg.len() <= MESSAGE_CAP);
        assert!(msg.starts_with("Capacity:"));
    }

    struct Deaf(Vec<u8>);
    impl SerialPort for Deaf {
        fn write(&mut self, b: &[u8]) -> Result<(), binsai_traits::BoxError> {
            self.0.extend_from_slice(b);
            Ok(())
        }
        fn read_available(&mut self, _b: &mut [u8]) -> Result<usize, binsai_traits::BoxError> {
            Ok(0)
        }
    }

    #[test]
    fn busy_dialog_refuses_second_request() {
        let mut d = SmsDialog::new(vec!["+6281234567".into()]);
        d.request(Message::new(), 0).unwrap();
        assert!(d.request(Message::new(), 0).is_err());
    }

    #[test]
    fn silent_modem_times_out_prompt() {
        let mut d = SmsDialog::new(vec!["+6281234567".into()]);
        let mut port = Deaf(Vec::new());
        d.request(Message::new(), 0).unwrap();
        assert!(d.tick(0, &mut port).is_none());
        assert!(matches!(d.state(), DialogState::AwaitPrompt { ix: 0, .. }));
        assert!(d.tick(4_999, &mut port).is_none());
        let report = d.tick(5_000, &mut port).unwrap();
        assert_eq!((report.sent, report.failed), (0, 1));
        assert!(d.is_idle());
        assert_eq!(port.0.last(), Some(&ESC));
    }

    // Accepts commands but refuses the cancel byte.
    struct NoEscape;
    impl SerialPort for NoEscape {
        fn write(&mut self, b: &[u8]) -> Result<(), binsai_traits::BoxError> {
            if b == [ESC] {
                return Err("uart tx stalled".into());
            }
            Ok(())
        }
        fn read_available(&mut self, _b: &mut [u8]) -> Result<usize, binsai_traits::BoxError> {
            Ok(0)
        }
    }

    #[test]
    fn failed_cancel_still_finishes_batch() {
        let mut d = SmsDialog::new(vec!["+6281234567".into()]);
        let mut port = NoEscape;
        d.request(Message::new(), 0).unwrap();
        assert!(d.tick(0, &mut port).is_none());
        let report = d.tick(5_000, &mut port).unwrap();
        assert_eq!((report.sent, report.failed), (0, 1));
        assert!(d.is_idle());
    }
}
