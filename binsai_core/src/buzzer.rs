//! Non-blocking buzzer patterns driven from the tick loop.
use binsai_traits::OutputPin;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeepPattern {
    /// One 100 ms chirp.
    Chirp,
    /// Three 200 ms beeps, 200 ms apart.
    Alert,
}

impl BeepPattern {
    const fn steps(self) -> (u8, u64) {
        match self {
            Self::Chirp => (1, 100),
            Self::Alert => (3, 200),
        }
    }
}

#[derive(Debug, Default)]
pub struct Beeper {
    /// Remaining on/off edges; odd while the buzzer is sounding.
    edges_left: u8,
    step_ms: u64,
    next_ms: u64,
    on: bool,
    pub errors: u32,
}

impl Beeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.edges_left > 0
    }

    /// Start `pattern`, replacing whatever was playing.
    pub fn start(&mut self, pattern: BeepPattern, now_ms: u64) {
        let (beeps, step_ms) = pattern.steps();
        self.edges_left = beeps * 2;
        self.step_ms = step_ms;
        self.next_ms = now_ms;
        self.on = false;
        debug!(?pattern, "beep");
    }

    pub fn tick(&mut self, pin: &mut dyn OutputPin, now_ms: u64) {
        if self.edges_left == 0 || now_ms < self.next_ms {
            return;
        }
        self.on = !self.on;
        let res = if self.on { pin.set_high() } else { pin.set_low() };
        if res.is_err() {
            self.errors += 1;
        }
        self.edges_left -= 1;
        self.next_ms = now_ms + self.step_ms;
        if self.edges_left == 0 && self.on {
            self.on = false;
            let _ = pin.set_low();
        }
    }

    /// Force the output low (shutdown).
    pub fn silence(&mut self, pin: &mut dyn OutputPin) {
        self.edges_left = 0;
        self.on = false;
        let _ = pin.set_low();
    }
}
