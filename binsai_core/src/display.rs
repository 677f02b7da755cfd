//! Rotating status screens on the character display.
use binsai_traits::CharDisplay;
use tracing::{debug, warn};

use crate::classify::Classification;
use crate::health::Health;
use crate::schedule::Periodic;
use crate::types::SensorSnapshot;
use crate::util::{truncate_chars, yn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Capacity,
    Gas,
    System,
    Device,
}

impl Screen {
    pub const ROTATION: [Self; 4] = [Self::Capacity, Self::Gas, Self::System, Self::Device];
}

/// Everything a screen may show, borrowed from the supervisor for one frame.
pub struct DisplayView<'a> {
    pub snapshot: &'a SensorSnapshot,
    pub classification: &'a Classification,
    pub health: &'a Health,
    pub device_id: &'a str,
    /// (recipient, total) while an SMS batch is in flight.
    pub sms_progress: Option<(usize, usize)>,
}

pub type Frame = [String; 2];

#[derive(Debug, Clone)]
struct Notice {
    frame: Frame,
    until_ms: u64,
}

pub fn render(screen: Screen, v: &DisplayView<'_>) -> Frame {
    let c = v.classification;
    let h = v.health;
    match screen {
        Screen::Capacity => [
            format!("Fill: {:.0}%", c.fill_percent),
            match v.snapshot.distance_cm {
                Some(d) => format!("{} {d:.0}cm", c.capacity.label()),
                None => format!("{} --cm", c.capacity.label()),
            },
        ],
        Screen::Gas => [format!("Gas: {:.0} ppm", c.ppm), c.waste_class.label().to_string()],
        Screen::System => [
            format!("WiFi:{} Cloud:{}", yn(h.wifi_ok), yn(h.cloud_ok)),
            format!("GSM:{} GPS:{} MQ:{}", yn(h.gsm_ok), yn(h.gps_ok), yn(h.mq_calibrated)),
        ],
        Screen::Device => [v.device_id.to_string(), format!("Priority: {}", c.priority)],
    }
}

pub struct DisplayRotator {
    rotate: Periodic,
    screen_ix: usize,
    notice: Option<Notice>,
    shown: Option<Frame>,
    pub redraws: u32,
    pub errors: u32,
}

impl DisplayRotator {
    pub fn new(rotate_ms: u64) -> Self {
        Self {
            rotate: Periodic::new(rotate_ms),
            screen_ix: 0,
            notice: None,
            shown: None,
            redraws: 0,
            errors: 0,
        }
    }

    pub fn screen(&self) -> Screen {
        Screen::ROTATION[self.screen_ix]
    }

    /// Show `frame` over everything else for `duration_ms`.
    pub fn notify(&mut self, line1: &str, line2: &str, now_ms: u64, duration_ms: u64) {
        debug!(line1, line2, "display notification");
        self.notice = Some(Notice {
            frame: [line1.to_string(), line2.to_string()],
            until_ms: now_ms + duration_ms,
        });
    }

    pub fn has_notice(&self, now_ms: u64) -> bool {
        self.notice.as_ref().is_some_and(|n| now_ms < n.until_ms)
    }

    /// The frame that should be visible now. Advances the rotation when due.
    pub fn frame(&mut self, v: &DisplayView<'_>, now_ms: u64) -> Frame {
        if let Some(n) = &self.notice {
            if now_ms < n.until_ms {
                return n.frame.clone();
            }
            self.notice = None;
        }
        if let Some((ix, total)) = v.sms_progress {
            return [
                "SMS in progress".to_string(),
                format!("Recipient {}/{}", (ix + 1).min(total), total),
            ];
        }
        if self.rotate.last_ms().is_some() && self.rotate.due(now_ms) {
            self.screen_ix = (self.screen_ix + 1) % Screen::ROTATION.len();
        }
        self.rotate.poll(now_ms);
        render(self.screen(), v)
    }

    /// Draw the current frame when it differs from what is on the glass.
    pub fn update(&mut self, disp: Option<&mut dyn CharDisplay>, v: &DisplayView<'_>, now_ms: u64) {
        let frame = self.frame(v, now_ms);
        if let Some(d) = disp {
            self.draw(d, frame);
        }
    }

    /// Draw an arbitrary frame (boot splash, calibration progress).
    pub fn draw(&mut self, disp: &mut dyn CharDisplay, frame: Frame) {
        let cols = disp.columns();
        let frame = frame.map(|row| truncate_chars(&row, cols).to_string());
        if self.shown.as_ref() == Some(&frame) {
            return;
        }
        let res = frame
            .iter()
            .enumerate()
            .take(disp.rows())
            .try_for_each(|(row, text)| disp.write_row(row, text));
        match res {
            Ok(()) => {
                self.redraws += 1;
                self.shown = Some(frame);
            }
            Err(e) => {
                self.errors += 1;
                self.shown = None;
                warn!(error = %e, "display write failed");
            }
        }
    }
}
