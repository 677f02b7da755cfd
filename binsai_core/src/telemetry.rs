//! Cloud telemetry: connection supervision and channel publishing.
use std::collections::VecDeque;
use std::time::Duration;

use binsai_traits::{ChannelValue, CloudLink, WifiLink};
use tracing::{debug, info, warn};

use crate::classify::Classification;
use crate::error::BinsaiError;
use crate::hw_error::map_box;
use crate::schedule::{Periodic, deadline_reached};
use crate::types::SensorSnapshot;

pub const WIFI_TIMEOUT: Duration = Duration::from_secs(20);
pub const CLOUD_TIMEOUT: Duration = Duration::from_secs(10);

pub mod channel {
    pub const FILL: u8 = 0;
    pub const LED_FULL: u8 = 1;
    pub const LED_ALMOST_FULL: u8 = 2;
    pub const LED_HALF: u8 = 3;
    pub const LED_EMPTY: u8 = 4;
    pub const DISTANCE: u8 = 5;
    pub const CAPACITY: u8 = 6;
    pub const PPM: u8 = 10;
    pub const PRIORITY: u8 = 11;
    pub const CLASS: u8 = 12;
    pub const RECOMMENDATION: u8 = 13;
    pub const LAT: u8 = 20;
    pub const LON: u8 = 21;
}

pub const EVENT_SYSTEM_START: &str = "system_start";
pub const EVENT_SMS_SENT: &str = "sms_sent";
pub const EVENT_CRITICAL_ALERT: &str = "critical_alert";

const EVENT_QUEUE_CAP: usize = 16;
const LED_ON: i64 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
}

/// Values last sent upstream; a publish is skipped when nothing changed.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Published {
    fill: i64,
    distance_dm: Option<i64>,
    ppm: i64,
    cls: (u8, u8),
    gps: Option<(i64, i64)>,
}

impl Published {
    #[allow(clippy::cast_possible_truncation)]
    fn of(snap: &SensorSnapshot, cls: &Classification) -> Self {
        Self {
            fill: cls.fill_percent.round() as i64,
            distance_dm: snap.distance_cm.map(|d| (d * 10.0).round() as i64),
            ppm: cls.ppm.round() as i64,
            cls: (cls.capacity.ordinal(), cls.priority),
            gps: snap
                .gps
                .map(|g| ((g.lat * 1e6).round() as i64, (g.lon * 1e6).round() as i64)),
        }
    }
}

pub struct TelemetryPublisher {
    state: LinkState,
    ssid: String,
    pass: String,
    token: String,
    reconnect: Periodic,
    publish_min_ms: u64,
    last: Option<(Published, u64)>,
    events: VecDeque<(String, String)>,
    pub publishes: u32,
    pub failures: u32,
    pub last_error: Option<BinsaiError>,
}

impl TelemetryPublisher {
    pub fn new(ssid: &str, pass: &str, token: &str, reconnect_ms: u64, publish_min_ms: u64) -> Self {
        Self {
            state: LinkState::Disconnected,
            ssid: ssid.to_string(),
            pass: pass.to_string(),
            token: token.to_string(),
            reconnect: Periodic::new(reconnect_ms),
            publish_min_ms,
            last: None,
            events: VecDeque::new(),
            publishes: 0,
            failures: 0,
            last_error: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    fn drop_link(&mut self, err: BinsaiError) {
        if self.state == LinkState::Connected {
            warn!(error = %err, "cloud link lost");
        }
        self.failures += 1;
        self.state = LinkState::Disconnected;
        self.last = None;
        self.last_error = Some(err);
    }

    /// Blocking connect attempt: Wi-Fi (if needed) then cloud.
    /// Every attempt restarts the reconnect period.
    pub fn connect(
        &mut self,
        wifi: &mut dyn WifiLink,
        cloud: &mut dyn CloudLink,
        now_ms: u64,
    ) -> bool {
        self.reconnect.mark(now_ms);
        if !wifi.is_connected() {
            info!(ssid = %self.ssid, "connecting Wi-Fi");
            if let Err(e) = wifi.connect(&self.ssid, &self.pass, WIFI_TIMEOUT) {
                self.drop_link(BinsaiError::CloudDisconnected(format!(
                    "wifi: {}",
                    map_box(&e)
                )));
                return false;
            }
        }
        if let Err(e) = cloud.connect(&self.token, CLOUD_TIMEOUT) {
            self.drop_link(BinsaiError::CloudDisconnected(format!("cloud: {}", map_box(&e))));
            return false;
        }
        info!("cloud connected");
        self.state = LinkState::Connected;
        self.flush_events(cloud);
        true
    }

    /// Tick step 1: service the library, or retry the connection when due.
    /// Reconnects are held back while `hold_reconnect` (an SMS batch) is set.
    pub fn service(
        &mut self,
        wifi: &mut dyn WifiLink,
        cloud: &mut dyn CloudLink,
        now_ms: u64,
        hold_reconnect: bool,
    ) {
        match self.state {
            LinkState::Connected => {
                if !wifi.is_connected() {
                    self.drop_link(BinsaiError::CloudDisconnected("wifi dropped".into()));
                } else if let Err(e) = cloud.run() {
                    self.drop_link(BinsaiError::CloudDisconnected(map_box(&e).to_string()));
                } else if !cloud.is_connected() {
                    self.drop_link(BinsaiError::CloudDisconnected("heartbeat lost".into()));
                }
            }
            LinkState::Disconnected => {
                if hold_reconnect {
                    return;
                }
                if self.reconnect.due(now_ms) {
                    debug!(now_ms, "reconnect attempt");
                    self.connect(wifi, cloud, now_ms);
                }
            }
        }
    }

    /// Tick step 4: write every channel when values changed or the minimum
    /// interval elapsed. A failure only moves the link to Disconnected.
    pub fn publish(
        &mut self,
        cloud: &mut dyn CloudLink,
        snap: &SensorSnapshot,
        cls: &Classification,
        now_ms: u64,
    ) -> bool {
        if self.state != LinkState::Connected {
            return false;
        }
        let current = Published::of(snap, cls);
        if let Some((prev, at)) = self.last
            && prev == current
            && !deadline_reached(now_ms, at, self.publish_min_ms)
        {
            return false;
        }
        match write_channels(cloud, snap, cls) {
            Ok(()) => {
                self.publishes += 1;
                self.last = Some((current, now_ms));
                true
            }
            Err(e) => {
                self.drop_link(BinsaiError::CloudDisconnected(map_box(&e).to_string()));
                false
            }
        }
    }

    /// Log an event now, or queue it until the next successful connect.
    pub fn event(&mut self, cloud: &mut dyn CloudLink, name: &str, description: &str) {
        if self.state == LinkState::Connected {
            match cloud.log_event(name, description) {
                Ok(()) => return,
                Err(e) => self.drop_link(BinsaiError::CloudDisconnected(map_box(&e).to_string())),
            }
        }
        if self.events.len() == EVENT_QUEUE_CAP {
            self.events.pop_front();
        }
        self.events
            .push_back((name.to_string(), description.to_string()));
    }

    pub fn queued_events(&self) -> usize {
        self.events.len()
    }

    fn flush_events(&mut self, cloud: &mut dyn CloudLink) {
        while let Some((name, desc)) = self.events.pop_front() {
            if let Err(e) = cloud.log_event(&name, &desc) {
                self.events.push_front((name, desc));
                self.drop_link(BinsaiError::CloudDisconnected(map_box(&e).to_string()));
                return;
            }
        }
    }
}

fn led(on: bool) -> ChannelValue<'static> {
    ChannelValue::Int(if on { LED_ON } else { 0 })
}

#[allow(clippy::cast_possible_truncation)]
fn write_channels(
    cloud: &mut dyn CloudLink,
    snap: &SensorSnapshot,
    cls: &Classification,
) -> Result<(), binsai_traits::BoxError> {
    let leds = cls.leds();
    cloud.virtual_write(channel::FILL, ChannelValue::Int(cls.fill_percent.round() as i64))?;
    cloud.virtual_write(channel::LED_FULL, led(leds.full))?;
    cloud.virtual_write(channel::LED_ALMOST_FULL, led(leds.almost_full))?;
    cloud.virtual_write(channel::LED_HALF, led(leds.half))?;
    cloud.virtual_write(channel::LED_EMPTY, led(leds.empty))?;
    if let Some(d) = snap.distance_cm {
        cloud.virtual_write(channel::DISTANCE, ChannelValue::Float(f64::from(d)))?;
    }
    cloud.virtual_write(channel::CAPACITY, ChannelValue::Text(cls.capacity.label()))?;
    cloud.set_property(channel::CAPACITY, "color", cls.capacity.color())?;
    cloud.virtual_write(channel::PPM, ChannelValue::Int(cls.ppm.round() as i64))?;
    cloud.virtual_write(channel::PRIORITY, ChannelValue::Int(i64::from(cls.priority)))?;
    cloud.virtual_write(channel::CLASS, ChannelValue::Text(cls.waste_class.label()))?;
    cloud.virtual_write(channel::RECOMMENDATION, ChannelValue::Text(cls.recommendation))?;
    if let Some(g) = snap.gps {
        cloud.virtual_write(channel::LAT, ChannelValue::Float(g.lat))?;
        cloud.virtual_write(channel::LON, ChannelValue::Float(g.lon))?;
    }
    Ok(())
}
