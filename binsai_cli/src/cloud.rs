//! Cloud link that writes every telemetry operation as one JSON line.
//!
//! Stands in for the vendor telemetry library: the host run pipes stdout to
//! whatever forwards the data.

use binsai_core::Ticker;
use binsai_traits::{BoxError, ChannelValue, CloudLink};
use serde_json::{Value, json};
use std::io::Write;
use std::time::Duration;

pub struct JsonlCloud {
    out: Box<dyn Write>,
    ticker: Ticker,
    reachable: bool,
    connected: bool,
}

impl JsonlCloud {
    pub fn new(out: Box<dyn Write>, ticker: Ticker, reachable: bool) -> Self {
        Self {
            out,
            ticker,
            reachable,
            connected: false,
        }
    }

    fn emit(&mut self, mut obj: Value) -> Result<(), BoxError> {
        if !self.connected {
            return Err("cloud session not connected".into());
        }
        obj["t_ms"] = json!(self.ticker.now_ms());
        writeln!(self.out, "{obj}")?;
        self.out.flush()?;
        Ok(())
    }
}

fn channel_json(value: ChannelValue<'_>) -> Value {
    match value {
        ChannelValue::Int(v) => json!(v),
        ChannelValue::Float(v) => json!(v),
        ChannelValue::Text(s) => json!(s),
    }
}

impl CloudLink for JsonlCloud {
    fn connect(&mut self, _token: &str, _timeout: Duration) -> Result<(), BoxError> {
        if !self.reachable {
            return Err("cloud endpoint unreachable".into());
        }
        self.connected = true;
        self.emit(json!({ "kind": "connect" }))
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn run(&mut self) -> Result<(), BoxError> {
        if self.connected {
            Ok(())
        } else {
            Err("cloud session not connected".into())
        }
    }

    fn virtual_write(&mut self, channel: u8, value: ChannelValue<'_>) -> Result<(), BoxError> {
        self.emit(json!({ "kind": "write", "channel": channel, "value": channel_json(value) }))
    }

    fn set_property(&mut self, channel: u8, property: &str, value: &str) -> Result<(), BoxError> {
        self.emit(json!({
            "kind": "property",
            "channel": channel,
            "property": property,
            "value": value,
        }))
    }

    fn log_event(&mut self, name: &str, description: &str) -> Result<(), BoxError> {
        self.emit(json!({ "kind": "event", "name": name, "description": description }))
    }

    fn disconnect(&mut self) {
        if self.connected {
            let _ = self.emit(json!({ "kind": "disconnect" }));
        }
        self.connected = false;
    }
}
