//! Termux:API adapters (`termux-location`, `termux-sensor`).
//!
//! Both tools print JSON. `termux-location -r once` prints one object; `termux-sensor` streams
//! pretty-printed objects keyed by sensor name:
//!
//! ```text
//! {
//!   "LSM6DSO Linear Acceleration": {
//!     "values": [ 0.012, -0.034, 0.101 ]
//!   }
//! }
//! ```

use std::env;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{sleep, timeout};

use crate::error::SensorError;
use crate::sensors::{LocationOptions, LocationReading, LocationSource, MotionSource};
use crate::types::{AccelSample, LocationFix};

/// Returns true if `program` resolves to a file on `PATH`.
pub fn on_path(program: &str) -> bool {
    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir| Path::new(&dir).join(program).is_file()))
        .unwrap_or(false)
}

// ─── Location ───

#[derive(Debug, Deserialize)]
struct TermuxFix {
    latitude: Option<f64>,
    longitude: Option<f64>,
    accuracy: Option<f64>,
    #[serde(rename = "API_ERROR")]
    api_error: Option<String>,
}

/// Parses one `termux-location` response.
pub fn parse_location(output: &str, now_ms: i64) -> LocationReading {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(SensorError::PositionUnavailable("no output from termux-location".to_string()));
    }
    let raw: TermuxFix = serde_json::from_str(trimmed)
        .map_err(|e| SensorError::PositionUnavailable(format!("unreadable response: {e}")))?;

    if let Some(message) = raw.api_error {
        return Err(if message.to_lowercase().contains("permission") {
            SensorError::PermissionDenied
        } else {
            SensorError::PositionUnavailable(message)
        });
    }

    match (raw.latitude, raw.longitude) {
        (Some(latitude), Some(longitude)) => Ok(LocationFix {
            latitude,
            longitude,
            accuracy: raw.accuracy.unwrap_or(f64::INFINITY),
            timestamp_ms: now_ms,
        }),
        _ => Err(SensorError::PositionUnavailable("response has no coordinates".to_string())),
    }
}

#[derive(Clone, Debug)]
pub struct TermuxLocation {
    /// Executable to run, resolved on `PATH` unless absolute.
    pub program: String,
    /// Pause between requests while watching.
    pub watch_interval: Duration,
}

impl Default for TermuxLocation {
    fn default() -> Self {
        Self {
            program: "termux-location".to_string(),
            watch_interval: Duration::from_secs(1),
        }
    }
}

async fn request_once(program: String, options: LocationOptions) -> LocationReading {
    let provider = if options.high_accuracy { "gps" } else { "network" };
    // maximum_age > 0 lets the provider answer from its last known fix
    let request = if options.maximum_age.is_zero() { "once" } else { "last" };

    let output = Command::new(&program)
        .args(["-p", provider, "-r", request])
        .kill_on_drop(true)
        .output();

    match timeout(options.timeout, output).await {
        Err(_) => Err(SensorError::Timeout),
        Ok(Err(e)) => Err(SensorError::Unavailable(format!("{program}: {e}"))),
        Ok(Ok(out)) => parse_location(&String::from_utf8_lossy(&out.stdout), Utc::now().timestamp_millis()),
    }
}

impl LocationSource for TermuxLocation {
    fn watch(&self, options: &LocationOptions) -> mpsc::Receiver<LocationReading> {
        let (tx, rx) = mpsc::channel(4);
        let options = *options;
        let pause = self.watch_interval;
        let program = self.program.clone();
        tokio::spawn(async move {
            // Dropping the request future kills the child (kill_on_drop)
            loop {
                let reading = tokio::select! {
                    _ = tx.closed() => break,
                    reading = request_once(program.clone(), options) => reading,
                };
                if tx.send(reading).await.is_err() {
                    break;
                }
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = sleep(pause) => {}
                }
            }
            debug!("[termux-location] Watch released");
        });
        rx
    }

    fn current_position(&self, options: &LocationOptions) -> BoxFuture<'static, LocationReading> {
        request_once(self.program.clone(), *options).boxed()
    }
}

// ─── Motion ───

/// Extracts the first three `values` of the first sensor in a `termux-sensor` event.
pub fn parse_sensor_event(event: &str) -> Option<AccelSample> {
    let value: Value = serde_json::from_str(event).ok()?;
    let values = value.as_object()?.values().next()?.get("values")?.as_array()?;
    let axis = |i: usize| values.get(i).and_then(Value::as_f64);
    Some(AccelSample {
        x: axis(0),
        y: axis(1),
        z: axis(2),
    })
}

/// Reassembles pretty-printed JSON objects from a line stream by tracking brace depth.
#[derive(Debug, Default)]
pub struct EventAssembler {
    buffer: String,
    depth: i32,
}

impl EventAssembler {
    /// Feeds one line; returns a complete object when its closing brace arrives.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        for c in line.chars() {
            match c {
                '{' => self.depth += 1,
                '}' => self.depth -= 1,
                _ => {}
            }
        }
        if self.depth <= 0 && self.buffer.is_empty() && !line.contains('}') {
            self.depth = 0;
            return None;
        }
        self.buffer.push_str(line);
        self.buffer.push('\n');
        if self.depth <= 0 {
            self.depth = 0;
            return Some(std::mem::take(&mut self.buffer));
        }
        None
    }
}

#[derive(Clone, Debug)]
pub struct TermuxMotion {
    /// Sensor name filter passed to `termux-sensor -s`.
    pub sensor: String,
    pub delay_ms: u64,
}

impl Default for TermuxMotion {
    fn default() -> Self {
        Self {
            sensor: "linear_acceleration".to_string(),
            delay_ms: 20,
        }
    }
}

impl MotionSource for TermuxMotion {
    fn subscribe(&self) -> Option<mpsc::Receiver<AccelSample>> {
        if !on_path("termux-sensor") {
            return None;
        }
        let mut child = Command::new("termux-sensor")
            .arg("-s")
            .arg(&self.sensor)
            .arg("-d")
            .arg(self.delay_ms.to_string())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| warn!("[termux-sensor] Failed to start: {}", e))
            .ok()?;
        let stdout = child.stdout.take()?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            // Owned here so the process is killed when the task ends
            let _child = child;
            let mut lines = BufReader::new(stdout).lines();
            let mut assembler = EventAssembler::default();
            let mut sample_count = 0u64;
            while let Ok(Some(line)) = lines.next_line().await {
                let Some(event) = assembler.push_line(&line) else {
                    continue;
                };
                let Some(sample) = parse_sensor_event(&event) else {
                    continue;
                };
                match tx.try_send(sample) {
                    Ok(()) => sample_count += 1,
                    Err(TrySendError::Closed(_)) => break,
                    Err(TrySendError::Full(_)) => {
                        // Channel full, drop this sample
                    }
                }
            }
            debug!("[termux-sensor] Stream ended after {} samples", sample_count);
        });
        Some(rx)
    }
}
