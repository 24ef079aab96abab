//! Scrape-cache-collect coordination.
//!
//! The exporter implements `prometheus::core::Collector`. Every scrape takes
//! one coarse lock across the staleness check, the optional synchronous
//! refresh, and metric emission, so concurrent scrapes serialize: no duplicate
//! refreshes, and no cache view whose device list and state map belong to
//! different refresh cycles. A failed refresh leaves the prior cache and the
//! staleness clock untouched, so the next scrape retries immediately.

use crate::client::{ClientError, Device, DeviceApi, DeviceState};
use chrono::DateTime;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Gauge, GaugeVec, Opts};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{error, warn};

const DEVICE_LABELS: [&str; 3] = ["device_id", "device_name", "model"];

const UP_NAME: &str = "yolink_up";
const UP_HELP: &str = "Whether the YoLink exporter is working (1) or not (0)";

/// Mutable state guarded by the exporter's lock: the client (its auth session
/// included) and the cache snapshot. The device list and state map are only
/// ever replaced together.
struct Cache<C> {
    client: C,
    last_refresh: Option<Instant>,
    devices: Vec<Device>,
    states: HashMap<String, DeviceState>,
}

impl<C: DeviceApi> Cache<C> {
    /// Stale when the last successful refresh is older than the interval, or
    /// when no refresh has succeeded yet.
    fn is_stale(&self, now: Instant, interval: Duration) -> bool {
        match self.last_refresh {
            Some(at) => now.duration_since(at) >= interval,
            None => true,
        }
    }

    /// One refresh cycle: list devices, then fetch each device's state.
    /// All-or-nothing for the list; best-effort per device. A per-device
    /// failure leaves that device absent from this cycle's state map.
    fn refresh(&mut self) -> Result<(), ClientError> {
        let devices = self.client.list_devices()?;

        let mut states = HashMap::with_capacity(devices.len());
        for device in &devices {
            match self.client.device_state(device) {
                Ok(state) => {
                    states.insert(device.device_id.clone(), state);
                }
                Err(err) => warn!(
                    "Failed to get state for device {} ({}): {}",
                    device.name, device.device_id, err
                ),
            }
        }

        self.devices = devices;
        self.states = states;
        Ok(())
    }
}

/// Prometheus collector for YoLink sensor telemetry.
pub struct YoLinkExporter<C: DeviceApi> {
    interval: Duration,
    descs: Vec<Desc>,
    cache: Mutex<Cache<C>>,
}

impl<C: DeviceApi> YoLinkExporter<C> {
    pub fn new(client: C, interval: Duration) -> Self {
        let device_desc = |name: &str, help: &str| {
            Desc::new(
                name.to_string(),
                help.to_string(),
                DEVICE_LABELS.iter().map(|l| l.to_string()).collect(),
                HashMap::new(),
            )
            .unwrap()
        };

        let descs = vec![
            Desc::new(
                UP_NAME.to_string(),
                UP_HELP.to_string(),
                Vec::new(),
                HashMap::new(),
            )
            .unwrap(),
            device_desc("yolink_temperature_celsius", "Temperature in Celsius"),
            device_desc("yolink_humidity_percent", "Humidity percentage"),
            device_desc("yolink_battery_level", "Battery level (1-4)"),
            device_desc(
                "yolink_device_online",
                "Device online status (1=online, 0=offline)",
            ),
            device_desc(
                "yolink_last_updated_timestamp",
                "Unix timestamp of when the device last reported data",
            ),
        ];

        Self {
            interval,
            descs,
            cache: Mutex::new(Cache {
                client,
                last_refresh: None,
                devices: Vec::new(),
                states: HashMap::new(),
            }),
        }
    }
}

impl<C: DeviceApi> Collector for YoLinkExporter<C> {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        // Held across check, refresh, and emission. A poisoned lock only
        // means a previous scrape panicked mid-cycle; the cache itself is
        // replaced wholesale, so recover and continue.
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let up = Gauge::new(UP_NAME, UP_HELP).unwrap();

        let now = Instant::now();
        if cache.is_stale(now, self.interval) {
            if let Err(err) = cache.refresh() {
                error!("Failed to refresh device data: {}", err);
                up.set(0.0);
                // Prior cache preserved; staleness clock not reset.
                return up.collect();
            }
            cache.last_refresh = Some(now);
        }

        up.set(1.0);

        let device_gauge = |name: &str, help: &str| {
            GaugeVec::new(Opts::new(name, help), &DEVICE_LABELS).unwrap()
        };
        let temperature = device_gauge("yolink_temperature_celsius", "Temperature in Celsius");
        let humidity = device_gauge("yolink_humidity_percent", "Humidity percentage");
        let battery = device_gauge("yolink_battery_level", "Battery level (1-4)");
        let online = device_gauge(
            "yolink_device_online",
            "Device online status (1=online, 0=offline)",
        );
        let last_updated = device_gauge(
            "yolink_last_updated_timestamp",
            "Unix timestamp of when the device last reported data",
        );

        for device in &cache.devices {
            // Absent state means the fetch failed this cycle; emit nothing.
            let state = match cache.states.get(&device.device_id) {
                Some(state) => state,
                None => continue,
            };

            let labels = [
                device.device_id.as_str(),
                device.name.as_str(),
                device.model_name.as_str(),
            ];

            online
                .with_label_values(&labels)
                .set(if state.online { 1.0 } else { 0.0 });

            match DateTime::parse_from_rfc3339(&state.report_at) {
                Ok(report_at) => {
                    last_updated
                        .with_label_values(&labels)
                        .set(report_at.timestamp() as f64);
                }
                Err(err) => warn!(
                    "Failed to parse reportAt time for device {}: {}",
                    device.device_id, err
                ),
            }

            // An offline sensor's last-known readings are not current data.
            if state.online {
                temperature.with_label_values(&labels).set(state.temperature);
                humidity.with_label_values(&labels).set(state.humidity);
                battery.with_label_values(&labels).set(state.battery as f64);
            }
        }

        let mut families = up.collect();
        for vec in [online, last_updated, temperature, humidity, battery] {
            families.extend(
                vec.collect()
                    .into_iter()
                    .filter(|mf| !mf.get_metric().is_empty()),
            );
        }
        families
    }
}
