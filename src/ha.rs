//! ==============================================================================
//! ha.rs - home assistant push client
//! ==============================================================================
//!
//! purpose:
//!     forwards each poll cycle's snapshot to the Home Assistant REST API,
//!     one state update per sensor. push is best-effort: the local cache and
//!     HTTP API stay authoritative whether or not the hub is reachable.
//!
//! concurrency contract:
//!     at most one push runs at a time per client. the exclusion is an
//!     atomic busy flag (compare-and-swap acquire, unconditional release),
//!     not a lock: a second caller skips immediately instead of queueing,
//!     so slow pushes against a flaky hub never pile up behind each other.
//!
//! failure policy:
//!     failures are counted per sensor across batches; the first failure of
//!     a streak and every 10th after that are logged, everything in between
//!     is silent. the streak resets (with a recovery log) as soon as a batch
//!     contains one success. failures never stop future polls or pushes.
//!
//! relationships:
//!     - used by: main.rs (spawned fire-and-forget after each refresh)
//!     - reads: domain.rs (immutable snapshot passed by the poll loop)
//!
//! ==============================================================================

use crate::domain::Reading;

use anyhow::Result;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

/// per-request timeout against the hub
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// ==============================================================================
// sensor metadata
// ==============================================================================

/// Home Assistant identity and display metadata for one logical sensor.
/// sensors missing from the table are served locally but never pushed.
#[derive(Debug)]
pub struct SensorMeta {
    pub entity_id: &'static str,
    pub friendly_name: &'static str,
    pub unit: &'static str,
    pub device_class: &'static str,
}

const SENSOR_META: &[(&str, SensorMeta)] = &[
    (
        "hot_water_middle",
        SensorMeta {
            entity_id: "sensor.warmwasser_mitte",
            friendly_name: "Warmwasser Mitte",
            unit: "°C",
            device_class: "temperature",
        },
    ),
    (
        "heating_supply",
        SensorMeta {
            entity_id: "sensor.heizung_vorlauf",
            friendly_name: "Heizung Vorlauf",
            unit: "°C",
            device_class: "temperature",
        },
    ),
    (
        "hot_water_bottom",
        SensorMeta {
            entity_id: "sensor.warmwasser_unten",
            friendly_name: "Warmwasser Unten",
            unit: "°C",
            device_class: "temperature",
        },
    ),
    (
        "heating_return",
        SensorMeta {
            entity_id: "sensor.heizung_rucklauf",
            friendly_name: "Heizung Rücklauf",
            unit: "°C",
            device_class: "temperature",
        },
    ),
    (
        "utility_room_temperature",
        SensorMeta {
            entity_id: "sensor.technikraum_temperatur",
            friendly_name: "Technikraum Temperatur",
            unit: "°C",
            device_class: "temperature",
        },
    ),
    (
        "utility_room_humidity",
        SensorMeta {
            entity_id: "sensor.technikraum_luftfeuchtigkeit",
            friendly_name: "Technikraum Luftfeuchtigkeit",
            unit: "%",
            device_class: "humidity",
        },
    ),
];

pub fn sensor_meta(id: &str) -> Option<&'static SensorMeta> {
    SENSOR_META
        .iter()
        .find(|(key, _)| *key == id)
        .map(|(_, meta)| meta)
}

// ==============================================================================
// state payload
// ==============================================================================

#[derive(Serialize, Deserialize)]
struct StatePayload {
    state: String,
    attributes: StateAttributes,
}

#[derive(Serialize, Deserialize)]
struct StateAttributes {
    friendly_name: String,
    unit_of_measurement: String,
    device_class: String,
    state_class: String,
}

impl StateAttributes {
    fn from_meta(meta: &SensorMeta) -> Self {
        Self {
            friendly_name: meta.friendly_name.to_string(),
            unit_of_measurement: meta.unit.to_string(),
            device_class: meta.device_class.to_string(),
            state_class: "measurement".to_string(),
        }
    }
}

// ==============================================================================
// pusher
// ==============================================================================

pub struct HaPusher {
    base_url: String,
    token: String,
    client: reqwest::Client,
    busy: AtomicBool,
    failures: AtomicU32,
}

impl HaPusher {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
            busy: AtomicBool::new(false),
            failures: AtomicU32::new(0),
        })
    }

    /// push every reading known to the metadata table.
    ///
    /// per-sensor failures never abort the batch. if a push is already in
    /// flight the whole call is skipped without any network I/O. a batch
    /// with zero matching sensors performs no requests, no logging, and no
    /// streak bookkeeping.
    pub async fn push(&self, readings: &[Reading]) {
        let matched: Vec<(&Reading, &'static SensorMeta)> = readings
            .iter()
            .filter_map(|reading| sensor_meta(&reading.id).map(|meta| (reading, meta)))
            .collect();
        if matched.is_empty() {
            return;
        }

        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("push still in progress, skipping");
            return;
        }

        let mut pushed = 0;
        for (reading, meta) in &matched {
            match self.push_sensor(reading, meta).await {
                Ok(()) => pushed += 1,
                Err(e) => {
                    let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
                    if failures == 1 || failures % 10 == 0 {
                        tracing::warn!(
                            "push {} failed ({} consecutive): {}",
                            meta.entity_id,
                            failures,
                            e
                        );
                    }
                }
            }
        }

        if pushed > 0 {
            let failures = self.failures.swap(0, Ordering::SeqCst);
            if failures > 0 {
                tracing::info!("recovered after {} failures", failures);
            }
        }
        tracing::info!("pushed {}/{} sensors", pushed, matched.len());

        self.busy.store(false, Ordering::SeqCst);
    }

    async fn push_sensor(&self, reading: &Reading, meta: &SensorMeta) -> Result<()> {
        let value: f64 = reading
            .value
            .parse()
            .map_err(|_| anyhow::anyhow!("unparseable value {:?} for {}", reading.value, reading.id))?;
        if !value.is_finite() {
            anyhow::bail!("non-finite value {:?} for {}", reading.value, reading.id);
        }

        // the hub displays one decimal regardless of source precision
        let payload = StatePayload {
            state: format!("{value:.1}"),
            attributes: StateAttributes::from_meta(meta),
        };

        let url = format!("{}/api/states/{}", self.base_url, meta.entity_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            anyhow::bail!("unexpected status {} for {}", status, meta.entity_id);
        }
        Ok(())
    }
}
