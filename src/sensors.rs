//! ==============================================================================
//! sensors.rs - 1-wire / iio device reader
//! ==============================================================================
//!
//! purpose:
//!     turns the kernel's sysfs text interfaces into typed readings.
//!     two independent branches feed one snapshot:
//!     - DS18B20 probes on the 1-Wire bus (`<w1_path>/28-*/w1_slave`)
//!     - a DHT22 behind the IIO subsystem (`<iio>/in_temp_input`,
//!       `<iio>/in_humidityrelative_input`)
//!
//! error policy:
//!     a sensor that cannot be read this cycle is skipped and logged, never
//!     fatal to the batch. a failed CRC marker means the hardware reading is
//!     unreliable and is discarded the same way.
//!
//! relationships:
//!     - used by: cache.rs (refresh runs both branches)
//!     - used by: main.rs (one-time IIO device probe at startup)
//!
//! ==============================================================================

use crate::domain::Reading;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// fixed logical id for the IIO temperature channel
pub const IIO_TEMP_ID: &str = "utility_room_temperature";
/// fixed logical id for the IIO relative-humidity channel
pub const IIO_HUMIDITY_ID: &str = "utility_room_humidity";

/// device directories considered by the IIO startup probe
const IIO_CANDIDATES: [&str; 2] = [
    "/sys/bus/iio/devices/iio:device0",
    "/sys/bus/iio/devices/iio:device1",
];

// ==============================================================================
// sensor identity mapping
// ==============================================================================

/// maps 1-Wire device addresses (directory names like "28-0316a4da7bff") to
/// caller-assigned logical sensor ids. built once at startup and read-only
/// during polling. devices missing from the map fall back to their positional
/// index in the sorted device list, so their ids are only stable as long as
/// the bus enumeration itself is.
#[derive(Debug, Clone, Default)]
pub struct SensorMap {
    entries: HashMap<String, String>,
}

impl SensorMap {
    /// parse "addr1:id1,addr2:id2,..." into a mapping. entries without a
    /// colon are skipped; surrounding whitespace is trimmed.
    pub fn parse(raw: &str) -> Self {
        let mut entries = HashMap::new();
        for entry in raw.split(',') {
            if let Some((addr, id)) = entry.split_once(':') {
                let addr = addr.trim();
                let id = id.trim();
                if !addr.is_empty() && !id.is_empty() {
                    entries.insert(addr.to_string(), id.to_string());
                }
            }
        }
        Self { entries }
    }

    /// resolve a device address to its logical id, falling back to the
    /// device's positional index in the sorted bus listing.
    pub fn resolve(&self, addr: &str, index: usize) -> String {
        match self.entries.get(addr) {
            Some(id) => id.clone(),
            None => index.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==============================================================================
// 1-wire branch (DS18B20)
// ==============================================================================

/// read every DS18B20 on the bus, in ascending directory-name order.
///
/// a typical `w1_slave` file looks like:
/// ```text
/// 33 00 4b 46 ff ff 02 10 f4 : crc=f4 YES
/// 33 00 4b 46 ff ff 02 10 f4 t=25625
/// ```
/// the first line carries the driver's CRC verdict, the second the raw
/// temperature in millidegrees.
pub fn read_w1_bus(base: &Path, map: &SensorMap) -> Vec<Reading> {
    let entries = match fs::read_dir(base) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("error listing {}: {}", base.display(), e);
            return Vec::new();
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("28-"))
        })
        .collect();
    dirs.sort();

    let mut readings = Vec::new();
    for (i, dir) in dirs.iter().enumerate() {
        let path = dir.join("w1_slave");
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("error reading {}: {}", path.display(), e);
                continue;
            }
        };

        // the driver validates the scratchpad CRC and reports YES/NO;
        // NO means the transfer was corrupted and the value is garbage
        if !content.contains("YES") {
            tracing::warn!("CRC check failed for {}", path.display());
            continue;
        }

        let Some(millideg) = parse_temp_field(&content) else {
            tracing::warn!("no temperature found in {}", path.display());
            continue;
        };

        let addr = dir
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        let id = map.resolve(addr, i);
        let value = format!("{:.3}", millideg as f64 / 1000.0);
        readings.push(Reading::new(id, value));
    }

    readings
}

/// extract the `t=<int>` field anchored at the end of a physical line,
/// trailing whitespace tolerated. returns the raw millidegree value.
fn parse_temp_field(content: &str) -> Option<i64> {
    for line in content.lines() {
        let line = line.trim_end();
        if let Some(pos) = line.rfind("t=") {
            if let Ok(millideg) = line[pos + 2..].parse::<i64>() {
                return Some(millideg);
            }
        }
    }
    None
}

// ==============================================================================
// iio branch (DHT22)
// ==============================================================================

/// read the DHT22 channels exposed by the IIO driver. `None` means the
/// startup probe found no device and the branch is disabled. the two
/// channels are independent: a missing or unreadable humidity file does not
/// block the temperature reading, and vice versa.
pub fn read_iio(dir: Option<&Path>) -> Vec<Reading> {
    let Some(dir) = dir else {
        return Vec::new();
    };

    let mut readings = Vec::new();

    match read_iio_value(&dir.join("in_temp_input")) {
        Ok(value) => readings.push(Reading::new(IIO_TEMP_ID, value)),
        Err(e) => tracing::warn!("error reading DHT22 temperature: {}", e),
    }

    match read_iio_value(&dir.join("in_humidityrelative_input")) {
        Ok(value) => readings.push(Reading::new(IIO_HUMIDITY_ID, value)),
        Err(e) => tracing::warn!("error reading DHT22 humidity: {}", e),
    }

    readings
}

/// read a single IIO channel file: one integer in milli-units,
/// formatted to 1 decimal place.
fn read_iio_value(path: &Path) -> anyhow::Result<String> {
    let raw = fs::read_to_string(path)?;
    let raw = raw.trim();
    let milli: i64 = raw
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid value {:?} in {}", raw, path.display()))?;
    Ok(format!("{:.1}", milli as f64 / 1000.0))
}

/// one-time startup probe for the IIO device directory.
///
/// an explicit configured path (config file or IIO_DEVICE) replaces the
/// candidate list; otherwise the stock kernel enumeration paths are tried in
/// order. the first candidate exposing `in_temp_input` wins. this runs once
/// at startup, not in the poll loop: the device does not come and go.
pub fn find_iio_device(configured: &str) -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = if configured.is_empty() {
        IIO_CANDIDATES.iter().map(PathBuf::from).collect()
    } else {
        vec![PathBuf::from(configured)]
    };
    find_iio_device_in(&candidates)
}

fn find_iio_device_in(candidates: &[PathBuf]) -> Option<PathBuf> {
    for path in candidates {
        if path.join("in_temp_input").exists() {
            tracing::info!("found IIO device at {}", path.display());
            return Some(path.clone());
        }
    }
    tracing::warn!("no IIO device found, DHT22 disabled");
    None
}

// ==============================================================================
// combined snapshot
// ==============================================================================

/// run both branches and concatenate: 1-Wire readings first (ascending
/// directory order), then IIO temperature, then IIO humidity.
pub fn read_all(w1_path: &Path, iio_path: Option<&Path>, map: &SensorMap) -> Vec<Reading> {
    let mut readings = read_w1_bus(w1_path, map);
    readings.extend(read_iio(iio_path));
    readings
}
