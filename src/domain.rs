use serde::{Deserialize, Serialize};

/// a single cached sensor reading
///
/// the value stays a formatted decimal string end-to-end: the HTTP API and
/// the Home Assistant push target both consume the textual representation,
/// and the producing code controls the rounding (3 decimals for 1-Wire
/// millidegrees, 1 decimal for IIO milli-units). it is parsed back into a
/// number only transiently, for validation and outbound reformatting.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Reading {
    /// logical sensor identifier (e.g., "hot_water_middle" or a positional
    /// fallback like "0" for devices missing from the sensor map)
    pub id: String,

    /// formatted decimal value (e.g., "48.750" or "49.3")
    pub value: String,
}

impl Reading {
    pub fn new(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }
}
