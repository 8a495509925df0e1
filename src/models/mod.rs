//! Domain types shared across the viewer: sensor records from the parking
//! feed, occupancy projection, the light preset modes and the elapsed-time
//! pair shown in the info box.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Light preset of the basemap. Serialized values match the style's
/// `lightPreset` configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapMode {
    Day,
    Night,
    Dusk,
    Dawn,
}

impl Default for MapMode {
    fn default() -> Self {
        MapMode::Day
    }
}

impl MapMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapMode::Day => "day",
            MapMode::Night => "night",
            MapMode::Dusk => "dusk",
            MapMode::Dawn => "dawn",
        }
    }
}

/// Occupancy state reported by a slot sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SlotStatus {
    Free,
    Busy,
    /// Used when the feed reports a state this build does not know
    #[serde(other)]
    Unknown,
}

impl Default for SlotStatus {
    fn default() -> Self {
        SlotStatus::Unknown
    }
}

/// One sensor reading from the parking feed. Field names follow the wire
/// format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorRecord {
    pub sensor_id: i64,
    #[serde(default)]
    pub status: SlotStatus,
    #[serde(default)]
    pub last_status_timestamp: Option<String>,
    #[serde(default)]
    pub car_registration_numbers: Vec<String>,
}

/// Ids of all BUSY slots in a sensor payload, in wire order.
pub fn occupied_ids(records: &[SensorRecord]) -> Vec<i64> {
    records
        .iter()
        .filter(|r| r.status == SlotStatus::Busy)
        .map(|r| r.sensor_id)
        .collect()
}

/// Zero-padded hours/minutes pair shown in the info box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Elapsed {
    pub hours: String,
    pub minutes: String,
}

/// Time elapsed between an ISO-8601 timestamp and `now`.
///
/// Minutes are floored, the remainder keeps the dividend's sign and both
/// components are rendered as absolute values. Unparseable input yields
/// `None` and the info box leaves the pair blank.
pub fn elapsed_between(timestamp: &str, now: DateTime<Utc>) -> Option<Elapsed> {
    let from = parse_utc(timestamp)?;

    let diff_ms = now.signed_duration_since(from).num_milliseconds();
    let diff_minutes = diff_ms.div_euclid(60_000);
    let hours = diff_minutes.div_euclid(60);
    let minutes = diff_minutes % 60;

    Some(Elapsed {
        hours: format!("{:02}", hours.abs()),
        minutes: format!("{:02}", minutes.abs()),
    })
}

/// Time elapsed since an ISO-8601 timestamp, against the wall clock.
pub fn elapsed_since(timestamp: &str) -> Option<Elapsed> {
    elapsed_between(timestamp, Utc::now())
}

/// Sensor timestamps arrive with or without an offset; offset-less ones
/// are read as UTC.
fn parse_utc(timestamp: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Most recent geolocation fix. At most one is kept; every update overwrites
/// the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UserLocationPoint {
    pub lng: f64,
    pub lat: f64,
}

impl UserLocationPoint {
    /// GeoJSON Feature with empty properties, as the location source expects.
    pub fn to_feature(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "Feature",
            "properties": {},
            "geometry": {
                "type": "Point",
                "coordinates": [self.lng, self.lat]
            }
        })
    }
}

/// Snapshot shown in the info box for a clicked slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotPopup {
    /// Whether the slot was outside the occupied set at click time
    pub available: bool,
    /// Feature properties of the clicked lot polygon, passed through as-is
    pub slot: serde_json::Map<String, serde_json::Value>,
    /// Sensor record for the slot, when the feed has one
    pub record: Option<SensorRecord>,
    /// Time since the last status change, when the record carries a timestamp
    pub elapsed: Option<Elapsed>,
}
