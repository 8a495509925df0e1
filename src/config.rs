use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Map camera and style setup
    pub map: MapConfig,
    /// Live occupancy event stream
    pub stream: StreamConfig,
    /// Sunrise/sunset lookup used to pick the light preset at load
    #[serde(default)]
    pub daylight: DaylightConfig,
    /// 3D scene assets
    pub scene: SceneConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapConfig {
    pub style_url: String,
    pub center: LngLat,
    pub zoom: f64,
    #[serde(default = "MapConfig::default_min_zoom")]
    pub min_zoom: f64,
    #[serde(default = "MapConfig::default_max_zoom")]
    pub max_zoom: f64,
    /// Camera tilt in degrees used as the "3D" position of the pitch toggle
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub bearing: f64,
}

impl MapConfig {
    fn default_min_zoom() -> f64 {
        0.0
    }
    fn default_max_zoom() -> f64 {
        22.0
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

/// Configuration for the sensor event stream (server-sent events)
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    pub endpoint: String,
    /// Named SSE event carrying sensor payloads (default: "message")
    #[serde(default = "StreamConfig::default_event")]
    pub event: String,
    /// Send cookies/credentials with the stream request (default: false)
    #[serde(default)]
    pub with_credentials: bool,
}

impl StreamConfig {
    fn default_event() -> String {
        "message".to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaylightConfig {
    #[serde(default = "DaylightConfig::default_url")]
    pub url: String,
    #[serde(default = "DaylightConfig::default_lat")]
    pub lat: f64,
    #[serde(default = "DaylightConfig::default_lng")]
    pub lng: f64,
}

impl Default for DaylightConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            lat: Self::default_lat(),
            lng: Self::default_lng(),
        }
    }
}

impl DaylightConfig {
    fn default_url() -> String {
        "https://api.sunrisesunset.io/json".to_string()
    }
    fn default_lat() -> f64 {
        47.51083
    }
    fn default_lng() -> f64 {
        18.92717
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SceneConfig {
    pub car_model_url: String,
    /// Tree layer mounts only when set
    #[serde(default)]
    pub tree_model_url: Option<String>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
map:
  style_url: "mapbox://styles/example/lot"
  center:
    lng: 18.92717
    lat: 47.51083
  zoom: 17.5
stream:
  endpoint: "https://parking.example.com/events"
scene:
  car_model_url: "https://assets.example.com/car.glb"
"#;

    #[test]
    fn minimal_config_applies_defaults() {
        let config: Config = serde_yaml::from_str(MINIMAL).unwrap();

        assert_eq!(config.map.min_zoom, 0.0);
        assert_eq!(config.map.max_zoom, 22.0);
        assert_eq!(config.map.pitch, 0.0);
        assert_eq!(config.stream.event, "message");
        assert!(!config.stream.with_credentials);
        assert_eq!(config.daylight.url, "https://api.sunrisesunset.io/json");
        assert_eq!(config.daylight.lat, 47.51083);
        assert_eq!(config.daylight.lng, 18.92717);
        assert!(config.scene.tree_model_url.is_none());
    }

    #[test]
    fn full_config_overrides_defaults() {
        let yaml = r#"
map:
  style_url: "mapbox://styles/example/lot"
  center:
    lng: 23.31
    lat: 42.69
  zoom: 16.0
  min_zoom: 14.0
  max_zoom: 20.0
  pitch: 60.0
  bearing: 12.5
stream:
  endpoint: "https://parking.example.com/events"
  event: "parking-update"
  with_credentials: true
daylight:
  url: "https://daylight.example.com/json"
  lat: 42.69
  lng: 23.31
scene:
  car_model_url: "https://assets.example.com/car.glb"
  tree_model_url: "https://assets.example.com/tree.glb"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.map.pitch, 60.0);
        assert_eq!(config.map.bearing, 12.5);
        assert_eq!(config.stream.event, "parking-update");
        assert!(config.stream.with_credentials);
        assert_eq!(config.daylight.lat, 42.69);
        assert_eq!(
            config.scene.tree_model_url.as_deref(),
            Some("https://assets.example.com/tree.glb")
        );
    }

    #[test]
    fn missing_stream_section_fails() {
        let yaml = r#"
map:
  style_url: "mapbox://styles/example/lot"
  center:
    lng: 18.9
    lat: 47.5
  zoom: 17.0
scene:
  car_model_url: "https://assets.example.com/car.glb"
"#;
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load("/nonexistent/lotview.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::ReadError(_)));
        assert!(err.to_string().starts_with("Failed to read config file"));
    }
}
