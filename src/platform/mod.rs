//! Seams between the viewer and the map platform.
//!
//! The map engine, the 3D model overlay, geolocation and user alerts are
//! external services. Everything the viewer needs from them is captured in
//! the traits here; [`headless`] provides the in-process implementation
//! used by the demo binary and the tests.

pub mod headless;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::MapConfig;

pub type MapEventSender = mpsc::UnboundedSender<MapEvent>;
pub type MapEventReceiver = mpsc::UnboundedReceiver<MapEvent>;

/// Events emitted by the map platform.
#[derive(Debug, Clone)]
pub enum MapEvent {
    /// The style finished loading and the map is interactive.
    Load,
    /// The map settled after pending style and tile work.
    Idle,
    Click(ClickEvent),
    MouseMove(PointerEvent),
    MouseOut { layer: String },
    MoveEnd,
    ZoomEnd,
    ModelLoaded { model_id: String },
    ModelFailed { model_id: String, message: String },
}

/// A click, attributed to the topmost interactive layer under the cursor.
#[derive(Debug, Clone, Default)]
pub struct ClickEvent {
    pub layer: Option<String>,
    pub feature: Option<RenderedFeature>,
}

/// Pointer movement over a specific layer.
#[derive(Debug, Clone)]
pub struct PointerEvent {
    pub layer: String,
    pub feature: Option<RenderedFeature>,
}

/// A feature as currently rendered, with its style properties attached.
#[derive(Debug, Clone)]
pub struct RenderedFeature {
    pub geometry_type: String,
    /// Longitude and latitude for point geometries.
    pub point: Option<(f64, f64)>,
    pub properties: serde_json::Map<String, Value>,
}

impl RenderedFeature {
    pub fn point(lng: f64, lat: f64) -> Self {
        Self {
            geometry_type: "Point".to_string(),
            point: Some((lng, lat)),
            properties: serde_json::Map::new(),
        }
    }

    pub fn polygon() -> Self {
        Self {
            geometry_type: "Polygon".to_string(),
            point: None,
            properties: serde_json::Map::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }
}

/// Initial camera and style settings for the map.
#[derive(Debug, Clone)]
pub struct MapOptions {
    pub style_url: String,
    pub center: (f64, f64),
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub pitch: f64,
    pub bearing: f64,
}

impl MapOptions {
    pub fn from_config(config: &MapConfig) -> Self {
        Self {
            style_url: config.style_url.clone(),
            center: (config.center.lng, config.center.lat),
            zoom: config.zoom,
            min_zoom: config.min_zoom,
            max_zoom: config.max_zoom,
            pitch: config.pitch,
            bearing: config.bearing,
        }
    }
}

/// Dimensions of a generated style image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageSpec {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f64,
}

/// Style and camera surface of the map engine.
pub trait MapRenderer: Send + Sync {
    fn add_source(&self, source_id: &str, spec: Value);
    fn set_source_data(&self, source_id: &str, data: Value);
    fn add_layer(&self, spec: Value);
    fn remove_layer(&self, layer_id: &str);
    fn has_layer(&self, layer_id: &str) -> bool;
    fn add_image(&self, image_id: &str, spec: ImageSpec);
    fn set_paint_property(&self, layer_id: &str, name: &str, value: Value);
    fn set_layout_property(&self, layer_id: &str, name: &str, value: Value);
    fn set_filter(&self, layer_id: &str, filter: Value);
    fn set_config_property(&self, scope: &str, name: &str, value: Value);
    fn query_rendered_features(&self, layer_id: &str) -> Vec<RenderedFeature>;
    fn ease_to(&self, pitch: f64, duration_ms: u64);
    fn zoom(&self) -> f64;
    fn set_zoom(&self, zoom: f64);
    fn repaint(&self);
}

/// Loading options for a 3D model asset.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOptions {
    pub url: String,
    pub format: String,
    pub scale: (f64, f64, f64),
    pub rotation: (f64, f64, f64),
    pub units: String,
    pub anchor: String,
}

/// One placed copy of a loaded model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub lng: f64,
    pub lat: f64,
    pub altitude: f64,
    pub scale: f64,
    pub rotation_z_deg: f64,
}

/// 3D object placement on top of the map.
///
/// Loading is asynchronous; a [`MapEvent::ModelLoaded`] or
/// [`MapEvent::ModelFailed`] event reports the outcome. Placed copies are
/// tracked per model so clearing one model leaves the others alone.
pub trait ModelOverlay: Send + Sync {
    fn request_model(&self, model_id: &str, options: ModelOptions);
    fn place(&self, model_id: &str, placement: Placement);
    fn clear(&self, model_id: &str);
    fn placed_count(&self, model_id: &str) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPosition {
    pub lng: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoErrorKind {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct GeoError {
    pub kind: GeoErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy)]
pub struct GeoWatchOptions {
    pub high_accuracy: bool,
    pub maximum_age_ms: u64,
}

pub type GeoUpdate = Result<GeoPosition, GeoError>;

/// A running position watch. Updates end when the platform drops the
/// sending side; [`GeoWatchHandle::stop`] cancels from our side.
pub struct GeoWatch {
    pub updates: mpsc::UnboundedReceiver<GeoUpdate>,
    pub handle: GeoWatchHandle,
}

pub struct GeoWatchHandle {
    stop: Option<Box<dyn FnOnce() + Send>>,
}

impl GeoWatchHandle {
    pub fn new(stop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            stop: Some(Box::new(stop)),
        }
    }

    pub fn noop() -> Self {
        Self { stop: None }
    }

    pub fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }
}

/// Continuous position watching.
pub trait Geolocator: Send + Sync {
    fn supported(&self) -> bool;
    fn watch(&self, options: GeoWatchOptions) -> GeoWatch;
}

/// Blocking user-facing notices.
pub trait Notifier: Send + Sync {
    fn alert(&self, message: &str);
}
