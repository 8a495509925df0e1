//! In-process map platform.
//!
//! Records every operation the viewer issues instead of drawing anything,
//! and lets callers script the inputs a real map would produce: rendered
//! features, platform events, geolocation fixes. The demo binary runs on
//! this platform; the tests assert against its recorded operations.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

use super::{
    GeoPosition, GeoUpdate, GeoWatch, GeoWatchHandle, GeoWatchOptions, Geolocator, ImageSpec,
    MapEvent, MapEventReceiver, MapEventSender, MapOptions, MapRenderer, ModelOptions,
    ModelOverlay, Notifier, Placement, RenderedFeature,
};

/// One operation issued against the platform, in issue order.
#[derive(Debug, Clone)]
pub enum RecordedOp {
    AddSource { source_id: String, spec: Value },
    SetSourceData { source_id: String, data: Value },
    AddLayer { layer_id: String, spec: Value },
    RemoveLayer { layer_id: String },
    AddImage { image_id: String, spec: ImageSpec },
    SetPaintProperty { layer_id: String, name: String, value: Value },
    SetLayoutProperty { layer_id: String, name: String, value: Value },
    SetFilter { layer_id: String, filter: Value },
    SetConfigProperty { scope: String, name: String, value: Value },
    QueryRenderedFeatures { layer_id: String },
    EaseTo { pitch: f64, duration_ms: u64 },
    SetZoom { zoom: f64 },
    Repaint,
    RequestModel { model_id: String, options: ModelOptions },
    PlaceModel { model_id: String, placement: Placement },
    ClearModels { model_id: String },
}

struct HeadlessState {
    zoom: f64,
    ops: Vec<RecordedOp>,
    layers: HashSet<String>,
    scripted: HashMap<String, Vec<RenderedFeature>>,
    placed: HashMap<String, Vec<Placement>>,
    auto_idle: bool,
    auto_load_models: bool,
}

pub struct HeadlessMap {
    options: MapOptions,
    state: Mutex<HeadlessState>,
    events_tx: MapEventSender,
}

impl HeadlessMap {
    pub fn new(options: MapOptions) -> (Arc<Self>, MapEventReceiver) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let map = Self {
            state: Mutex::new(HeadlessState {
                zoom: options.zoom,
                ops: Vec::new(),
                layers: HashSet::new(),
                scripted: HashMap::new(),
                placed: HashMap::new(),
                auto_idle: true,
                auto_load_models: true,
            }),
            options,
            events_tx,
        };
        (Arc::new(map), events_rx)
    }

    pub fn options(&self) -> &MapOptions {
        &self.options
    }

    /// Inject a platform event as a real map would fire it.
    pub fn push_event(&self, event: MapEvent) {
        // Ignore send errors - they just mean no one is listening
        let _ = self.events_tx.send(event);
    }

    /// Set what the next queries against a layer will return.
    pub fn script_rendered_features(&self, layer_id: &str, features: Vec<RenderedFeature>) {
        self.state()
            .scripted
            .insert(layer_id.to_string(), features);
    }

    /// A real map fires `idle` once pending style work settles; by default
    /// one is emitted per style mutation so waiting layers make progress.
    pub fn set_auto_idle(&self, enabled: bool) {
        self.state().auto_idle = enabled;
    }

    /// By default a requested model reports loaded immediately.
    pub fn set_auto_load_models(&self, enabled: bool) {
        self.state().auto_load_models = enabled;
    }

    pub fn ops(&self) -> Vec<RecordedOp> {
        self.state().ops.clone()
    }

    pub fn placements(&self, model_id: &str) -> Vec<Placement> {
        self.state()
            .placed
            .get(model_id)
            .cloned()
            .unwrap_or_default()
    }

    fn state(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, op: RecordedOp) {
        self.state().ops.push(op);
    }

    fn record_mutation(&self, op: RecordedOp) {
        let auto_idle = {
            let mut state = self.state();
            state.ops.push(op);
            state.auto_idle
        };
        if auto_idle {
            self.push_event(MapEvent::Idle);
        }
    }
}

impl MapRenderer for HeadlessMap {
    fn add_source(&self, source_id: &str, spec: Value) {
        self.record_mutation(RecordedOp::AddSource {
            source_id: source_id.to_string(),
            spec,
        });
    }

    fn set_source_data(&self, source_id: &str, data: Value) {
        self.record_mutation(RecordedOp::SetSourceData {
            source_id: source_id.to_string(),
            data,
        });
    }

    fn add_layer(&self, spec: Value) {
        let layer_id = spec["id"].as_str().unwrap_or_default().to_string();
        self.state().layers.insert(layer_id.clone());
        self.record_mutation(RecordedOp::AddLayer { layer_id, spec });
    }

    fn remove_layer(&self, layer_id: &str) {
        self.state().layers.remove(layer_id);
        self.record(RecordedOp::RemoveLayer {
            layer_id: layer_id.to_string(),
        });
    }

    fn has_layer(&self, layer_id: &str) -> bool {
        self.state().layers.contains(layer_id)
    }

    fn add_image(&self, image_id: &str, spec: ImageSpec) {
        self.record(RecordedOp::AddImage {
            image_id: image_id.to_string(),
            spec,
        });
    }

    fn set_paint_property(&self, layer_id: &str, name: &str, value: Value) {
        self.record_mutation(RecordedOp::SetPaintProperty {
            layer_id: layer_id.to_string(),
            name: name.to_string(),
            value,
        });
    }

    fn set_layout_property(&self, layer_id: &str, name: &str, value: Value) {
        self.record_mutation(RecordedOp::SetLayoutProperty {
            layer_id: layer_id.to_string(),
            name: name.to_string(),
            value,
        });
    }

    fn set_filter(&self, layer_id: &str, filter: Value) {
        self.record_mutation(RecordedOp::SetFilter {
            layer_id: layer_id.to_string(),
            filter,
        });
    }

    fn set_config_property(&self, scope: &str, name: &str, value: Value) {
        self.record(RecordedOp::SetConfigProperty {
            scope: scope.to_string(),
            name: name.to_string(),
            value,
        });
    }

    fn query_rendered_features(&self, layer_id: &str) -> Vec<RenderedFeature> {
        let mut state = self.state();
        state.ops.push(RecordedOp::QueryRenderedFeatures {
            layer_id: layer_id.to_string(),
        });
        state.scripted.get(layer_id).cloned().unwrap_or_default()
    }

    fn ease_to(&self, pitch: f64, duration_ms: u64) {
        self.record(RecordedOp::EaseTo { pitch, duration_ms });
    }

    fn zoom(&self) -> f64 {
        self.state().zoom
    }

    fn set_zoom(&self, zoom: f64) {
        self.state().zoom = zoom;
        self.record(RecordedOp::SetZoom { zoom });
    }

    fn repaint(&self) {
        self.record(RecordedOp::Repaint);
    }
}

impl ModelOverlay for HeadlessMap {
    fn request_model(&self, model_id: &str, options: ModelOptions) {
        let auto_load = {
            let mut state = self.state();
            state.ops.push(RecordedOp::RequestModel {
                model_id: model_id.to_string(),
                options,
            });
            state.auto_load_models
        };
        if auto_load {
            self.push_event(MapEvent::ModelLoaded {
                model_id: model_id.to_string(),
            });
        }
    }

    fn place(&self, model_id: &str, placement: Placement) {
        let mut state = self.state();
        state
            .placed
            .entry(model_id.to_string())
            .or_default()
            .push(placement);
        state.ops.push(RecordedOp::PlaceModel {
            model_id: model_id.to_string(),
            placement,
        });
    }

    fn clear(&self, model_id: &str) {
        let mut state = self.state();
        state.placed.remove(model_id);
        state.ops.push(RecordedOp::ClearModels {
            model_id: model_id.to_string(),
        });
    }

    fn placed_count(&self, model_id: &str) -> usize {
        self.state()
            .placed
            .get(model_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// Replays a scripted sequence of fixes and errors to every watch.
pub struct HeadlessGeolocator {
    supported: bool,
    script: Mutex<Vec<GeoUpdate>>,
    last_options: Mutex<Option<GeoWatchOptions>>,
    watches_started: AtomicUsize,
    watches_stopped: Arc<AtomicUsize>,
}

impl HeadlessGeolocator {
    pub fn new() -> Self {
        Self {
            supported: true,
            script: Mutex::new(Vec::new()),
            last_options: Mutex::new(None),
            watches_started: AtomicUsize::new(0),
            watches_stopped: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    pub fn with_fix(position: GeoPosition) -> Self {
        let locator = Self::new();
        locator.push_update(Ok(position));
        locator
    }

    pub fn push_update(&self, update: GeoUpdate) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(update);
    }

    pub fn watches_started(&self) -> usize {
        self.watches_started.load(Ordering::SeqCst)
    }

    pub fn watches_stopped(&self) -> usize {
        self.watches_stopped.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<GeoWatchOptions> {
        *self.last_options.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for HeadlessGeolocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Geolocator for HeadlessGeolocator {
    fn supported(&self) -> bool {
        self.supported
    }

    fn watch(&self, options: GeoWatchOptions) -> GeoWatch {
        self.watches_started.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock().unwrap_or_else(|e| e.into_inner()) = Some(options);

        let (tx, rx) = mpsc::unbounded_channel();
        for update in self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
        {
            // Ignore send errors - they just mean no one is listening
            let _ = tx.send(update.clone());
        }
        // The sender drops here, so the watch ends once the script is drained.

        let stopped = self.watches_stopped.clone();
        GeoWatch {
            updates: rx,
            handle: GeoWatchHandle::new(move || {
                stopped.fetch_add(1, Ordering::SeqCst);
            }),
        }
    }
}

/// Logs alerts and keeps them for assertions.
#[derive(Default)]
pub struct HeadlessNotifier {
    alerts: Mutex<Vec<String>>,
}

impl HeadlessNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Notifier for HeadlessNotifier {
    fn alert(&self, message: &str) {
        warn!(alert = message, "User alert");
        self.alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());
    }
}

/// Camera settings used by tests across the crate.
#[cfg(test)]
pub fn test_options() -> MapOptions {
    MapOptions {
        style_url: "mapbox://styles/demo/parking".to_string(),
        center: (23.31815, 42.68525),
        zoom: 17.5,
        min_zoom: 0.0,
        max_zoom: 22.0,
        pitch: 62.0,
        bearing: 0.0,
    }
}
