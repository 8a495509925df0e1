//! Car models placed on the anchor points of occupied slots.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{error, info};

use super::{EventOutcome, LayerContext, MapLayer, ANCHORS};
use crate::platform::{MapEvent, MapRenderer, ModelOptions, ModelOverlay, Placement};
use crate::store::{MapStore, StoreEvent};

pub const CAR_LAYER_ID: &str = "car-model-lyr";
pub const CAR_MODEL_ID: &str = "car";
pub const CAR_SCALE: f64 = 0.025;
pub const CAR_HEADING_DEG: f64 = -117.0;

/// Anchor tiles keep rendering in after the model loads; poll until the
/// first batch of anchors is queryable.
const ANCHOR_POLL_INTERVAL_MS: u64 = 200;

/// Restricts the anchor layer to point anchors of occupied slots.
pub fn anchor_filter(occupied: &[i64]) -> Value {
    json!([
        "all",
        ["match", ["get", "TYPE"], ["SLOT_ANCHOR"], true, false],
        ["match", ["geometry-type"], ["Point"], true, false],
        ["in", ["get", "DB_ID"], ["literal", occupied]]
    ])
}

fn model_options(url: &str) -> ModelOptions {
    ModelOptions {
        url: url.to_string(),
        format: "gltf".to_string(),
        scale: (1.0, 1.0, 1.0),
        rotation: (90.0, 15.0, 0.0),
        units: "meters".to_string(),
        anchor: "center".to_string(),
    }
}

fn anchor_points(renderer: &dyn MapRenderer) -> Vec<(f64, f64)> {
    renderer
        .query_rendered_features(ANCHORS)
        .into_iter()
        .filter(|feature| feature.geometry_type == "Point")
        .filter_map(|feature| feature.point)
        .collect()
}

/// Replaces every placed car with one per anchor point.
fn display_models(
    renderer: &dyn MapRenderer,
    overlay: &dyn ModelOverlay,
    store: &MapStore,
    model_loaded: &AtomicBool,
    points: &[(f64, f64)],
) {
    if !model_loaded.load(Ordering::SeqCst) {
        return;
    }

    overlay.clear(CAR_MODEL_ID);
    for &(lng, lat) in points {
        overlay.place(
            CAR_MODEL_ID,
            Placement {
                lng,
                lat,
                altitude: 0.0,
                scale: CAR_SCALE,
                rotation_z_deg: CAR_HEADING_DEG,
            },
        );
    }
    renderer.repaint();
    store.set_loading(false);
}

pub struct CarLayer {
    ctx: LayerContext,
    model_url: String,
    model_loaded: Arc<AtomicBool>,
    awaiting_idle: bool,
    poll_task: Option<JoinHandle<()>>,
}

impl CarLayer {
    pub fn new(ctx: LayerContext, model_url: String) -> Self {
        Self {
            ctx,
            model_url,
            model_loaded: Arc::new(AtomicBool::new(false)),
            awaiting_idle: false,
            poll_task: None,
        }
    }

    fn update_models(&self) {
        let points = anchor_points(self.ctx.renderer.as_ref());
        display_models(
            self.ctx.renderer.as_ref(),
            self.ctx.overlay.as_ref(),
            &self.ctx.store,
            &self.model_loaded,
            &points,
        );
    }

    fn spawn_anchor_poll(&self) -> JoinHandle<()> {
        let renderer = self.ctx.renderer.clone();
        let overlay = self.ctx.overlay.clone();
        let store = self.ctx.store.clone();
        let model_loaded = self.model_loaded.clone();

        tokio::spawn(async move {
            let mut ticker = time::interval(Duration::from_millis(ANCHOR_POLL_INTERVAL_MS));
            // Skip the first tick which fires immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let points = anchor_points(renderer.as_ref());
                if points.is_empty() {
                    continue;
                }
                display_models(
                    renderer.as_ref(),
                    overlay.as_ref(),
                    &store,
                    &model_loaded,
                    &points,
                );
                break;
            }
        })
    }
}

impl MapLayer for CarLayer {
    fn name(&self) -> &'static str {
        "cars"
    }

    fn initialize(&mut self) {
        self.ctx.store.set_loading(true);
        self.ctx.renderer.add_layer(json!({
            "id": CAR_LAYER_ID,
            "type": "custom",
            "renderingMode": "3d"
        }));
        self.ctx
            .overlay
            .request_model(CAR_MODEL_ID, model_options(&self.model_url));
    }

    fn on_store_event(&mut self, event: StoreEvent) {
        if event != StoreEvent::OccupancyChanged {
            return;
        }
        if !self.model_loaded.load(Ordering::SeqCst) || !self.ctx.store.car_model_ready() {
            return;
        }

        let occupied = self.ctx.store.occupied();
        if occupied.is_empty() {
            // Previously placed cars stay where they are.
            info!("All slots are free");
            return;
        }

        self.ctx
            .renderer
            .set_filter(ANCHORS, anchor_filter(&occupied));
        self.awaiting_idle = true;
    }

    fn on_map_event(&mut self, event: &MapEvent) -> EventOutcome {
        match event {
            MapEvent::ModelLoaded { model_id } if model_id == CAR_MODEL_ID => {
                if !self.model_loaded.load(Ordering::SeqCst) {
                    info!("Car model has been loaded!");
                    self.model_loaded.store(true, Ordering::SeqCst);
                    self.ctx.store.set_car_model_ready();
                    self.poll_task = Some(self.spawn_anchor_poll());
                }
            }
            MapEvent::ModelFailed { model_id, message } if model_id == CAR_MODEL_ID => {
                error!(error = %message, "Car model failed to load");
            }
            MapEvent::Idle => {
                if self.awaiting_idle {
                    self.awaiting_idle = false;
                    self.update_models();
                }
            }
            MapEvent::MoveEnd | MapEvent::ZoomEnd => self.update_models(),
            _ => {}
        }
        EventOutcome::Ignored
    }

    fn teardown(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        self.ctx.overlay.clear(CAR_MODEL_ID);
        self.ctx.renderer.repaint();
        if self.ctx.renderer.has_layer(CAR_LAYER_ID) {
            self.ctx.renderer.remove_layer(CAR_LAYER_ID);
        }
    }
}
