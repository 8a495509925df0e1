//! Decorative tree models placed on their own anchor points.
//!
//! Trees are static scenery: they follow camera moves like the cars do,
//! but occupancy never touches them and they do not drive the loading
//! indicator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{error, info};

use super::{EventOutcome, LayerContext, MapLayer, TREE_ANCHORS};
use crate::platform::{MapEvent, MapRenderer, ModelOptions, ModelOverlay, Placement};
use crate::store::StoreEvent;

pub const TREE_LAYER_ID: &str = "tree-model-lyr";
pub const TREE_MODEL_ID: &str = "tree";
pub const TREE_SCALE: f64 = 1.0;

const ANCHOR_POLL_INTERVAL_MS: u64 = 200;

fn model_options(url: &str) -> ModelOptions {
    ModelOptions {
        url: url.to_string(),
        format: "gltf".to_string(),
        scale: (1.0, 1.0, 1.0),
        rotation: (90.0, 0.0, 0.0),
        units: "meters".to_string(),
        anchor: "center".to_string(),
    }
}

fn anchor_points(renderer: &dyn MapRenderer) -> Vec<(f64, f64)> {
    renderer
        .query_rendered_features(TREE_ANCHORS)
        .into_iter()
        .filter(|feature| feature.geometry_type == "Point")
        .filter_map(|feature| feature.point)
        .collect()
}

fn display_models(overlay: &dyn ModelOverlay, model_loaded: &AtomicBool, points: &[(f64, f64)]) {
    if !model_loaded.load(Ordering::SeqCst) {
        return;
    }

    overlay.clear(TREE_MODEL_ID);
    for &(lng, lat) in points {
        overlay.place(
            TREE_MODEL_ID,
            Placement {
                lng,
                lat,
                altitude: 0.0,
                scale: TREE_SCALE,
                rotation_z_deg: 0.0,
            },
        );
    }
}

pub struct TreeLayer {
    ctx: LayerContext,
    model_url: String,
    model_loaded: Arc<AtomicBool>,
    poll_task: Option<JoinHandle<()>>,
}

impl TreeLayer {
    pub fn new(ctx: LayerContext, model_url: String) -> Self {
        Self {
            ctx,
            model_url,
            model_loaded: Arc::new(AtomicBool::new(false)),
            poll_task: None,
        }
    }

    fn update_models(&self) {
        let points = anchor_points(self.ctx.renderer.as_ref());
        display_models(self.ctx.overlay.as_ref(), &self.model_loaded, &points);
    }

    fn spawn_anchor_poll(&self) -> JoinHandle<()> {
        let renderer = self.ctx.renderer.clone();
        let overlay = self.ctx.overlay.clone();
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
                display_models(overlay.as_ref(), &model_loaded, &points);
                break;
            }
        })
    }
}

impl MapLayer for TreeLayer {
    fn name(&self) -> &'static str {
        "trees"
    }

    fn initialize(&mut self) {
        self.ctx.renderer.add_layer(json!({
            "id": TREE_LAYER_ID,
            "type": "custom",
            "renderingMode": "3d"
        }));
        self.ctx
            .overlay
            .request_model(TREE_MODEL_ID, model_options(&self.model_url));
    }

    fn on_store_event(&mut self, _event: StoreEvent) {}

    fn on_map_event(&mut self, event: &MapEvent) -> EventOutcome {
        match event {
            MapEvent::ModelLoaded { model_id } if model_id == TREE_MODEL_ID => {
                if !self.model_loaded.load(Ordering::SeqCst) {
                    info!("Tree model has been loaded!");
                    self.model_loaded.store(true, Ordering::SeqCst);
                    self.ctx.store.set_tree_model_ready();
                    self.poll_task = Some(self.spawn_anchor_poll());
                }
            }
            MapEvent::ModelFailed { model_id, message } if model_id == TREE_MODEL_ID => {
                error!(error = %message, "Tree model failed to load");
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
        self.ctx.overlay.clear(TREE_MODEL_ID);
        self.ctx.renderer.repaint();
        if self.ctx.renderer.has_layer(TREE_LAYER_ID) {
            self.ctx.renderer.remove_layer(TREE_LAYER_ID);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::layers::cars::CAR_MODEL_ID;
    use crate::platform::headless::{test_options, HeadlessMap};
    use crate::platform::RenderedFeature;
    use crate::store::MapStore;

    fn setup() -> (Arc<HeadlessMap>, LayerContext, TreeLayer) {
        let (map, _events) = HeadlessMap::new(test_options());
        let store = Arc::new(MapStore::new(62.0));
        let ctx = LayerContext {
            renderer: map.clone(),
            overlay: map.clone(),
            store,
        };
        let layer = TreeLayer::new(ctx.clone(), "https://assets.example.com/tree.gltf".to_string());
        (map, ctx, layer)
    }

    fn loaded(layer: &mut TreeLayer) {
        layer.on_map_event(&MapEvent::ModelLoaded {
            model_id: TREE_MODEL_ID.to_string(),
        });
    }

    #[tokio::test]
    async fn model_load_marks_tree_readiness() {
        let (_map, ctx, mut layer) = setup();
        layer.initialize();

        loaded(&mut layer);

        assert!(ctx.store.tree_model_ready());
    }

    #[tokio::test]
    async fn trees_follow_their_own_anchor_layer() {
        let (map, _ctx, mut layer) = setup();
        layer.initialize();
        map.script_rendered_features(
            TREE_ANCHORS,
            vec![
                RenderedFeature::point(23.3190, 42.6860),
                RenderedFeature::point(23.3192, 42.6862),
            ],
        );
        loaded(&mut layer);

        layer.on_map_event(&MapEvent::ZoomEnd);

        assert_eq!(map.placed_count(TREE_MODEL_ID), 2);
        assert_eq!(map.placements(TREE_MODEL_ID)[0].scale, TREE_SCALE);
    }

    #[tokio::test]
    async fn tree_updates_leave_placed_cars_alone() {
        let (map, ctx, mut layer) = setup();
        layer.initialize();
        ctx.overlay.place(
            CAR_MODEL_ID,
            Placement {
                lng: 23.3181,
                lat: 42.6852,
                altitude: 0.0,
                scale: 0.025,
                rotation_z_deg: -117.0,
            },
        );
        map.script_rendered_features(TREE_ANCHORS, vec![RenderedFeature::point(23.3190, 42.6860)]);
        loaded(&mut layer);

        layer.on_map_event(&MapEvent::MoveEnd);

        assert_eq!(map.placed_count(TREE_MODEL_ID), 1);
        assert_eq!(map.placed_count(CAR_MODEL_ID), 1);
    }

    #[tokio::test]
    async fn occupancy_changes_do_not_touch_trees() {
        let (map, _ctx, mut layer) = setup();
        layer.initialize();
        map.script_rendered_features(TREE_ANCHORS, vec![RenderedFeature::point(23.3190, 42.6860)]);
        loaded(&mut layer);
        layer.on_map_event(&MapEvent::MoveEnd);
        let ops_before = map.ops().len();

        layer.on_store_event(StoreEvent::OccupancyChanged);

        assert_eq!(map.ops().len(), ops_before);
    }

    #[tokio::test]
    async fn teardown_clears_trees_and_removes_the_layer() {
        let (map, _ctx, mut layer) = setup();
        layer.initialize();
        map.script_rendered_features(TREE_ANCHORS, vec![RenderedFeature::point(23.3190, 42.6860)]);
        loaded(&mut layer);
        layer.on_map_event(&MapEvent::MoveEnd);

        layer.teardown();

        assert_eq!(map.placed_count(TREE_MODEL_ID), 0);
        assert!(!map.has_layer(TREE_LAYER_ID));
    }
}
