//! Pulsing location dot driven by the stored user position.
//!
//! The layer owns a dedicated GeoJSON source and a symbol layer pinned to
//! the map plane, so the dot tilts with the camera instead of floating
//! upright. The dot image itself is registered with the renderer; drawing
//! the pulse animation is the renderer's concern.

use serde_json::json;

use super::{EventOutcome, LayerContext, MapLayer};
use crate::platform::{ImageSpec, MapEvent};
use crate::store::StoreEvent;

pub const DOT_IMAGE_ID: &str = "pulsing-dot";
pub const GEOLOCATION_SOURCE_ID: &str = "geolocation-src";
pub const GEOLOCATION_LAYER_ID: &str = "geolocation-layer";

const DOT_SIZE: u32 = 150;
const DOT_PIXEL_RATIO: f64 = 2.0;

pub struct GeolocationLayer {
    ctx: LayerContext,
}

impl GeolocationLayer {
    pub fn new(ctx: LayerContext) -> Self {
        Self { ctx }
    }

    fn push_location(&self) {
        let Some(point) = self.ctx.store.user_location() else {
            return;
        };
        self.ctx.renderer.set_source_data(
            GEOLOCATION_SOURCE_ID,
            json!({
                "type": "FeatureCollection",
                "features": [point.to_feature()]
            }),
        );
    }
}

impl MapLayer for GeolocationLayer {
    fn name(&self) -> &'static str {
        "geolocation"
    }

    fn initialize(&mut self) {
        self.ctx.renderer.add_image(
            DOT_IMAGE_ID,
            ImageSpec {
                width: DOT_SIZE,
                height: DOT_SIZE,
                pixel_ratio: DOT_PIXEL_RATIO,
            },
        );
        self.ctx.renderer.add_source(
            GEOLOCATION_SOURCE_ID,
            json!({
                "type": "geojson",
                "data": { "type": "FeatureCollection", "features": [] }
            }),
        );
        self.ctx.renderer.add_layer(json!({
            "id": GEOLOCATION_LAYER_ID,
            "type": "symbol",
            "source": GEOLOCATION_SOURCE_ID,
            "layout": {
                "icon-allow-overlap": true,
                "icon-pitch-alignment": "map",
                "icon-rotation-alignment": "map",
                "icon-image": DOT_IMAGE_ID
            }
        }));
        // A position may already be known when the layer mounts.
        self.push_location();
    }

    fn on_store_event(&mut self, event: StoreEvent) {
        if event == StoreEvent::UserLocationChanged {
            self.push_location();
        }
    }

    fn on_map_event(&mut self, _event: &MapEvent) -> EventOutcome {
        EventOutcome::Ignored
    }
}
