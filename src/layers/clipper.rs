//! Clip region that carves basemap symbols and models out of the lot area.
//!
//! The polygon covers the whole viewport with a hole traced around the
//! parking lot, so stock 3D buildings and labels disappear inside the lot
//! while the custom scene renders there instead.

use serde_json::{json, Value};

use super::{EventOutcome, LayerContext, MapLayer};
use crate::platform::MapEvent;
use crate::store::StoreEvent;

pub const CLIPPER_SOURCE_ID: &str = "clipper-src";
pub const CLIPPER_LAYER_ID: &str = "clipper-lyr";

/// Outer ring covers the surrounding district; the inner ring traces the
/// lot perimeter so it reads as a hole.
fn clip_polygon() -> Value {
    json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {},
            "geometry": {
                "type": "Polygon",
                "coordinates": [
                    [
                        [23.24838, 42.729608],
                        [23.24775, 42.644969],
                        [23.383875, 42.643832],
                        [23.383875, 42.730735],
                        [23.24838, 42.729608]
                    ],
                    [
                        [23.31526566193912, 42.68734758583128],
                        [23.316268356222757, 42.68654514098219],
                        [23.31567122778579, 42.68612423794613],
                        [23.316177800454035, 42.68571107944223],
                        [23.31674285272723, 42.68531634411053],
                        [23.317011790039633, 42.68517638954025],
                        [23.31735, 42.685335],
                        [23.317799, 42.685271],
                        [23.317661, 42.684748],
                        [23.318006, 42.684723],
                        [23.318214, 42.684189],
                        [23.318456, 42.684068],
                        [23.320063, 42.683909],
                        [23.320539, 42.686641],
                        [23.320703, 42.687702],
                        [23.316269, 42.688541],
                        [23.315984, 42.687854],
                        [23.31526566193912, 42.68734758583128]
                    ]
                ]
            }
        }]
    })
}

pub struct ClipperLayer {
    ctx: LayerContext,
}

impl ClipperLayer {
    pub fn new(ctx: LayerContext) -> Self {
        Self { ctx }
    }
}

impl MapLayer for ClipperLayer {
    fn name(&self) -> &'static str {
        "clipper"
    }

    fn initialize(&mut self) {
        self.ctx.renderer.add_source(
            CLIPPER_SOURCE_ID,
            json!({
                "type": "geojson",
                "data": clip_polygon()
            }),
        );
        self.ctx.renderer.add_layer(json!({
            "id": CLIPPER_LAYER_ID,
            "type": "clip",
            "source": CLIPPER_SOURCE_ID,
            "layout": {
                "clip-layer-types": ["symbol", "model"]
            },
            "maxzoom": 21
        }));
    }

    fn on_store_event(&mut self, _event: StoreEvent) {}

    fn on_map_event(&mut self, _event: &MapEvent) -> EventOutcome {
        EventOutcome::Ignored
    }
}
