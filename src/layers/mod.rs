//! Map layers.
//!
//! Every layer follows the same lifecycle: it is mounted once the map
//! reports ready, reacts to store changes and platform events while
//! mounted, and is torn down when the viewer shuts down.

pub mod cars;
pub mod clipper;
pub mod geolocation;
pub mod parking;
pub mod trees;

use std::sync::Arc;

use crate::platform::{MapEvent, MapRenderer, ModelOverlay};
use crate::store::{MapStore, StoreEvent};

// Style layer ids baked into the basemap style.
pub const ACTIVE_LOTS: &str = "ACTIVE_LOTS";
pub const HOVERED_LOT: &str = "HOVERED_LOT";
pub const HOVERED_LOT_AREA: &str = "HOVERED_LOT_AREA";
pub const CLICKED_LOT_AREA: &str = "CLICKED_LOT_AREA";
pub const CLICKED_LOT_LINE: &str = "CLICKED_LOT_LINE";
pub const ANCHORS: &str = "ANCHORS";
pub const TREE_ANCHORS: &str = "TREE_ANCHORS";

/// Shared handles a layer needs to do its work.
#[derive(Clone)]
pub struct LayerContext {
    pub renderer: Arc<dyn MapRenderer>,
    pub overlay: Arc<dyn ModelOverlay>,
    pub store: Arc<MapStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The layer handled the event; click dispatch stops here.
    Consumed,
    Ignored,
}

pub trait MapLayer: Send {
    fn name(&self) -> &'static str;

    fn initialize(&mut self);

    fn on_store_event(&mut self, _event: StoreEvent) {}

    fn on_map_event(&mut self, _event: &MapEvent) -> EventOutcome {
        EventOutcome::Ignored
    }

    fn teardown(&mut self) {}
}
