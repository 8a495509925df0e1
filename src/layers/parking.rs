//! Parking slot coloring, hover highlights and slot popups.

use serde_json::{json, Value};

use super::{
    EventOutcome, LayerContext, MapLayer, ACTIVE_LOTS, CLICKED_LOT_AREA, CLICKED_LOT_LINE,
    HOVERED_LOT, HOVERED_LOT_AREA,
};
use crate::models::{elapsed_since, SlotPopup};
use crate::platform::{MapEvent, RenderedFeature};
use crate::store::StoreEvent;

const OCCUPIED_COLOR: &str = "#D26870";
const HANDICAPPED_COLOR: &str = "#3DBEFF";
const DEFAULT_COLOR: &str = "#85DCB1";

/// Palette with no occupancy information.
pub fn base_fill_color() -> Value {
    json!([
        "case",
        ["==", ["get", "SLOT_TYPE"], "handicapped"],
        HANDICAPPED_COLOR,
        DEFAULT_COLOR
    ])
}

/// Palette with occupied slots painted over the base colors.
pub fn occupancy_fill_color(occupied: &[i64]) -> Value {
    json!([
        "case",
        ["in", ["get", "SLOT_DB_ID"], ["literal", occupied]],
        OCCUPIED_COLOR,
        ["==", ["get", "SLOT_TYPE"], "handicapped"],
        HANDICAPPED_COLOR,
        DEFAULT_COLOR
    ])
}

fn id_filter(slot_id: i64) -> Value {
    json!(["==", "SLOT_DB_ID", slot_id])
}

fn slot_id_of(feature: &RenderedFeature) -> Option<i64> {
    feature.properties.get("SLOT_DB_ID").and_then(Value::as_i64)
}

pub struct ParkingLayer {
    ctx: LayerContext,
    last_hovered: Option<i64>,
}

impl ParkingLayer {
    pub fn new(ctx: LayerContext) -> Self {
        Self {
            ctx,
            last_hovered: None,
        }
    }

    fn apply_occupancy(&self) {
        let mut occupied = self.ctx.store.occupied();
        occupied.sort_unstable();

        let expr = if occupied.is_empty() {
            base_fill_color()
        } else {
            occupancy_fill_color(&occupied)
        };
        self.ctx
            .renderer
            .set_paint_property(ACTIVE_LOTS, "fill-color", expr);
    }

    fn open_slot_popup(&self, feature: &RenderedFeature, slot_id: i64) {
        let renderer = &self.ctx.renderer;
        renderer.set_filter(CLICKED_LOT_AREA, id_filter(slot_id));
        renderer.set_filter(CLICKED_LOT_LINE, id_filter(slot_id));
        renderer.set_layout_property(CLICKED_LOT_AREA, "visibility", json!("visible"));
        renderer.set_layout_property(CLICKED_LOT_LINE, "visibility", json!("visible"));

        let record = self
            .ctx
            .store
            .sensor_records()
            .into_iter()
            .find(|record| record.sensor_id == slot_id);
        let available = !self.ctx.store.occupied().contains(&slot_id);
        let elapsed = record
            .as_ref()
            .and_then(|record| record.last_status_timestamp.as_deref())
            .and_then(elapsed_since);

        self.ctx.store.open_popup(
            slot_id,
            SlotPopup {
                available,
                slot: feature.properties.clone(),
                record,
                elapsed,
            },
        );
    }

    fn hover(&mut self, feature: &RenderedFeature) {
        let Some(slot_id) = slot_id_of(feature) else {
            return;
        };
        if self.last_hovered == Some(slot_id) {
            return;
        }
        self.last_hovered = Some(slot_id);

        let renderer = &self.ctx.renderer;
        renderer.set_layout_property(HOVERED_LOT, "visibility", json!("visible"));
        renderer.set_layout_property(HOVERED_LOT_AREA, "visibility", json!("visible"));
        renderer.set_filter(HOVERED_LOT, id_filter(slot_id));
        renderer.set_filter(HOVERED_LOT_AREA, id_filter(slot_id));
    }

    fn clear_hover(&mut self) {
        self.last_hovered = None;
        // The filters are left in place; hiding the layers is enough.
        let renderer = &self.ctx.renderer;
        renderer.set_layout_property(HOVERED_LOT, "visibility", json!("none"));
        renderer.set_layout_property(HOVERED_LOT_AREA, "visibility", json!("none"));
    }
}

impl MapLayer for ParkingLayer {
    fn name(&self) -> &'static str {
        "parking"
    }

    fn initialize(&mut self) {
        self.ctx
            .renderer
            .set_paint_property(ACTIVE_LOTS, "fill-color", base_fill_color());
        self.apply_occupancy();
    }

    fn on_store_event(&mut self, event: StoreEvent) {
        if event == StoreEvent::OccupancyChanged {
            self.apply_occupancy();
        }
    }

    fn on_map_event(&mut self, event: &MapEvent) -> EventOutcome {
        match event {
            MapEvent::Click(click) if click.layer.as_deref() == Some(ACTIVE_LOTS) => {
                // A click on the lot layer never falls through to the
                // map-wide click handling, feature or not.
                if let Some(feature) = click.feature.as_ref() {
                    if let Some(slot_id) = slot_id_of(feature) {
                        self.open_slot_popup(feature, slot_id);
                    }
                }
                EventOutcome::Consumed
            }
            MapEvent::MouseMove(pointer) if pointer.layer == ACTIVE_LOTS => {
                if let Some(feature) = &pointer.feature {
                    self.hover(feature);
                }
                EventOutcome::Ignored
            }
            MapEvent::MouseOut { layer } if layer == ACTIVE_LOTS => {
                self.clear_hover();
                EventOutcome::Ignored
            }
            _ => EventOutcome::Ignored,
        }
    }
}
