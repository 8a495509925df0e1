//! View models for the page chrome around the map.
//!
//! Plain snapshots derived from the store, ready for whatever renders the
//! shell. The demo binary prints them; no business logic lives here.

use serde::Serialize;

use crate::models::SlotPopup;
use crate::store::MapStore;

pub const GUIDE_MESSAGE: &str = "Click on a spot for more information";

pub const AVAILABLE_COLOR: &str = "rgba(0, 255, 0, 0.5)";
pub const UNAVAILABLE_COLOR: &str = "rgba(255, 0, 0, 0.5)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LegendEntry {
    pub color: &'static str,
    pub label: &'static str,
}

pub fn legend_entries() -> [LegendEntry; 2] {
    [
        LegendEntry {
            color: AVAILABLE_COLOR,
            label: "Available",
        },
        LegendEntry {
            color: UNAVAILABLE_COLOR,
            label: "Unavailable",
        },
    ]
}

/// User actions arriving from the shell controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiCommand {
    ZoomIn,
    ZoomOut,
    TogglePitch,
    Locate,
    ClosePopup,
}

/// Info box contents for the selected slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoBoxView {
    pub available: bool,
    pub status_label: &'static str,
    pub hours: Option<String>,
    pub minutes: Option<String>,
    /// `None` drops the plate row entirely; an empty string renders it
    /// blank.
    pub license_plate: Option<String>,
}

impl InfoBoxView {
    pub fn from_popup(popup: &SlotPopup) -> Self {
        let license_plate = if popup.available {
            None
        } else {
            match &popup.record {
                Some(record) => match record.car_registration_numbers.first() {
                    Some(plate) => Some(plate.clone()),
                    None => Some("N/A".to_string()),
                },
                None => Some(String::new()),
            }
        };
        Self {
            available: popup.available,
            status_label: if popup.available {
                "Available"
            } else {
                "Occupied"
            },
            hours: popup.elapsed.as_ref().map(|e| e.hours.clone()),
            minutes: popup.elapsed.as_ref().map(|e| e.minutes.clone()),
            license_plate,
        }
    }
}

/// One frame of shell state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShellView {
    pub loading: bool,
    pub guide_visible: bool,
    pub guide_message: &'static str,
    pub legend: [LegendEntry; 2],
    pub info_box: Option<InfoBoxView>,
}

impl ShellView {
    pub fn from_store(store: &MapStore) -> Self {
        let info_box = if store.popup_visible() {
            store.popup().as_ref().map(InfoBoxView::from_popup)
        } else {
            None
        };
        Self {
            loading: store.loading(),
            guide_visible: store.guide_visible(),
            guide_message: GUIDE_MESSAGE,
            legend: legend_entries(),
            info_box,
        }
    }
}
