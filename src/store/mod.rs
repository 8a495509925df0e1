//! Shared viewer state and change notification.
//!
//! One `MapStore` is the single source of truth for everything the layers
//! and the shell render from. Mutations go through typed setters that bump a
//! version counter and broadcast a `StoreEvent`; observers re-read current
//! state on notification, so a lagged receiver only means skipped wakeups.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;

use crate::models::{MapMode, SensorRecord, SlotPopup, UserLocationPoint};

/// Which part of the state a notification refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    MapReady,
    CarModelReady,
    TreeModelReady,
    ModeChanged,
    PitchChanged,
    UserLocationChanged,
    LoadingChanged,
    SelectionChanged,
    PopupChanged,
    GuideChanged,
    OccupancyChanged,
}

/// Snapshot of every field the layers and the shell render from.
#[derive(Debug, Clone)]
pub struct MapState {
    pub map_ready: bool,
    pub car_model_ready: bool,
    pub tree_model_ready: bool,
    pub mode: MapMode,
    pub pitch: f64,
    pub user_location: Option<UserLocationPoint>,
    pub loading: bool,
    pub selected_slot: Option<i64>,
    pub popup_visible: bool,
    pub guide_visible: bool,
    pub popup: Option<SlotPopup>,
    /// Ids of occupied slots, in wire order
    pub occupied: Vec<i64>,
    /// Latest full sensor payload
    pub sensor_records: Vec<SensorRecord>,
    pub version: u64,
}

impl MapState {
    fn new(initial_pitch: f64) -> Self {
        Self {
            map_ready: false,
            car_model_ready: false,
            tree_model_ready: false,
            mode: MapMode::default(),
            pitch: initial_pitch,
            user_location: None,
            loading: true,
            selected_slot: None,
            popup_visible: false,
            guide_visible: true,
            popup: None,
            occupied: Vec::new(),
            sensor_records: Vec::new(),
            version: 0,
        }
    }
}

pub struct MapStore {
    state: RwLock<MapState>,
    events_tx: broadcast::Sender<StoreEvent>,
}

impl MapStore {
    pub fn new(initial_pitch: f64) -> Self {
        // Capacity 64 - lagged observers re-read current state anyway
        let (events_tx, _) = broadcast::channel(64);
        Self {
            state: RwLock::new(MapState::new(initial_pitch)),
            events_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events_tx.subscribe()
    }

    fn read(&self) -> RwLockReadGuard<'_, MapState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MapState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn mutate(&self, event: StoreEvent, f: impl FnOnce(&mut MapState)) {
        {
            let mut state = self.write();
            f(&mut state);
            state.version += 1;
        }
        // Ignore send errors - they just mean no one is listening
        let _ = self.events_tx.send(event);
    }

    pub fn snapshot(&self) -> MapState {
        self.read().clone()
    }

    pub fn version(&self) -> u64 {
        self.read().version
    }

    pub fn set_map_ready(&self) {
        self.mutate(StoreEvent::MapReady, |s| s.map_ready = true);
    }

    pub fn map_ready(&self) -> bool {
        self.read().map_ready
    }

    pub fn set_car_model_ready(&self) {
        self.mutate(StoreEvent::CarModelReady, |s| s.car_model_ready = true);
    }

    pub fn car_model_ready(&self) -> bool {
        self.read().car_model_ready
    }

    pub fn set_tree_model_ready(&self) {
        self.mutate(StoreEvent::TreeModelReady, |s| s.tree_model_ready = true);
    }

    pub fn tree_model_ready(&self) -> bool {
        self.read().tree_model_ready
    }

    pub fn set_mode(&self, mode: MapMode) {
        self.mutate(StoreEvent::ModeChanged, |s| s.mode = mode);
    }

    pub fn mode(&self) -> MapMode {
        self.read().mode
    }

    pub fn set_pitch(&self, pitch: f64) {
        self.mutate(StoreEvent::PitchChanged, |s| s.pitch = pitch);
    }

    pub fn pitch(&self) -> f64 {
        self.read().pitch
    }

    pub fn set_user_location(&self, point: UserLocationPoint) {
        self.mutate(StoreEvent::UserLocationChanged, |s| {
            s.user_location = Some(point)
        });
    }

    pub fn user_location(&self) -> Option<UserLocationPoint> {
        self.read().user_location
    }

    pub fn set_loading(&self, loading: bool) {
        self.mutate(StoreEvent::LoadingChanged, |s| s.loading = loading);
    }

    pub fn loading(&self) -> bool {
        self.read().loading
    }

    pub fn set_guide_visible(&self, visible: bool) {
        self.mutate(StoreEvent::GuideChanged, |s| s.guide_visible = visible);
    }

    pub fn guide_visible(&self) -> bool {
        self.read().guide_visible
    }

    pub fn popup_visible(&self) -> bool {
        self.read().popup_visible
    }

    pub fn popup(&self) -> Option<SlotPopup> {
        self.read().popup.clone()
    }

    pub fn selected_slot(&self) -> Option<i64> {
        self.read().selected_slot
    }

    /// Replace the sensor payload and the occupancy set in one step.
    /// Observers see both change together under a single notification.
    pub fn set_parking_data(&self, records: Vec<SensorRecord>, occupied: Vec<i64>) {
        self.mutate(StoreEvent::OccupancyChanged, |s| {
            s.sensor_records = records;
            s.occupied = occupied;
        });
    }

    pub fn occupied(&self) -> Vec<i64> {
        self.read().occupied.clone()
    }

    pub fn sensor_records(&self) -> Vec<SensorRecord> {
        self.read().sensor_records.clone()
    }

    /// Select a slot and show its popup.
    pub fn open_popup(&self, slot_id: i64, popup: SlotPopup) {
        {
            let mut state = self.write();
            state.selected_slot = Some(slot_id);
            state.popup = Some(popup);
            state.popup_visible = true;
            state.version += 1;
        }
        let _ = self.events_tx.send(StoreEvent::SelectionChanged);
        let _ = self.events_tx.send(StoreEvent::PopupChanged);
    }

    /// Drop the selection and hide the popup.
    pub fn clear_selection(&self) {
        {
            let mut state = self.write();
            state.selected_slot = None;
            state.popup = None;
            state.popup_visible = false;
            state.version += 1;
        }
        let _ = self.events_tx.send(StoreEvent::SelectionChanged);
        let _ = self.events_tx.send(StoreEvent::PopupChanged);
    }
}
