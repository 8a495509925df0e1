//! Map viewer assembling layers, controls and the event loop.
//!
//! The viewer owns every layer and runs a single cooperative loop over map
//! events, store events and shell commands. Layers never talk to each
//! other; everything flows through the store and comes back as events.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::config::SceneConfig;
use crate::controls::NavigationControls;
use crate::layers::{
    cars::CarLayer, clipper::ClipperLayer, geolocation::GeolocationLayer, parking::ParkingLayer,
    trees::TreeLayer, EventOutcome, LayerContext, MapLayer, CLICKED_LOT_AREA, CLICKED_LOT_LINE,
};
use crate::platform::{
    Geolocator, MapEvent, MapEventReceiver, MapRenderer, ModelOverlay, Notifier,
};
use crate::providers::daylight::DaylightClient;
use crate::store::{MapStore, StoreEvent};
use crate::ui::UiCommand;

pub struct MapViewer {
    renderer: Arc<dyn MapRenderer>,
    overlay: Arc<dyn ModelOverlay>,
    store: Arc<MapStore>,
    daylight: Option<DaylightClient>,
    controls: NavigationControls,
    scene: SceneConfig,
    layers: Vec<Box<dyn MapLayer>>,
}

impl MapViewer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        renderer: Arc<dyn MapRenderer>,
        overlay: Arc<dyn ModelOverlay>,
        geolocator: Arc<dyn Geolocator>,
        notifier: Arc<dyn Notifier>,
        store: Arc<MapStore>,
        daylight: Option<DaylightClient>,
        scene: SceneConfig,
        default_pitch: f64,
    ) -> Self {
        let controls = NavigationControls::new(
            renderer.clone(),
            store.clone(),
            geolocator,
            notifier,
            default_pitch,
        );
        Self {
            renderer,
            overlay,
            store,
            daylight,
            controls,
            scene,
            layers: Vec::new(),
        }
    }

    /// Drives the viewer until the map event channel closes or `shutdown`
    /// resolves, then tears everything down.
    pub async fn run(
        mut self,
        mut map_events: MapEventReceiver,
        mut commands: mpsc::UnboundedReceiver<UiCommand>,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut store_events = self.store.subscribe();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                event = map_events.recv() => {
                    match event {
                        Some(event) => self.handle_map_event(event).await,
                        None => break,
                    }
                }
                event = store_events.recv() => {
                    match event {
                        Ok(event) => self.handle_store_event(event),
                        Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
                command = commands.recv() => {
                    match command {
                        Some(command) => self.handle_ui_command(command),
                        None => break,
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutting down the viewer");
                    break;
                }
            }
        }

        self.teardown();
    }

    pub async fn handle_map_event(&mut self, event: MapEvent) {
        match &event {
            MapEvent::Load => self.on_load().await,
            MapEvent::Click(_) => self.on_click(&event),
            _ => {
                for layer in &mut self.layers {
                    layer.on_map_event(&event);
                }
            }
        }
    }

    pub fn handle_store_event(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::ModeChanged => {
                let mode = self.store.mode();
                self.renderer
                    .set_config_property("basemap", "lightPreset", json!(mode.as_str()));
            }
            StoreEvent::PitchChanged => {
                self.renderer.ease_to(self.store.pitch(), 500);
            }
            StoreEvent::PopupChanged => {
                self.store.set_guide_visible(!self.store.popup_visible());
            }
            _ => {}
        }
        for layer in &mut self.layers {
            layer.on_store_event(event);
        }
    }

    pub fn handle_ui_command(&mut self, command: UiCommand) {
        match command {
            UiCommand::ZoomIn => self.controls.zoom_in(),
            UiCommand::ZoomOut => self.controls.zoom_out(),
            UiCommand::TogglePitch => self.controls.toggle_pitch(),
            UiCommand::Locate => self.controls.locate(),
            UiCommand::ClosePopup => self.close_popup(),
        }
    }

    async fn on_load(&mut self) {
        if let Some(daylight) = &self.daylight {
            match daylight.resolve_period(Utc::now().timestamp()).await {
                Ok(mode) => self.store.set_mode(mode),
                Err(error) => {
                    warn!(error = %error, "Light period lookup failed, keeping the default preset");
                }
            }
        }
        self.store.set_map_ready();
        self.mount_layers();
    }

    fn mount_layers(&mut self) {
        if !self.layers.is_empty() {
            return;
        }

        let ctx = LayerContext {
            renderer: self.renderer.clone(),
            overlay: self.overlay.clone(),
            store: self.store.clone(),
        };

        let mut layers: Vec<Box<dyn MapLayer>> = Vec::new();
        layers.push(Box::new(CarLayer::new(
            ctx.clone(),
            self.scene.car_model_url.clone(),
        )));
        if let Some(url) = &self.scene.tree_model_url {
            layers.push(Box::new(TreeLayer::new(ctx.clone(), url.clone())));
        }
        layers.push(Box::new(ClipperLayer::new(ctx.clone())));
        layers.push(Box::new(ParkingLayer::new(ctx.clone())));
        layers.push(Box::new(GeolocationLayer::new(ctx)));

        for layer in &mut layers {
            debug!(layer = layer.name(), "Mounting layer");
            layer.initialize();
        }
        self.layers = layers;
        info!(layers = self.layers.len(), "Map is ready");
    }

    /// Clicks reach layers in mount order until one consumes the event;
    /// an unconsumed click closes whatever popup is open.
    fn on_click(&mut self, event: &MapEvent) {
        if !self.store.map_ready() {
            return;
        }
        for layer in &mut self.layers {
            if layer.on_map_event(event) == EventOutcome::Consumed {
                return;
            }
        }
        self.close_popup();
    }

    fn close_popup(&mut self) {
        // The click filters stay in place; hiding the layers is enough.
        self.renderer
            .set_layout_property(CLICKED_LOT_AREA, "visibility", json!("none"));
        self.renderer
            .set_layout_property(CLICKED_LOT_LINE, "visibility", json!("none"));
        self.store.clear_selection();
    }

    fn teardown(&mut self) {
        for layer in &mut self.layers {
            debug!(layer = layer.name(), "Tearing down layer");
            layer.teardown();
        }
        self.layers.clear();
        self.controls.stop_watches();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::time;

    use crate::config::DaylightConfig;
    use crate::layers::cars::{CAR_LAYER_ID, CAR_MODEL_ID};
    use crate::layers::clipper::CLIPPER_LAYER_ID;
    use crate::layers::geolocation::GEOLOCATION_LAYER_ID;
    use crate::layers::trees::TREE_LAYER_ID;
    use crate::layers::ACTIVE_LOTS;
    use crate::models::{MapMode, SensorRecord, SlotStatus};
    use crate::platform::headless::{
        test_options, HeadlessGeolocator, HeadlessMap, HeadlessNotifier, RecordedOp,
    };
    use crate::platform::{ClickEvent, GeoPosition, RenderedFeature};

    struct Fixture {
        map: Arc<HeadlessMap>,
        events: MapEventReceiver,
        store: Arc<MapStore>,
        geolocator: Arc<HeadlessGeolocator>,
    }

    fn scene() -> SceneConfig {
        SceneConfig {
            car_model_url: "https://assets.example.com/car.glb".to_string(),
            tree_model_url: None,
        }
    }

    fn viewer_with(
        geolocator: Arc<HeadlessGeolocator>,
        daylight: Option<DaylightClient>,
        scene: SceneConfig,
    ) -> (MapViewer, Fixture) {
        let (map, events) = HeadlessMap::new(test_options());
        let store = Arc::new(MapStore::new(62.0));
        let notifier = Arc::new(HeadlessNotifier::new());
        let viewer = MapViewer::new(
            map.clone(),
            map.clone(),
            geolocator.clone(),
            notifier,
            store.clone(),
            daylight,
            scene,
            62.0,
        );
        (
            viewer,
            Fixture {
                map,
                events,
                store,
                geolocator,
            },
        )
    }

    fn viewer() -> (MapViewer, Fixture) {
        viewer_with(Arc::new(HeadlessGeolocator::new()), None, scene())
    }

    /// Feeds queued map events back into the viewer, as the run loop would.
    async fn drain(viewer: &mut MapViewer, fx: &mut Fixture) {
        while let Ok(event) = fx.events.try_recv() {
            viewer.handle_map_event(event).await;
        }
    }

    fn busy(sensor_id: i64) -> SensorRecord {
        SensorRecord {
            sensor_id,
            status: SlotStatus::Busy,
            last_status_timestamp: Some("2025-06-01T10:00:00".to_string()),
            car_registration_numbers: vec!["CB1234AB".to_string()],
        }
    }

    fn lot_click(slot_id: i64) -> MapEvent {
        MapEvent::Click(ClickEvent {
            layer: Some(ACTIVE_LOTS.to_string()),
            feature: Some(RenderedFeature::polygon().with_property("SLOT_DB_ID", json!(slot_id))),
        })
    }

    #[tokio::test]
    async fn load_marks_ready_and_mounts_every_layer() {
        let (mut viewer, fx) = viewer();

        viewer.handle_map_event(MapEvent::Load).await;

        assert!(fx.store.map_ready());
        assert!(fx.map.has_layer(CAR_LAYER_ID));
        assert!(fx.map.has_layer(CLIPPER_LAYER_ID));
        assert!(fx.map.has_layer(GEOLOCATION_LAYER_ID));
        assert!(!fx.map.has_layer(TREE_LAYER_ID));
    }

    #[tokio::test]
    async fn tree_layer_mounts_only_with_a_model_url() {
        let mut scene = scene();
        scene.tree_model_url = Some("https://assets.example.com/tree.gltf".to_string());
        let (mut viewer, fx) = viewer_with(Arc::new(HeadlessGeolocator::new()), None, scene);

        viewer.handle_map_event(MapEvent::Load).await;

        assert!(fx.map.has_layer(TREE_LAYER_ID));
    }

    #[tokio::test]
    async fn a_second_load_does_not_mount_layers_twice() {
        let (mut viewer, mut fx) = viewer();
        viewer.handle_map_event(MapEvent::Load).await;
        drain(&mut viewer, &mut fx).await;
        let ops_before = fx.map.ops().len();

        viewer.handle_map_event(MapEvent::Load).await;

        assert_eq!(fx.map.ops().len(), ops_before);
    }

    #[tokio::test]
    async fn unreachable_daylight_api_still_readies_the_map() {
        let daylight = DaylightClient::new(DaylightConfig {
            url: "http://127.0.0.1:9/json".to_string(),
            lat: 42.6852,
            lng: 23.3181,
        })
        .unwrap();
        let (mut viewer, fx) =
            viewer_with(Arc::new(HeadlessGeolocator::new()), Some(daylight), scene());

        viewer.handle_map_event(MapEvent::Load).await;

        assert!(fx.store.map_ready());
        assert_eq!(fx.store.mode(), MapMode::Day);
    }

    #[tokio::test]
    async fn mode_changes_retint_the_basemap() {
        let (mut viewer, fx) = viewer();
        viewer.handle_map_event(MapEvent::Load).await;

        fx.store.set_mode(MapMode::Night);
        viewer.handle_store_event(StoreEvent::ModeChanged);

        assert!(fx.map.ops().iter().any(|op| matches!(
            op,
            RecordedOp::SetConfigProperty { scope, name, value }
                if scope == "basemap" && name == "lightPreset" && value == &json!("night")
        )));
    }

    #[tokio::test]
    async fn pitch_changes_ease_the_camera_over_half_a_second() {
        let (mut viewer, fx) = viewer();
        viewer.handle_map_event(MapEvent::Load).await;

        fx.store.set_pitch(0.0);
        viewer.handle_store_event(StoreEvent::PitchChanged);

        assert!(fx.map.ops().iter().any(|op| matches!(
            op,
            RecordedOp::EaseTo { pitch, duration_ms } if *pitch == 0.0 && *duration_ms == 500
        )));
    }

    #[tokio::test]
    async fn guide_tip_mirrors_popup_visibility() {
        let (mut viewer, mut fx) = viewer();
        viewer.handle_map_event(MapEvent::Load).await;
        drain(&mut viewer, &mut fx).await;
        fx.store.set_parking_data(vec![busy(5)], vec![5]);
        viewer.handle_store_event(StoreEvent::OccupancyChanged);

        viewer.handle_map_event(lot_click(5)).await;
        viewer.handle_store_event(StoreEvent::PopupChanged);
        assert!(!fx.store.guide_visible());

        viewer.handle_ui_command(UiCommand::ClosePopup);
        viewer.handle_store_event(StoreEvent::PopupChanged);
        assert!(fx.store.guide_visible());
    }

    #[tokio::test]
    async fn clicking_an_occupied_lot_opens_its_popup() {
        let (mut viewer, mut fx) = viewer();
        viewer.handle_map_event(MapEvent::Load).await;
        drain(&mut viewer, &mut fx).await;
        fx.store.set_parking_data(vec![busy(5)], vec![5]);
        viewer.handle_store_event(StoreEvent::OccupancyChanged);

        viewer.handle_map_event(lot_click(5)).await;

        assert!(fx.store.popup_visible());
        assert_eq!(fx.store.selected_slot(), Some(5));
        let popup = fx.store.popup().unwrap();
        assert!(!popup.available);
        assert!(popup.elapsed.is_some());
    }

    #[tokio::test]
    async fn a_click_away_closes_the_popup_and_hides_the_highlight() {
        let (mut viewer, mut fx) = viewer();
        viewer.handle_map_event(MapEvent::Load).await;
        drain(&mut viewer, &mut fx).await;
        fx.store.set_parking_data(vec![busy(5)], vec![5]);
        viewer.handle_store_event(StoreEvent::OccupancyChanged);
        viewer.handle_map_event(lot_click(5)).await;
        assert!(fx.store.popup_visible());

        viewer
            .handle_map_event(MapEvent::Click(ClickEvent::default()))
            .await;

        assert!(!fx.store.popup_visible());
        assert_eq!(fx.store.selected_slot(), None);
        let hides = fx
            .map
            .ops()
            .iter()
            .filter(|op| {
                matches!(
                    op,
                    RecordedOp::SetLayoutProperty { layer_id, name, value }
                        if (layer_id == CLICKED_LOT_AREA || layer_id == CLICKED_LOT_LINE)
                            && name == "visibility"
                            && value == &json!("none")
                )
            })
            .count();
        assert!(hides >= 2);
    }

    #[tokio::test]
    async fn clicks_before_load_are_dropped() {
        let (mut viewer, fx) = viewer();

        viewer
            .handle_map_event(MapEvent::Click(ClickEvent::default()))
            .await;

        assert!(fx.map.ops().is_empty());
        assert_eq!(fx.store.selected_slot(), None);
    }

    #[tokio::test]
    async fn occupancy_flows_from_the_store_to_cars_and_paint() {
        let (mut viewer, mut fx) = viewer();
        fx.map.script_rendered_features(
            crate::layers::ANCHORS,
            vec![RenderedFeature::point(23.3181, 42.6852)],
        );
        viewer.handle_map_event(MapEvent::Load).await;
        drain(&mut viewer, &mut fx).await;
        time::sleep(Duration::from_millis(450)).await;
        drain(&mut viewer, &mut fx).await;

        fx.store.set_parking_data(vec![busy(5)], vec![5]);
        viewer.handle_store_event(StoreEvent::OccupancyChanged);
        drain(&mut viewer, &mut fx).await;

        assert!(fx.map.placed_count(CAR_MODEL_ID) > 0);
        assert!(fx.map.ops().iter().any(|op| matches!(
            op,
            RecordedOp::SetPaintProperty { layer_id, name, .. }
                if layer_id == ACTIVE_LOTS && name == "fill-color"
        )));
    }

    #[tokio::test]
    async fn ui_commands_reach_camera_and_geolocation() {
        let locator = Arc::new(HeadlessGeolocator::with_fix(GeoPosition {
            lng: 23.3195,
            lat: 42.6857,
        }));
        let (mut viewer, fx) = viewer_with(locator, None, scene());
        viewer.handle_map_event(MapEvent::Load).await;

        viewer.handle_ui_command(UiCommand::ZoomIn);
        assert_eq!(fx.map.zoom(), 18.0);

        viewer.handle_ui_command(UiCommand::TogglePitch);
        assert_eq!(fx.store.pitch(), 0.0);

        viewer.handle_ui_command(UiCommand::Locate);
        time::sleep(Duration::from_millis(50)).await;
        assert!(fx.store.user_location().is_some());
    }

    #[tokio::test]
    async fn run_processes_events_and_tears_down_on_shutdown() {
        let locator = Arc::new(HeadlessGeolocator::with_fix(GeoPosition {
            lng: 23.3195,
            lat: 42.6857,
        }));
        let (viewer, fx) = viewer_with(locator, None, scene());
        let Fixture {
            map,
            events,
            store,
            geolocator,
        } = fx;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let task = tokio::spawn(viewer.run(events, commands_rx, async move {
            let _ = shutdown_rx.await;
        }));

        map.push_event(MapEvent::Load);
        time::sleep(Duration::from_millis(50)).await;
        assert!(store.map_ready());

        commands_tx.send(UiCommand::Locate).unwrap();
        time::sleep(Duration::from_millis(50)).await;
        assert!(store.user_location().is_some());
        assert_eq!(geolocator.watches_started(), 1);

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();

        assert_eq!(geolocator.watches_stopped(), 1);
        assert!(!map.has_layer(CAR_LAYER_ID));
    }
}
