mod config;
mod controls;
mod layers;
mod models;
mod platform;
mod providers;
mod store;
mod sync;
mod ui;
mod viewer;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use layers::cars::CAR_MODEL_ID;
use layers::{ACTIVE_LOTS, ANCHORS, TREE_ANCHORS};
use platform::headless::{HeadlessGeolocator, HeadlessMap, HeadlessNotifier};
use platform::{ClickEvent, GeoPosition, MapEvent, MapOptions, ModelOverlay, RenderedFeature};
use providers::daylight::DaylightClient;
use store::MapStore;
use sync::FeedChannel;
use ui::{ShellView, UiCommand};
use viewer::MapViewer;

/// Anchor points around the lot center, standing in for the anchor tiles
/// a real basemap style would render.
fn seed_anchors(map: &HeadlessMap, layer_id: &str, center: (f64, f64), count: usize) {
    let features = (0..count)
        .map(|i| {
            let offset = 0.00012 * (i as f64 + 1.0);
            RenderedFeature::point(center.0 + offset, center.1 - offset / 2.0)
        })
        .collect();
    map.script_rendered_features(layer_id, features);
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,reqwest=warn".into()),
        )
        .init();

    // Load config
    let config = Config::load("config.yaml").expect("Failed to load config");
    tracing::info!(
        style = %config.map.style_url,
        stream = %config.stream.endpoint,
        "Loaded configuration"
    );

    let store = Arc::new(MapStore::new(config.map.pitch));

    // Headless seams standing in for a browser map, model engine,
    // geolocation and alert dialogs
    let (map, map_events) = HeadlessMap::new(MapOptions::from_config(&config.map));
    let geolocator = Arc::new(HeadlessGeolocator::with_fix(GeoPosition {
        lng: config.map.center.lng,
        lat: config.map.center.lat,
    }));
    let notifier = Arc::new(HeadlessNotifier::new());

    let center = (config.map.center.lng, config.map.center.lat);
    seed_anchors(&map, ANCHORS, center, 6);
    if config.scene.tree_model_url.is_some() {
        seed_anchors(&map, TREE_ANCHORS, center, 3);
    }

    let daylight = if config.daylight.url.is_empty() {
        tracing::warn!("Daylight API not configured, keeping the default light preset");
        None
    } else {
        Some(DaylightClient::new(config.daylight.clone()).expect("Failed to build daylight client"))
    };

    // Start the sensor feed in the background
    let feed = Arc::new(
        FeedChannel::new(config.stream.clone(), store.clone())
            .expect("Failed to build the feed client"),
    );
    let feed_task = tokio::spawn(feed.start());

    let viewer = MapViewer::new(
        map.clone(),
        map.clone(),
        geolocator,
        notifier,
        store.clone(),
        daylight,
        config.scene.clone(),
        config.map.pitch,
    );

    let (commands_tx, commands_rx) = mpsc::unbounded_channel();

    // A real map fires this once its style is ready
    map.push_event(MapEvent::Load);

    // Scripted user session, so the whole pipeline shows up in the log.
    // The script sends on a clone so the command channel stays open after
    // it finishes.
    let script_tx = commands_tx.clone();
    let script_map = map.clone();
    let script_store = store.clone();
    let script_task = tokio::spawn(async move {
        time::sleep(Duration::from_secs(2)).await;
        let _ = script_tx.send(UiCommand::ZoomIn);
        let _ = script_tx.send(UiCommand::TogglePitch);
        let _ = script_tx.send(UiCommand::TogglePitch);
        let _ = script_tx.send(UiCommand::Locate);

        // Give the feed a moment to deliver the first payload
        time::sleep(Duration::from_secs(3)).await;
        tracing::info!(
            cars = script_map.placed_count(CAR_MODEL_ID),
            occupied = script_store.occupied().len(),
            "Scene status"
        );

        if let Some(slot_id) = script_store.occupied().first().copied() {
            script_map.push_event(MapEvent::Click(ClickEvent {
                layer: Some(ACTIVE_LOTS.to_string()),
                feature: Some(
                    RenderedFeature::polygon().with_property("SLOT_DB_ID", slot_id.into()),
                ),
            }));
            time::sleep(Duration::from_millis(200)).await;
            if let Ok(json) = serde_json::to_string(&ShellView::from_store(&script_store)) {
                tracing::info!(shell = %json, "Shell after slot click");
            }
            let _ = script_tx.send(UiCommand::ClosePopup);
        } else if let Ok(json) = serde_json::to_string(&ShellView::from_store(&script_store)) {
            tracing::info!(shell = %json, "Shell state");
        }
    });

    tracing::info!("Viewer running, press Ctrl+C to stop");
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    viewer.run(map_events, commands_rx, shutdown).await;

    script_task.abort();
    feed_task.abort();
    tracing::info!("Viewer stopped");
}
