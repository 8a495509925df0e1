//! Camera buttons and the locate action.
//!
//! Zoom and pitch act on the renderer and store directly. Locating starts
//! a continuous position watch whose fixes land in the store; every call
//! starts another watch, and all of them run until
//! [`NavigationControls::stop_watches`].

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::models::UserLocationPoint;
use crate::platform::{
    GeoErrorKind, GeoWatch, GeoWatchHandle, GeoWatchOptions, Geolocator, MapRenderer, Notifier,
};
use crate::store::MapStore;

pub const ZOOM_STEP: f64 = 0.5;

pub const ALERT_UNSUPPORTED: &str = "Geolocation is not supported by your browser.";
pub const ALERT_PERMISSION_DENIED: &str =
    "Permission denied. Please enable location access in your browser settings and refresh the map!";
pub const ALERT_UNAVAILABLE: &str = "Location information is unavailable.";
pub const ALERT_TIMEOUT: &str = "The request to get location timed out.";
pub const ALERT_UNKNOWN: &str = "An unknown error occurred.";

fn alert_for(kind: GeoErrorKind) -> &'static str {
    match kind {
        GeoErrorKind::PermissionDenied => ALERT_PERMISSION_DENIED,
        GeoErrorKind::PositionUnavailable => ALERT_UNAVAILABLE,
        GeoErrorKind::Timeout => ALERT_TIMEOUT,
        GeoErrorKind::Unknown => ALERT_UNKNOWN,
    }
}

pub struct NavigationControls {
    renderer: Arc<dyn MapRenderer>,
    store: Arc<MapStore>,
    geolocator: Arc<dyn Geolocator>,
    notifier: Arc<dyn Notifier>,
    default_pitch: f64,
    watches: Vec<(GeoWatchHandle, JoinHandle<()>)>,
}

impl NavigationControls {
    pub fn new(
        renderer: Arc<dyn MapRenderer>,
        store: Arc<MapStore>,
        geolocator: Arc<dyn Geolocator>,
        notifier: Arc<dyn Notifier>,
        default_pitch: f64,
    ) -> Self {
        Self {
            renderer,
            store,
            geolocator,
            notifier,
            default_pitch,
            watches: Vec::new(),
        }
    }

    pub fn zoom_in(&self) {
        self.renderer.set_zoom(self.renderer.zoom() + ZOOM_STEP);
    }

    pub fn zoom_out(&self) {
        self.renderer.set_zoom(self.renderer.zoom() - ZOOM_STEP);
    }

    /// Switches between the flat top-down view and the default 3D pitch.
    pub fn toggle_pitch(&self) {
        if self.store.pitch() == 0.0 {
            self.store.set_pitch(self.default_pitch);
        } else {
            self.store.set_pitch(0.0);
        }
    }

    /// Starts a position watch and feeds its fixes into the store.
    pub fn locate(&mut self) {
        self.store.set_loading(true);
        if !self.geolocator.supported() {
            self.notifier.alert(ALERT_UNSUPPORTED);
            return;
        }

        let GeoWatch {
            mut updates,
            handle,
        } = self.geolocator.watch(GeoWatchOptions {
            high_accuracy: true,
            maximum_age_ms: 10_000,
        });

        let store = self.store.clone();
        let notifier = self.notifier.clone();
        let task = tokio::spawn(async move {
            // The watch survives individual errors; only a dropped sender
            // ends it.
            while let Some(update) = updates.recv().await {
                match update {
                    Ok(position) => {
                        store.set_user_location(UserLocationPoint {
                            lng: position.lng,
                            lat: position.lat,
                        });
                        store.set_loading(false);
                    }
                    Err(error) => {
                        warn!(kind = ?error.kind, error = %error.message, "Geolocation error");
                        notifier.alert(alert_for(error.kind));
                        store.set_loading(false);
                    }
                }
            }
        });
        self.watches.push((handle, task));
    }

    /// Stops every watch started by [`NavigationControls::locate`].
    pub fn stop_watches(&mut self) {
        for (handle, task) in self.watches.drain(..) {
            handle.stop();
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::time;

    use crate::platform::headless::{
        test_options, HeadlessGeolocator, HeadlessMap, HeadlessNotifier,
    };
    use crate::platform::{GeoError, GeoPosition};

    fn controls(geolocator: Arc<HeadlessGeolocator>) -> (NavigationControls, Fixture) {
        let (map, _events) = HeadlessMap::new(test_options());
        let store = Arc::new(MapStore::new(62.0));
        let notifier = Arc::new(HeadlessNotifier::new());
        let controls = NavigationControls::new(
            map.clone(),
            store.clone(),
            geolocator.clone(),
            notifier.clone(),
            62.0,
        );
        (
            controls,
            Fixture {
                map,
                store,
                geolocator,
                notifier,
            },
        )
    }

    struct Fixture {
        map: Arc<HeadlessMap>,
        store: Arc<MapStore>,
        geolocator: Arc<HeadlessGeolocator>,
        notifier: Arc<HeadlessNotifier>,
    }

    #[tokio::test]
    async fn zoom_buttons_step_the_camera_by_half_a_level() {
        let (controls, fx) = controls(Arc::new(HeadlessGeolocator::new()));

        controls.zoom_in();
        controls.zoom_in();
        controls.zoom_out();

        assert_eq!(fx.map.zoom(), 18.0);
    }

    #[tokio::test]
    async fn pitch_toggle_flattens_and_restores_the_view() {
        let (controls, fx) = controls(Arc::new(HeadlessGeolocator::new()));
        assert_eq!(fx.store.pitch(), 62.0);

        controls.toggle_pitch();
        assert_eq!(fx.store.pitch(), 0.0);

        controls.toggle_pitch();
        assert_eq!(fx.store.pitch(), 62.0);
    }

    #[tokio::test]
    async fn located_fix_lands_in_the_store_and_clears_loading() {
        let locator = Arc::new(HeadlessGeolocator::with_fix(GeoPosition {
            lng: 23.3195,
            lat: 42.6857,
        }));
        let (mut controls, fx) = controls(locator);

        controls.locate();
        time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            fx.store.user_location(),
            Some(UserLocationPoint {
                lng: 23.3195,
                lat: 42.6857,
            })
        );
        assert!(!fx.store.loading());
        assert_eq!(fx.geolocator.watches_started(), 1);
    }

    #[tokio::test]
    async fn watches_request_high_accuracy_and_allow_cached_fixes() {
        let locator = Arc::new(HeadlessGeolocator::new());
        let (mut controls, fx) = controls(locator);

        controls.locate();

        let options = fx.geolocator.last_options().unwrap();
        assert!(options.high_accuracy);
        assert_eq!(options.maximum_age_ms, 10_000);
    }

    #[tokio::test]
    async fn unsupported_platform_alerts_and_leaves_loading_set() {
        let (mut controls, fx) = controls(Arc::new(HeadlessGeolocator::unsupported()));

        controls.locate();
        time::sleep(Duration::from_millis(50)).await;

        assert_eq!(fx.notifier.alerts(), vec![ALERT_UNSUPPORTED.to_string()]);
        assert!(fx.store.loading());
        assert_eq!(fx.geolocator.watches_started(), 0);
    }

    #[tokio::test]
    async fn every_error_kind_has_its_own_alert() {
        let locator = Arc::new(HeadlessGeolocator::new());
        for kind in [
            GeoErrorKind::PermissionDenied,
            GeoErrorKind::PositionUnavailable,
            GeoErrorKind::Timeout,
            GeoErrorKind::Unknown,
        ] {
            locator.push_update(Err(GeoError {
                kind,
                message: "scripted".to_string(),
            }));
        }
        let (mut controls, fx) = controls(locator);

        controls.locate();
        time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            fx.notifier.alerts(),
            vec![
                ALERT_PERMISSION_DENIED.to_string(),
                ALERT_UNAVAILABLE.to_string(),
                ALERT_TIMEOUT.to_string(),
                ALERT_UNKNOWN.to_string(),
            ]
        );
        assert!(!fx.store.loading());
        // Errors never trigger an automatic retry
        assert_eq!(fx.geolocator.watches_started(), 1);
    }

    #[tokio::test]
    async fn a_fix_after_an_error_still_lands() {
        let locator = Arc::new(HeadlessGeolocator::new());
        locator.push_update(Err(GeoError {
            kind: GeoErrorKind::Timeout,
            message: "scripted".to_string(),
        }));
        locator.push_update(Ok(GeoPosition {
            lng: 23.3181,
            lat: 42.6852,
        }));
        let (mut controls, fx) = controls(locator);

        controls.locate();
        time::sleep(Duration::from_millis(50)).await;

        assert_eq!(fx.notifier.alerts(), vec![ALERT_TIMEOUT.to_string()]);
        assert!(fx.store.user_location().is_some());
    }

    #[tokio::test]
    async fn repeated_locates_accumulate_watches_until_stopped() {
        let locator = Arc::new(HeadlessGeolocator::with_fix(GeoPosition {
            lng: 23.3195,
            lat: 42.6857,
        }));
        let (mut controls, fx) = controls(locator);

        controls.locate();
        controls.locate();
        assert_eq!(fx.geolocator.watches_started(), 2);
        assert_eq!(fx.geolocator.watches_stopped(), 0);

        controls.stop_watches();
        assert_eq!(fx.geolocator.watches_stopped(), 2);
    }
}
