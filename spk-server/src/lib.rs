//! spk-server library - SpoolKeeper filament inventory service
//!
//! Tracks 3D-printer filament spools per user, keeps sensor-tracked spools
//! in step with Home Assistant tray sensors, and maintains the material
//! reference catalog used to name what the sensors report.

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod catalog;
pub mod error;
pub mod persist;
pub mod reconcile;
pub mod store;
pub mod sync;

pub use error::{ApiError, ApiResult};

use catalog::MaterialCatalog;
use reconcile::TrayReconciler;
use store::InventoryStore;
use sync::SyncScheduler;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<InventoryStore>,
    pub catalog: Arc<MaterialCatalog>,
    pub reconciler: Arc<TrayReconciler>,
    pub scheduler: Arc<SyncScheduler>,
    /// Key required to register new users
    pub admin_key: Arc<str>,
}

impl AppState {
    pub fn new(
        store: Arc<InventoryStore>,
        catalog: Arc<MaterialCatalog>,
        reconciler: Arc<TrayReconciler>,
        scheduler: Arc<SyncScheduler>,
        admin_key: &str,
    ) -> Self {
        Self {
            store,
            catalog,
            reconciler,
            scheduler,
            admin_key: Arc::from(admin_key),
        }
    }
}

/// Build application router
///
/// Health, registration and catalog reads are public; everything else
/// requires a bearer API token.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post, put};

    // Protected routes (require authentication)
    let protected = Router::new()
        .route("/user/me", get(api::get_me))
        .route("/user/settings", put(api::update_settings))
        .route("/filaments", get(api::list_filaments))
        .route("/filaments/search/:code", get(api::search_filament))
        .route("/update", post(api::update_filament))
        .route("/delete", post(api::delete_filament))
        .route("/ams-config", get(api::list_ams_configs).post(api::add_ams_config))
        .route(
            "/ams-config/:id",
            put(api::update_ams_config).delete(api::delete_ams_config),
        )
        .route("/hass/webhook", post(api::hass_webhook))
        .route("/hass/sync", post(api::hass_sync))
        .route("/materials", post(api::add_custom_color))
        .route("/materials/update-ean", post(api::update_ean))
        .route("/materials/update-from-filament", post(api::update_from_filament))
        .route("/materials/add", post(api::add_material))
        .route("/materials/update", put(api::update_material))
        .route("/materials/delete", axum::routing::delete(api::delete_material))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    // Public routes (no authentication)
    let public = Router::new()
        .route("/register", post(api::register))
        .route("/materials/types", get(api::list_material_types))
        .route("/materials/all", get(api::list_all_materials))
        .route("/materials/:material_type/colors", get(api::list_colors))
        .route("/materials/:material_type/variations", get(api::list_variations))
        .route("/product-info/:ean", get(api::product_info))
        .merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
