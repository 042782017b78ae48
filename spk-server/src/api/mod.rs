//! HTTP API handlers for spk-server

pub mod ams;
pub mod auth;
pub mod filaments;
pub mod hass;
pub mod health;
pub mod materials;
pub mod users;

pub use ams::{add_ams_config, delete_ams_config, list_ams_configs, update_ams_config};
pub use auth::{auth_middleware, AuthUser};
pub use filaments::{delete_filament, list_filaments, search_filament, update_filament};
pub use hass::{hass_sync, hass_webhook};
pub use health::health_routes;
pub use materials::{
    add_custom_color, add_material, delete_material, list_all_materials, list_colors,
    list_material_types, list_variations, product_info, update_ean, update_from_filament,
    update_material,
};
pub use users::{get_me, register, update_settings};
