pub mod auth_routes;
pub mod config_routes;
pub mod monitor_routes;
pub mod notification_routes;
