pub mod auth_service;
pub mod http_client;
