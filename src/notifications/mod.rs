pub mod history;
pub mod models;
pub mod senders;
pub mod service;
