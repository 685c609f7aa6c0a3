pub mod api;
pub mod auth;
pub mod channel;
pub mod config;
pub mod model;
pub mod protocol;
pub mod sync;
pub mod ui;
