pub mod auth;
pub mod bot;
pub mod config;
pub mod error;
pub mod keys;
pub mod menu;
pub mod outline;
pub mod reply;
pub mod telemetry;
