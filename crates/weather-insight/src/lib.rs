pub mod anomaly;
pub mod charts;
pub mod config;
pub mod error;
pub mod insight;
pub mod model;
pub mod providers;
pub mod render;
pub mod service;
pub mod session;
pub mod snapshot;
