pub mod config;
pub mod model;
pub mod observability;
pub mod refresher;
pub mod scheduler;
pub mod service;
pub mod snapshot;
pub mod sql;
pub mod timestamp;
pub mod tls;
pub mod tracker;
pub mod wire;
