//! Anime catalog review API with per-identity daily review limits.

pub mod activity;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod counter;
pub mod error;
pub mod identity;
pub mod keyed_lock;
pub mod metrics;
pub mod protocol;
pub mod ratelimit;
pub mod review;
pub mod server;
pub mod sqlite;
pub mod store;
