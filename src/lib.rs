pub mod admission;
pub mod config;
pub mod fake_feed;
pub mod http_client;
pub mod model;
pub mod normalize;
pub mod provider;
pub mod scheduler;
pub mod scoring;
pub mod store;
pub mod sync;
