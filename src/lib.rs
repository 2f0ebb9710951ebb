//! Local bridge between a Shopee shop and its owner's dashboard:
//! signed partner-API client, token lifecycle, sync orchestration into a
//! SQLite cache, and the REST surface the dashboard reads.

pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod model;
pub mod shopee;
pub mod sync;
pub mod tokens;
