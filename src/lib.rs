pub mod builder;
pub mod cache_store;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod http_client;
pub mod normalize;
pub mod query;
pub mod retry;
pub mod roster;
pub mod upstream;
