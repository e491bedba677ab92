pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod loader;
pub mod output;
pub mod provenance;
pub mod store;
