pub mod cli;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod index;
pub mod ingest;
pub mod interactive;
pub mod providers;
pub mod server;
pub mod store;
