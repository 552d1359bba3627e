//! Academic calendar catalog pipeline: scrape programs and courses into JSON,
//! then load both into SQLite with faculty/category keys resolved.

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod intermediate;
pub mod loader;
pub mod models;

pub use error::{CatalogError, Result};
