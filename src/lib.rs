//! share-images - upload images over HTTP and share them by short links
//!
//! This crate provides:
//! - Random six-character image keys, checked against the store for collisions
//! - Swappable image stores (MongoDB, embedded redb) with enforced key uniqueness
//! - An HTTP front end: upload form, multipart upload, image retrieval
//! - Graceful shutdown with a bounded grace period

pub mod api;
pub mod config;
pub mod image_store;
pub mod keys;
pub mod server;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use api::pages::Pages;
use config::Config;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub pages: Pages,
    pub store: Arc<dyn image_store::ImageStore>,
}
