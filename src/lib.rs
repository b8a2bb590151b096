#[macro_use]
extern crate diesel;
#[macro_use]
extern crate diesel_migrations;

use std::sync::Arc;

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod dto;
pub mod error;
pub mod import;
pub mod media;
pub mod models;
pub mod pagination;
pub mod query;
pub mod schema;
pub mod shopping_list;
pub mod validation;

use crate::cache::IngredientCache;
use crate::config::Settings;
use crate::db::Database;
use crate::media::MediaStorage;

/// Shared by every worker through `web::Data`.
pub struct AppState {
    pub db: Database,
    pub cache: Option<IngredientCache>,
    pub media: MediaStorage,
    pub page_size: i64,
    pub pdf_font: Option<Arc<Vec<u8>>>,
}

impl AppState {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        if settings.page_size < 1 {
            anyhow::bail!("PAGE_SIZE must be positive, got {}", settings.page_size);
        }
        let db = Database::new(&settings.database_url, settings.db_pool_size);
        let cache = match &settings.redis_url {
            Some(url) => Some(IngredientCache::new(url, settings.cache_ttl_seconds)?),
            None => {
                log::info!("REDIS_URL is not set, ingredient cache disabled");
                None
            }
        };
        let pdf_font = match std::fs::read(&settings.pdf_font_path) {
            Ok(bytes) => Some(Arc::new(bytes)),
            Err(err) => {
                log::warn!(
                    "font {} not loaded ({}), shopping lists fall back to Helvetica",
                    settings.pdf_font_path.display(),
                    err
                );
                None
            }
        };
        Ok(Self {
            db,
            cache,
            media: MediaStorage::new(settings.media_root.clone(), &settings.media_url),
            page_size: settings.page_size,
            pdf_font,
        })
    }
}
