use std::path::PathBuf;

use clap::Args;

/// Runtime settings, read from flags or the environment (`.env` is loaded first).
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// MySQL connection url
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Redis url for the ingredient cache; caching is off when unset
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Maximum number of pooled MySQL connections
    #[arg(long, env = "DB_POOL_SIZE", default_value = "10")]
    pub db_pool_size: u32,

    /// Page size when the client does not pass `limit`
    #[arg(long, env = "PAGE_SIZE", default_value = "6")]
    pub page_size: i64,

    #[arg(long, env = "CACHE_TTL_SECONDS", default_value = "60")]
    pub cache_ttl_seconds: usize,

    /// Directory uploaded images are written to
    #[arg(long, env = "MEDIA_ROOT", default_value = "media")]
    pub media_root: PathBuf,

    /// Public path the reverse proxy serves `media_root` under
    #[arg(long, env = "MEDIA_URL", default_value = "/media/")]
    pub media_url: String,

    /// TrueType font embedded into shopping list PDFs
    #[arg(long, env = "PDF_FONT_PATH", default_value = "fonts/DejaVuSans.ttf")]
    pub pdf_font_path: PathBuf,
}
