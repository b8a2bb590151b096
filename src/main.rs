use std::path::PathBuf;

use actix_web::middleware::{self, NormalizePath, TrailingSlash};
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::{Parser, Subcommand};

use foodgram_backend::cache::IngredientCache;
use foodgram_backend::config::Settings;
use foodgram_backend::db::Database;
use foodgram_backend::{api, import, AppState};

#[derive(Parser)]
#[command(name = "foodgram", about = "Foodgram recipe sharing backend")]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Apply pending database migrations
    Migrate,
    /// Load ingredients from a .csv or .json file
    ImportIngredients { path: PathBuf },
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cli.settings).await,
        Command::Migrate => {
            let db = Database::new(&cli.settings.database_url, 1);
            db.run_migrations().context("running migrations")?;
            log::info!("migrations applied");
            Ok(())
        }
        Command::ImportIngredients { path } => {
            let settings = cli.settings;
            let db = Database::new(&settings.database_url, 1);
            let cache = match &settings.redis_url {
                Some(url) => Some(IngredientCache::new(url, settings.cache_ttl_seconds)?),
                None => None,
            };
            let summary = import::import_file(&db, cache.as_ref(), &path)
                .with_context(|| format!("importing {}", path.display()))?;
            println!(
                "Loaded {} ingredients from {} ({} new)",
                summary.parsed,
                path.display(),
                summary.inserted
            );
            Ok(())
        }
    }
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    let state = web::Data::new(AppState::from_settings(&settings)?);
    let bind = (settings.host.clone(), settings.port);

    log::info!("starting HTTP server at http://{}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .wrap(NormalizePath::new(TrailingSlash::Trim))
            .configure(api::configure)
    })
    .bind(bind)
    .context("binding HTTP listener")?
    .run()
    .await?;
    Ok(())
}
