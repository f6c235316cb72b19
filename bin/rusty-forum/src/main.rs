//! # Rusty-Forum Binary
//!
//! The entry point that assembles the application based on compile-time features.

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::{Parser, Subcommand};
use rf_api::handlers::AppState;
use rf_api::middleware::{cors_policy, standard_middleware};
use rf_config::{LogSettings, Settings};
use rf_core::service::PostService;
use rf_core::traits::AuthProvider;
use secrecy::ExposeSecret;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "db-sqlite")]
use rf_db_sqlite::SqliteStore;

#[cfg(feature = "storage-local")]
use rf_storage_local::LocalMediaStore;

#[cfg(feature = "auth-simple")]
use rf_auth_simple::SimpleAuthProvider;

#[cfg(not(all(feature = "db-sqlite", feature = "storage-local", feature = "auth-simple")))]
compile_error!("rusty-forum needs one database, one storage and one auth plugin enabled");

#[derive(Parser, Debug)]
#[command(name = "rusty-forum", version, about = "Forum post engine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Print a bearer token for a user, signed with the configured secret.
    IssueToken {
        #[arg(long)]
        user: i64,
    },
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load().context("failed to load configuration")?;
    init_tracing(&settings.log);

    let auth = SimpleAuthProvider::new(settings.auth.secret.expose_secret());

    match cli.command.unwrap_or(Command::Serve) {
        Command::IssueToken { user } => {
            anyhow::ensure!(user > 0, "user id must be positive");
            println!("{}", auth.issue_token(user));
            Ok(())
        }
        Command::Serve => serve(settings, auth).await,
    }
}

async fn serve(settings: Settings, auth: SimpleAuthProvider) -> anyhow::Result<()> {
    // 1. Database
    let repo = SqliteStore::connect(&settings.database.url, settings.database.max_connections)
        .await
        .with_context(|| format!("failed to open {}", settings.database.url))?;

    // 2. Media storage
    let media_root = settings.media.root.clone();
    let media_prefix = settings.media.url_prefix.trim_end_matches('/').to_string();
    let store = LocalMediaStore::new(media_root.clone().into(), media_prefix.clone())
        .with_max_bytes(settings.media.max_bytes);

    // 3. Shared state (dynamic dispatch keeps the plugins swappable)
    let state = web::Data::new(AppState {
        posts: PostService::new(Arc::new(repo), Arc::new(store)),
        auth: Box::new(auth),
        upload_limit: settings.media.max_bytes,
    });

    let addr = settings.bind_addr();
    tracing::info!(host = %addr.0, port = addr.1, "Rusty-Forum starting");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(cors_policy())
            .wrap(standard_middleware())
            .configure(rf_api::configure_routes)
            .service(actix_files::Files::new(&media_prefix, &media_root))
    })
    .bind(addr)?
    .run()
    .await?;

    Ok(())
}
