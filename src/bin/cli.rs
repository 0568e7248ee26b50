use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use emby_ncm_bridge as lib;
use lib::api::emby::{self, EmbyClient};
use lib::api::emby_auth::EmbySettings;
use lib::api::ncm::NcmClient;
use lib::config::Config;
use lib::import::{ImportOptions, Importer};
use lib::models::MusicItem;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::subscriber as tracing_subscriber_global;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const CONFIG_ENV: &str = "EMBY_NCM_BRIDGE_CONFIG";

#[derive(Parser)]
#[command(name = "emby-ncm-bridge", version)]
struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a NetEase playlist by matching its tracks on the Emby server
    Import {
        /// Share link or numeric playlist id
        reference: String,

        /// Also write the matched tracks as an M3U playlist of stream URLs
        #[arg(long, value_name = "FILE")]
        m3u: Option<PathBuf>,

        /// Print the import report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search the Emby library
    Search {
        query: String,

        #[arg(long, value_enum, default_value_t = SearchKind::Music)]
        kind: SearchKind,

        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Print the playlist id contained in a NetEase reference
    Resolve { reference: String },
    /// Print the stream URL for an Emby audio item
    Stream { item_id: String },
    /// Log in to the Emby server and print the user id
    Login,
    /// Validate config file and exit
    ConfigValidate,
}

#[derive(Clone, Copy, ValueEnum)]
enum SearchKind {
    Music,
    Album,
    Artist,
    Playlist,
}

fn resolve_config_path(cli_path: Option<&Path>) -> (PathBuf, bool) {
    match cli_path {
        Some(p) => (p.to_path_buf(), true),
        None => match std::env::var(CONFIG_ENV) {
            Ok(p) if !p.is_empty() => (PathBuf::from(p), true),
            _ => (PathBuf::from("config.toml"), false),
        },
    }
}

/// Install the log->tracing bridge plus stderr and optional daily-file output.
fn init_logging(cfg: &Config) -> Result<Option<WorkerGuard>> {
    let _ = LogTracer::init();

    // Honor RUST_LOG if set, otherwise default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match &cfg.log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "emby-ncm-bridge.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            (Some(fmt::layer().with_ansi(false).with_writer(non_blocking)), Some(guard))
        }
        None => (None, None),
    };
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer);

    tracing_subscriber_global::set_global_default(subscriber)
        .context("failed to set global tracing subscriber")?;
    Ok(guard)
}

fn emby_client(cfg: &Config) -> Result<EmbyClient> {
    let settings = EmbySettings::from_config(&cfg.emby).context("reading [emby] settings")?;
    Ok(EmbyClient::new(settings, cfg.page_size))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config_path, explicit) = resolve_config_path(cli.config.as_deref());

    if let Commands::ConfigValidate = cli.command {
        match Config::from_path(&config_path) {
            Ok(_) => println!("OK"),
            Err(e) => {
                eprintln!("Config validation failed: {}", e);
                std::process::exit(2);
            }
        }
        return Ok(());
    }

    let cfg = if explicit || config_path.exists() {
        Config::from_path(&config_path)
            .with_context(|| format!("loading config from {}", config_path.display()))?
    } else {
        Config::default()
    };

    let _guard = init_logging(&cfg)?;

    match cli.command {
        Commands::Import { reference, m3u, json } => {
            let client = Arc::new(emby_client(&cfg)?);
            let source = Arc::new(NcmClient::from_config(&cfg.import));
            let importer = Importer::new(source, client.clone(), ImportOptions::from(&cfg.import));

            let report = importer
                .import_playlist(&reference)
                .await
                .with_context(|| format!("importing NetEase playlist {:?}", reference))?;

            if let Some(path) = &m3u {
                let mut urls = HashMap::new();
                for t in &report.tracks {
                    let item = MusicItem::from(t.clone());
                    if let Some(url) = client.stream_url(&item).await.context("resolving stream URLs")? {
                        urls.insert(item.id, url);
                    }
                }
                lib::playlist::write_m3u(path, &report.tracks, |t| {
                    urls.get(&t.local_id).cloned().unwrap_or_default()
                })
                .with_context(|| format!("writing playlist {}", path.display()))?;
                tracing::info!("Wrote {} tracks to {}", report.tracks.len(), path.display());
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Matched {} of {} tracks from NetEase playlist {} ({} unmatched, {} failed):",
                    report.tracks.len(),
                    report.fetched,
                    report.playlist_id,
                    report.unmatched,
                    report.failed
                );
                for t in &report.tracks {
                    println!("- {} | {} - {} [{}]", t.local_id, t.artist, t.title, t.album);
                }
                if !report.missing.is_empty() {
                    println!("Not found on Emby:");
                    for m in &report.missing {
                        println!("- {} | {} - {}", m.id, m.artist, m.title);
                    }
                }
            }
        }
        Commands::Search { query, kind, page } => {
            let client = emby_client(&cfg)?;
            match kind {
                SearchKind::Music => {
                    let res = client.search_music(&query, page, cfg.page_size).await?;
                    for m in &res.items {
                        println!("- {} | {} - {} [{}]", m.id, m.artist, m.title, m.album);
                    }
                    print_page_end(res.is_end);
                }
                SearchKind::Album => {
                    let res = client.search_albums(&query, page).await?;
                    for a in &res.items {
                        println!("- {} | {} - {} ({})", a.id, a.artist, a.title, a.description);
                    }
                    print_page_end(res.is_end);
                }
                SearchKind::Artist => {
                    let res = client.search_artists(&query, page).await?;
                    for a in &res.items {
                        println!("- {} | {}", a.id, a.name);
                    }
                    print_page_end(res.is_end);
                }
                SearchKind::Playlist => {
                    let res = client.search_playlists(&query, page).await?;
                    for p in &res.items {
                        println!("- {} | {} ({})", p.id, p.title, p.description);
                    }
                    print_page_end(res.is_end);
                }
            }
        }
        Commands::Resolve { reference } => {
            let id = lib::reference::resolve(&reference)?;
            println!("{}", id);
        }
        Commands::Stream { item_id } => {
            let client = emby_client(&cfg)?;
            let session = client.ensure_login().await?;
            println!("{}", emby::stream_url(client.host(), &item_id, &session.access_token));
        }
        Commands::Login => {
            let client = emby_client(&cfg)?;
            let session = client.login().await?;
            println!("Logged in to {} as user {}", client.host(), session.user_id);
        }
        Commands::ConfigValidate => unreachable!("handled before logging setup"),
    }

    Ok(())
}

fn print_page_end(is_end: bool) {
    if !is_end {
        println!("(more results available, use --page)");
    }
}
