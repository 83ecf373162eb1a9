//! gallery-sync — headless gallery client.
//!
//! Usage:
//!   gallery-sync [watch]          keep a synced view, logging changes
//!   gallery-sync list             print the collection once
//!   gallery-sync upload <file>    upload an image and add it
//!   gallery-sync favorite <id>    toggle the favorite flag
//!   gallery-sync delete <id>      remove a photo

use std::path::Path;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use gallery::client::HttpGalleryClient;
use gallery::config::Config;
use gallery::sync::{GallerySync, SyncSettings};

const USAGE: &str = "Usage: gallery-sync [watch | list | upload <file> | favorite <id> | delete <id>]";

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {:#}, using defaults", e);
        let mut cfg = Config::default();
        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg
    });
    let client = HttpGalleryClient::new(&config.sync.server_url)?;
    let mut sync = GallerySync::new(client, SyncSettings::from(&config.sync));

    match args.first().map(String::as_str) {
        None | Some("watch") => {
            tracing::info!("Watching {}", config.sync.server_url);
            sync.run(async {
                tokio::signal::ctrl_c().await.ok();
            })
            .await;
        }
        Some("list") => {
            if !sync.mount().await.is_success() {
                anyhow::bail!("could not load the gallery");
            }
            for photo in sync.photos() {
                let star = if photo.is_favorite { "★" } else { " " };
                println!("{} {:>15}  {}  {}", star, photo.id, photo.title, photo.url);
            }
        }
        Some("upload") => {
            let path = args.get(1).context(USAGE)?;
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {path}"))?;
            let name = Path::new(path)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("photo.jpg");

            if !sync.mount().await.is_success() {
                anyhow::bail!("could not load the gallery");
            }
            let created = sync.upload(&bytes, name).await;
            report(&sync, created.is_some())?;
        }
        Some(cmd @ ("favorite" | "delete")) => {
            let id: u64 = args
                .get(1)
                .context(USAGE)?
                .parse()
                .context("photo id must be a number")?;

            if !sync.mount().await.is_success() {
                anyhow::bail!("could not load the gallery");
            }
            let ok = if cmd == "favorite" {
                sync.toggle_favorite(id).await.is_some()
            } else {
                sync.delete(id).await.is_some()
            };
            report(&sync, ok)?;
        }
        Some(other) => {
            eprintln!("Unknown command: {other}");
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn report<A: gallery::client::GalleryApi>(sync: &GallerySync<A>, ok: bool) -> Result<()> {
    if let Some(note) = sync.latest_notification() {
        println!("{}", note.message);
    }
    if !ok {
        anyhow::bail!("operation failed");
    }
    Ok(())
}
