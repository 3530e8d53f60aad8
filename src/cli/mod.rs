//! Command-line interface for pagemanifest.
//!
//! Provides commands for building a page manifest, following a page's live
//! resource feed, serving the request channel and viewing stored manifests.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use url::Url;

use crate::adapters::{read_har, FileStore, Fetcher, HttpFetcher, ManifestStore, StaticPage};
use crate::config::{self, ResolvedConfig};
use crate::core::PageSession;
use crate::view;

/// pagemanifest - content-addressable inventory of a page's resources
#[derive(Parser, Debug)]
#[command(name = "pagemanifest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the manifest for a page once and store it
    Build {
        /// Page URL
        url: String,

        /// HAR file to use as the load-timing snapshot
        #[arg(long)]
        har: Option<PathBuf>,

        /// Do not print the manifest listing
        #[arg(short, long)]
        quiet: bool,
    },

    /// Build the manifest, then record resource URLs read from stdin (one per line)
    Watch {
        /// Page URL
        url: String,

        /// HAR file to use as the load-timing snapshot
        #[arg(long)]
        har: Option<PathBuf>,
    },

    /// Answer JSON-lines requests on stdin ({"action":"rebuildManifest"} / {"action":"getManifest"})
    Serve {
        /// Page URL
        url: String,

        /// HAR file to use as the load-timing snapshot
        #[arg(long)]
        har: Option<PathBuf>,
    },

    /// Show the stored manifest
    Show {
        /// Keep running and re-render whenever the stored manifest changes
        #[arg(short, long)]
        follow: bool,

        /// Print raw JSON instead of the listing
        #[arg(long)]
        json: bool,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Build { url, har, quiet } => build_manifest(&url, har, quiet).await,
            Commands::Watch { url, har } => watch_page(&url, har).await,
            Commands::Serve { url, har } => serve(&url, har).await,
            Commands::Show { follow, json } => show_manifest(follow, json).await,
            Commands::Config => show_config(),
        }
    }
}

/// Shared setup: configuration, fetcher, store and the page host
struct PageContext {
    settings: &'static ResolvedConfig,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<FileStore>,
    page: StaticPage,
    timing: Option<Vec<String>>,
}

async fn page_context(url: &str, har: Option<PathBuf>) -> Result<PageContext> {
    let settings = config::config()?;
    let location = Url::parse(url).with_context(|| format!("Invalid page URL: {}", url))?;

    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::from_settings(&settings.fetch)?);
    let mut page = StaticPage::open(fetcher.as_ref(), location).await;

    let timing = match har {
        Some(path) => Some(read_har(&path).await?),
        None => None,
    };
    if let Some(ref urls) = timing {
        page = page.with_timing(urls.clone());
    }

    Ok(PageContext {
        settings,
        fetcher,
        store: Arc::new(FileStore::new(&settings.store)),
        page,
        timing,
    })
}

/// Build the manifest once
async fn build_manifest(url: &str, har: Option<PathBuf>, quiet: bool) -> Result<()> {
    let ctx = page_context(url, har).await?;

    let session = PageSession::new(
        Arc::new(ctx.page),
        ctx.fetcher,
        ctx.store.clone(),
        ctx.settings.persistence.debounce(),
    );
    let outcome = session.rebuild().await;

    if !quiet {
        print!("{}", view::render(Some(&outcome.manifest)));
    }

    if outcome.stored {
        eprintln!(
            "\n[Stored {} entries in {}]",
            outcome.manifest.len(),
            ctx.store.manifest_path().display()
        );
    } else {
        eprintln!("\n[Manifest built but could not be stored]");
    }

    Ok(())
}

/// Build, then feed stdin lines through the live discovery feed until EOF
async fn watch_page(url: &str, har: Option<PathBuf>) -> Result<()> {
    let ctx = page_context(url, har).await?;

    let (feed_tx, feed_rx) = mpsc::channel::<Vec<String>>(64);

    // The feed is buffered: it replays everything loaded before it started
    if let Some(urls) = ctx.timing.clone() {
        feed_tx
            .send(urls)
            .await
            .context("Failed to replay buffered resources")?;
    }

    let page = ctx.page.with_feed(feed_rx);
    let mut session = PageSession::start(
        Arc::new(page),
        ctx.fetcher,
        ctx.store.clone(),
        ctx.settings.persistence.debounce(),
    );

    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            if feed_tx.send(vec![line]).await.is_err() {
                break;
            }
        }
    });

    if let Some(outcome) = session.wait_startup().await {
        eprintln!("[Initial manifest: {} entries]", outcome.manifest.len());
    }

    session.wait_live_feed().await;
    reader.await.context("Stdin reader failed")?;
    session.flush().await;

    if let Some(manifest) = session.current_manifest() {
        eprintln!(
            "[Stored {} entries in {}]",
            manifest.len(),
            ctx.store.manifest_path().display()
        );
    }

    Ok(())
}

/// Serve the request channel over stdio
async fn serve(url: &str, har: Option<PathBuf>) -> Result<()> {
    let ctx = page_context(url, har).await?;

    let mut session = PageSession::start(
        Arc::new(ctx.page),
        ctx.fetcher,
        ctx.store,
        ctx.settings.persistence.debounce(),
    );

    session
        .handler()
        .serve_json_lines(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
        .context("Request channel failed")?;

    session.wait_startup().await;
    session.flush().await;

    Ok(())
}

/// Show the stored manifest, optionally following changes
async fn show_manifest(follow: bool, json: bool) -> Result<()> {
    let store = FileStore::open_default()?;

    let print = |manifest: Option<&crate::domain::Manifest>| -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        } else {
            println!("{}", view::render(manifest));
        }
        Ok(())
    };

    let manifest = store
        .load()
        .await
        .with_context(|| format!("Failed to load {}", store.manifest_path().display()))?;
    print(manifest.as_ref())?;

    if !follow {
        return Ok(());
    }

    let mut changes = store.watch().context("Failed to watch manifest store")?;
    eprintln!("[Watching {} for changes]", store.manifest_path().display());

    while let Some(manifest) = changes.next().await {
        println!("{}", "-".repeat(60));
        print(Some(&manifest))?;
    }

    Ok(())
}

/// Show resolved configuration (debug)
fn show_config() -> Result<()> {
    let config = config::config()?;

    println!("pagemanifest Configuration");
    println!("{}", "=".repeat(40));
    println!();
    println!(
        "Config file: {}",
        config
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  home:  {}", config.home.display());
    println!("  store: {}", config.store.display());
    println!();
    println!("Persistence:");
    println!("  debounce_ms: {}", config.persistence.debounce_ms);
    println!();
    println!("Fetch:");
    println!("  timeout_seconds: {}", config.fetch.timeout_seconds);
    println!("  user_agent:      {}", config.fetch.user_agent);
    println!();
    println!("Environment overrides:");
    for var in ["PAGEMANIFEST_HOME", "PAGEMANIFEST_STORE"] {
        match std::env::var(var) {
            Ok(value) => println!("  {}={}", var, value),
            Err(_) => println!("  {} (not set)", var),
        }
    }

    Ok(())
}
