use anyhow::{Context, Result};
use clap::Parser;
use clap::builder::BoolishValueParser;
use std::path::PathBuf;

use uplift::config::{self, FolderAlbums};
use uplift::remote::{HttpClient, MemoryClient, RemoteClient};
use uplift::upload::{RunReport, UploadError};
use uplift::{pipeline, shutdown};

#[derive(Parser, Debug)]
#[command(
    name = "uplift",
    version,
    about = "Upload photo folders and Google Takeout exports to an Immich server, recreating albums"
)]
struct Cli {
    /// Files, folders or Takeout parts to upload
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Path to config file (default: uplift.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default uplift.json and exit
    #[arg(long)]
    init: bool,

    /// Server base URL
    #[arg(long, env = "UPLIFT_SERVER", value_name = "URL")]
    server: Option<String>,

    /// API key
    #[arg(long, env = "UPLIFT_API_KEY", value_name = "KEY", hide_env_values = true)]
    key: Option<String>,

    /// Put every asset in this album
    #[arg(long, value_name = "NAME")]
    album: Option<String>,

    /// Derive albums from folder names
    #[arg(long, value_enum, value_name = "MODE")]
    folder_albums: Option<FolderAlbums>,

    /// One album per folder (same as --folder-albums leaf)
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = BoolishValueParser::new())]
    create_album_folder: Option<bool>,

    /// Inputs are a Google Takeout export
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = BoolishValueParser::new())]
    google_photos: Option<bool>,

    /// Name Takeout albums after their folder rather than their title
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = BoolishValueParser::new())]
    use_album_folder_as_name: Option<bool>,

    /// Upload assets that came from partner sharing
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = BoolishValueParser::new())]
    keep_partner: Option<bool>,

    /// Collect partner-shared assets in this album
    #[arg(long, value_name = "NAME")]
    partner_album: Option<String>,

    /// Keep untitled Takeout albums, named after their folder
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = BoolishValueParser::new())]
    keep_untitled_albums: Option<bool>,

    /// Do not upload files the server already has
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = BoolishValueParser::new())]
    skip_existing: Option<bool>,

    /// Run against an in-memory server and print the resulting albums
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = BoolishValueParser::new())]
    dry_run: Option<bool>,

    /// Maximum uploads in flight
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Assets per album addition request
    #[arg(long, value_name = "N")]
    album_batch_size: Option<usize>,

    /// Output the run report as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Command-line values win over the config file.
    fn apply(&self, config: &mut config::Config) {
        let server = &mut config.server;
        if let Some(url) = &self.server {
            server.url = url.clone();
        }
        if let Some(key) = &self.key {
            server.api_key = key.clone();
        }

        let upload = &mut config.upload;
        if let Some(album) = &self.album {
            upload.album = Some(album.clone());
        }
        if let Some(enabled) = self.create_album_folder {
            upload.set_create_album_folder(enabled);
        }
        if let Some(mode) = self.folder_albums {
            upload.folder_albums = mode;
        }
        if let Some(album) = &self.partner_album {
            upload.partner_album = Some(album.clone());
        }
        if let Some(n) = self.concurrency {
            upload.concurrency = n;
        }
        if let Some(n) = self.album_batch_size {
            upload.album_batch_size = n;
        }

        let flags = [
            (self.google_photos, &mut upload.google_photos),
            (self.use_album_folder_as_name, &mut upload.use_album_folder_as_name),
            (self.keep_partner, &mut upload.keep_partner),
            (self.keep_untitled_albums, &mut upload.keep_untitled_albums),
            (self.skip_existing, &mut upload.skip_existing),
            (self.dry_run, &mut upload.dry_run),
        ];
        for (flag, field) in flags {
            if let Some(value) = flag {
                *field = value;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = config::Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => config::Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    if cli.paths.is_empty() {
        anyhow::bail!("No input files or directories specified. Use --help for usage.");
    }

    let mut config = config::Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    let options = &config.upload;

    let memory;
    let http;
    let client: &dyn RemoteClient = if options.dry_run {
        log::info!("DRY RUN: nothing is sent to the server");
        memory = MemoryClient::new();
        &memory
    } else {
        if config.server.url.is_empty() {
            anyhow::bail!(
                "No server configured. Pass --server or run `uplift --init` and set server.url."
            );
        }
        log::info!("Uploading to {}", config.server.url);
        http = HttpClient::new(&config.server).context("Failed to set up HTTP client")?;
        &http
    };

    let cancel = shutdown::install_signal_handler();
    let outcome = pipeline::run(client, &cli.paths, options, cancel).await;

    let report = match &outcome {
        Ok(report) => Some(report),
        Err(e) => e.report(),
    };
    if let Some(report) = report {
        if options.dry_run {
            print_albums(report);
        }
        if cli.json {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
    }

    match outcome {
        Ok(report) => {
            if report.has_errors() {
                log::warn!("Finished with errors, see above");
            }
            Ok(())
        }
        Err(UploadError::Fatal { source, .. }) => Err(source).context("Upload aborted"),
        Err(e) => Err(e.into()),
    }
}

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Print the albums a dry run would have produced.
fn print_albums(report: &RunReport) {
    println!();
    println!("  {BOLD}Albums:{RESET}");
    println!("  {DIM}{}{RESET}", "─".repeat(72));
    if report.albums.is_empty() {
        println!("  {DIM}(none){RESET}");
    }
    for (name, album) in &report.albums {
        println!("  {GREEN}{name}{RESET} {DIM}({} assets){RESET}", album.members.len());
        for member in &album.members {
            println!("    {}", member.upload_key);
        }
    }
    println!("  {DIM}{}{RESET}", "─".repeat(72));
    println!();
}
