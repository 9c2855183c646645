use crate::takeout::TakeoutOptions;
use crate::upload::UploadError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for uplift.
///
/// Holds where to upload to and how local folders map to albums.
///
/// # Loading
///
/// ```rust,no_run
/// use uplift::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.server.url = "http://photos.local:2283".into();
/// config.upload.google_photos = true;
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote server connection.
    pub server: ServerConfig,
    /// Album policy and upload behavior.
    pub upload: UploadOptions,
}

/// Connection settings for the photo server.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL, e.g. `http://localhost:2283`.
    pub url: String,
    pub api_key: String,
    /// Identifies this client to the server for duplicate detection.
    pub device_id: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            device_id: "uplift".to_string(),
            timeout_secs: 300,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("device_id", &self.device_id)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// How plain folders turn into albums.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum FolderAlbums {
    /// No albums from folder names.
    #[default]
    Off,
    /// Album named after the folder directly containing the file.
    Leaf,
    /// Album named after the first folder below the scan root.
    Top,
}

/// Album policy and upload behavior.
///
/// The Takeout-specific fields (`use_album_folder_as_name`,
/// `keep_untitled_albums`, `keep_partner`, `partner_album`) only apply when
/// `google_photos` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadOptions {
    /// Put every asset in this single album. Folder mode only.
    pub album: Option<String>,
    pub folder_albums: FolderAlbums,
    /// Treat the inputs as a Google Takeout export.
    pub google_photos: bool,
    pub use_album_folder_as_name: bool,
    pub keep_untitled_albums: bool,
    pub keep_partner: bool,
    pub partner_album: Option<String>,
    /// Maximum uploads in flight.
    pub concurrency: usize,
    /// Album additions are sent in batches of this size.
    pub album_batch_size: usize,
    /// Look up what the server already has and skip those files.
    pub skip_existing: bool,
    /// Exercise the whole pipeline against an in-memory server.
    pub dry_run: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            album: None,
            folder_albums: FolderAlbums::Off,
            google_photos: false,
            use_album_folder_as_name: false,
            keep_untitled_albums: false,
            keep_partner: true,
            partner_album: None,
            concurrency: 4,
            album_batch_size: 50,
            skip_existing: false,
            dry_run: false,
        }
    }
}

impl UploadOptions {
    /// The legacy `create_album_folder` switch: one album per leaf folder.
    pub fn set_create_album_folder(&mut self, enabled: bool) {
        self.folder_albums = if enabled { FolderAlbums::Leaf } else { FolderAlbums::Off };
    }

    /// Subset of options the Takeout matcher needs.
    pub fn takeout(&self) -> TakeoutOptions {
        TakeoutOptions {
            use_album_folder_as_name: self.use_album_folder_as_name,
            keep_untitled_albums: self.keep_untitled_albums,
            keep_partner: self.keep_partner,
            partner_album: self.partner_album.clone(),
        }
    }

    /// Reject combinations the pipeline cannot run with. Options that are
    /// merely ignored in the chosen mode only produce a warning.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.concurrency == 0 {
            return Err(UploadError::Config("concurrency must be at least 1".into()));
        }
        if self.album_batch_size == 0 {
            return Err(UploadError::Config("album_batch_size must be at least 1".into()));
        }
        if self.album.as_deref().is_some_and(|a| a.trim().is_empty()) {
            return Err(UploadError::Config("album name must not be empty".into()));
        }
        if self.partner_album.as_deref().is_some_and(|a| a.trim().is_empty()) {
            return Err(UploadError::Config("partner album name must not be empty".into()));
        }

        if self.google_photos {
            if self.folder_albums != FolderAlbums::Off {
                log::warn!("Folder albums are ignored for Google Photos exports");
            }
        } else if self.use_album_folder_as_name
            || self.keep_untitled_albums
            || !self.keep_partner
            || self.partner_album.is_some()
        {
            log::warn!("Google Photos options are ignored without --google-photos");
        }
        Ok(())
    }
}

impl Config {
    /// Resolve the config file path, next to the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("uplift.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let options = UploadOptions::default();
        assert!(options.keep_partner);
        assert!(!options.keep_untitled_albums);
        assert_eq!(options.folder_albums, FolderAlbums::Off);
        assert_eq!(options.concurrency, 4);
        assert_eq!(options.album_batch_size, 50);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("uplift.json");

        let mut config = Config::default();
        config.server.url = "http://localhost:2283".into();
        config.upload.google_photos = true;
        config.upload.partner_album = Some("partner".into());
        config.save(Some(path.as_path())).unwrap();

        let loaded = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(loaded.server.url, "http://localhost:2283");
        assert_eq!(loaded.upload, config.upload);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("uplift.json");
        fs::write(&path, r#"{"upload": {"folder_albums": "top", "keep_partner": false}}"#).unwrap();

        let config = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.upload.folder_albums, FolderAlbums::Top);
        assert!(!config.upload.keep_partner);
        assert_eq!(config.upload.concurrency, 4);
        assert_eq!(config.server.device_id, "uplift");
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(Some(dir.path().join("absent.json").as_path())).unwrap();
        assert_eq!(config.upload, UploadOptions::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("uplift.json");
        fs::write(&path, "{ nope").unwrap();
        assert!(Config::load(Some(path.as_path())).is_err());
    }

    #[test]
    fn create_album_folder_maps_to_leaf() {
        let mut options = UploadOptions::default();
        options.set_create_album_folder(true);
        assert_eq!(options.folder_albums, FolderAlbums::Leaf);
        options.set_create_album_folder(false);
        assert_eq!(options.folder_albums, FolderAlbums::Off);
    }

    #[test]
    fn validation_rejects_zero_and_empty() {
        let mut options = UploadOptions {
            concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(UploadError::Config(_))));

        options.concurrency = 2;
        options.album_batch_size = 0;
        assert!(options.validate().is_err());

        options.album_batch_size = 10;
        options.album = Some("  ".into());
        assert!(options.validate().is_err());
    }

    #[test]
    fn api_key_is_redacted() {
        let mut server = ServerConfig::default();
        server.api_key = "secret-key".into();
        let debug = format!("{server:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("<redacted>"));
    }
}
