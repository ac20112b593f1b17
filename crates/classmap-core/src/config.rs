//! Engine configuration and its on-disk form.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default cap on files considered by one dynamic resolution.
pub const DEFAULT_MAX_FILES: usize = 5000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Attribute injected into the renderable copy to carry each element's UID.
    pub marker_attribute: String,
    pub strategy: AnnotateStrategy,
    pub scan: ScanConfig,
    pub proximity: ProximityConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            marker_attribute: "data-classmap-uid".to_owned(),
            strategy: AnnotateStrategy::Auto,
            scan: ScanConfig::default(),
            proximity: ProximityConfig::default(),
        }
    }
}

/// Which annotation strategies may run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnnotateStrategy {
    /// Structural parse, falling back to tag scanning when it fails.
    #[default]
    Auto,
    /// Tag scanning only.
    ScanOnly,
}

/// Bounds on the candidate file set for dynamic resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScanConfig {
    pub max_files: usize,
    /// Allowed file extensions, without the dot.
    pub extensions: Vec<String>,
    /// Directory names never descended into.
    pub excluded_dirs: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            max_files: DEFAULT_MAX_FILES,
            extensions: strings(&[
                "html", "htm", "xhtml", "vue", "svelte", "astro", "js", "mjs", "cjs", "jsx",
                "ts", "tsx",
            ]),
            excluded_dirs: strings(&[
                "node_modules",
                "dist",
                "build",
                "out",
                ".git",
                ".next",
                ".nuxt",
                ".svelte-kit",
                "coverage",
                "target",
                "vendor",
            ]),
        }
    }
}

impl ScanConfig {
    pub fn allows_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    pub fn is_excluded_dir(&self, name: &str) -> bool {
        self.excluded_dirs.iter().any(|dir| dir == name)
    }
}

/// Tuning for the proximity pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProximityConfig {
    /// Characters scanned either side of each anchor occurrence.
    pub window: usize,
    /// Shortest rendered text accepted as an anchor.
    pub min_anchor_len: usize,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            window: 800,
            min_anchor_len: 4,
        }
    }
}

/// A configuration file, serialized according to its extension.
///
/// Supports `.json` and `.toml`.
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<EngineConfig, ConfigError> {
        let format = self.format()?;
        let text = tokio::fs::read_to_string(&self.path).await?;
        Ok(match format {
            Format::Json => serde_json::from_str(&text)?,
            Format::Toml => toml::from_str(&text)?,
        })
    }

    pub async fn save(&self, config: &EngineConfig) -> Result<(), ConfigError> {
        let text = match self.format()? {
            Format::Json => serde_json::to_string_pretty(config)?,
            Format::Toml => toml::to_string_pretty(config)?,
        };
        tokio::fs::write(&self.path, text).await?;
        Ok(())
    }

    fn format(&self) -> Result<Format, ConfigError> {
        match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("toml") => Ok(Format::Toml),
            _ => Err(ConfigError::UnsupportedFormat {
                path: self.path.clone(),
            }),
        }
    }
}

enum Format {
    Json,
    Toml,
}
