use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::reconcile::strategy::{Direction, StrategyKind};

const ENV_PREFIX: &str = "SQSP";

/// Filenames that say nothing about the post they belong to. Order matters:
/// the first hit names the review reason, so specific names precede prefixes.
pub const DEFAULT_GENERIC_NAMES: &[&str] = &[
    "blog_black",
    "blog_white",
    "blog_red",
    "blog_blue",
    "blog_green",
    "blog",
    "image",
    "img",
    "unsplash",
    "photo",
    "untitled",
    "attachment",
    "screen",
    "title+slide",
    "title",
];

/// Squarespace blog templates, most specific first.
pub const DEFAULT_IMAGE_SELECTORS: &[&str] = &[
    ".blog-item-top-wrapper img",
    "article .image-block img",
    ".blog-item-wrapper .sqs-block-image img",
    ".BlogItem-image img",
    "figure.blog-item-top-wrapper img",
    ".entry-header img",
    ".sqs-block-image-figure img",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Origin that relative post links are resolved against.
    pub base_url: String,
    /// Plain-mode body length cap; 0 disables truncation.
    pub content_max_chars: usize,
    pub generic_names: Vec<String>,
    pub image_selectors: Vec<String>,
    pub pairing: PairingSettings,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PairingSettings {
    pub strategy: StrategyKind,
    pub direction: Direction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    /// Pause before every request to the live site.
    pub delay_ms: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            base_url: "https://www.thepointva.com".to_string(),
            content_max_chars: 1000,
            generic_names: DEFAULT_GENERIC_NAMES.iter().map(|s| s.to_string()).collect(),
            image_selectors: DEFAULT_IMAGE_SELECTORS.iter().map(|s| s.to_string()).collect(),
            pairing: PairingSettings::default(),
            http: HttpSettings::default(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        HttpSettings {
            timeout_secs: 15,
            delay_ms: 1000,
            max_retries: 3,
            backoff_ms: 1000,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}

/// Defaults, then the optional TOML file, then `SQSP_*` environment variables
/// (`SQSP_HTTP__DELAY_MS=500`, `SQSP_GENERIC_NAMES=blog,image`).
pub fn load(path: &Path) -> Result<Settings> {
    let config = Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("generic_names")
                .with_list_parse_key("image_selectors"),
        )
        .build()
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    config
        .try_deserialize()
        .with_context(|| format!("Invalid settings in {}", path.display()))
}

// ── Tests ──
