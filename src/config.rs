use crate::git::Limits;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrvConfig {
    #[serde(default)]
    pub vcs: VcsConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub picker: PickerConfig,
}

/// [vcs] section: bounds for every git invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VcsConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

/// [watch] section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Glob, relative to the workspace root, naming manifest files to follow
    #[serde(default = "default_manifest_glob")]
    pub manifest_glob: String,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationConfig {
    /// How long to wait for a flag's diff to become active before giving up on the reveal
    #[serde(default = "default_reveal_timeout_ms")]
    pub reveal_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickerConfig {
    #[serde(default = "default_skip_dirs")]
    pub skip_dirs: Vec<String>,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_output_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_manifest_glob() -> String {
    "**/.review/review.json".into()
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_reveal_timeout_ms() -> u64 {
    2000
}

fn default_skip_dirs() -> Vec<String> {
    ["node_modules", ".git", "dist", "out", "build", "target"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_max_depth() -> usize {
    10
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            manifest_glob: default_manifest_glob(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            reveal_timeout_ms: default_reveal_timeout_ms(),
        }
    }
}

impl Default for PickerConfig {
    fn default() -> Self {
        Self {
            skip_dirs: default_skip_dirs(),
            max_depth: default_max_depth(),
        }
    }
}

impl VcsConfig {
    pub fn limits(&self) -> Limits {
        Limits {
            timeout: Duration::from_secs(self.timeout_secs),
            max_output: self.max_output_bytes,
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl NavigationConfig {
    pub fn reveal_timeout(&self) -> Duration {
        Duration::from_millis(self.reveal_timeout_ms)
    }
}

/// Load config by merging global defaults with per-workspace overrides.
/// Priority: `.grv-config.toml` in the workspace > `~/.config/grv/config.toml` > built-in defaults.
/// Merging is deep: fields within a section override independently.
pub fn load_config(workspace: &Path) -> GrvConfig {
    let global = dirs::config_dir()
        .map(|d| d.join("grv/config.toml"))
        .and_then(|p| std::fs::read_to_string(p).ok());
    let local = std::fs::read_to_string(workspace.join(".grv-config.toml")).ok();
    merge_sources(global.as_deref(), local.as_deref())
}

/// Parse a whole TOML document into its top-level table
fn parse_table(content: &str) -> Option<toml::Table> {
    match content.parse::<toml::Table>() {
        Ok(table) => Some(table),
        Err(e) => {
            log::warn!("Ignoring malformed config: {}", e);
            None
        }
    }
}

fn merge_sources(global: Option<&str>, local: Option<&str>) -> GrvConfig {
    let global_table = global.and_then(parse_table);
    let local_table = local.and_then(parse_table);

    let merged = match (global_table, local_table) {
        (Some(mut global), Some(local)) => {
            deep_merge(&mut global, local);
            toml::Value::Table(global)
        }
        (Some(global), None) => toml::Value::Table(global),
        (None, Some(local)) => toml::Value::Table(local),
        (None, None) => return GrvConfig::default(),
    };

    merged.try_into().unwrap_or_else(|e| {
        log::warn!("Config does not match the expected shape, using defaults: {}", e);
        GrvConfig::default()
    })
}

/// Recursively merge `overlay` into `base`. Overlay values win; nested tables are merged recursively.
fn deep_merge(
    base: &mut toml::map::Map<String, toml::Value>,
    overlay: toml::map::Map<String, toml::Value>,
) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(overlay_table)) => {
                deep_merge(base_table, overlay_table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
