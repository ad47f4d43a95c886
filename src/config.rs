use crate::cache::CacheLimits;
use crate::diff::{StreamOptions, DEFAULT_PENDING_HUNKS};
use crate::lfm::{LfmThresholds, OverrideMode, Preset};
use anyhow::Result;
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = "streamdiff";
const LOCAL_CONFIG: &str = ".streamdiff.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamdiffConfig {
    #[serde(default)]
    pub lfm: LfmConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// [lfm] section: a preset plus optional per-field overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LfmConfig {
    #[serde(default)]
    pub preset: Preset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_lines: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_line_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_hunks: Option<u64>,
    /// Per-file manual overrides; first match wins
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOverride {
    pub pattern: String,
    #[serde(default)]
    pub mode: OverrideMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_bytes")]
    pub max_bytes: usize,
    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_pending_hunks")]
    pub pending_hunks: usize,
    #[serde(default = "default_read_buffer")]
    pub read_buffer: usize,
    #[serde(default = "default_spool_limit")]
    pub spool_in_memory_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_true")]
    pub line_numbers: bool,
    #[serde(default = "default_tab_width")]
    pub tab_width: u8,
    /// Rows rendered beyond each edge of the viewport
    #[serde(default = "default_buffer_margin")]
    pub buffer_margin: usize,
}

fn default_true() -> bool {
    true
}

fn default_tab_width() -> u8 {
    4
}

fn default_buffer_margin() -> usize {
    20
}

fn default_cache_bytes() -> usize {
    CacheLimits::default().max_bytes
}

fn default_cache_entries() -> usize {
    CacheLimits::default().max_entries
}

fn default_pending_hunks() -> usize {
    DEFAULT_PENDING_HUNKS
}

fn default_read_buffer() -> usize {
    64 * 1024
}

fn default_spool_limit() -> usize {
    4 * 1024 * 1024
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_cache_bytes(),
            max_entries: default_cache_entries(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            pending_hunks: default_pending_hunks(),
            read_buffer: default_read_buffer(),
            spool_in_memory_limit: default_spool_limit(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            line_numbers: true,
            tab_width: default_tab_width(),
            buffer_margin: default_buffer_margin(),
        }
    }
}

impl LfmConfig {
    /// Thresholds for `preset` with this section's field overrides applied
    pub fn thresholds_for(&self, preset: Preset) -> LfmThresholds {
        let base = preset.thresholds();
        LfmThresholds {
            max_bytes: self.max_bytes.unwrap_or(base.max_bytes),
            max_lines: self.max_lines.unwrap_or(base.max_lines),
            max_line_length: self.max_line_length.unwrap_or(base.max_line_length),
            max_hunks: self.max_hunks.unwrap_or(base.max_hunks),
        }
    }

    pub fn thresholds(&self) -> LfmThresholds {
        self.thresholds_for(self.preset)
    }

    /// Override mode of the first `[[lfm.files]]` entry matching `path`.
    /// A pattern without `/` also matches against the file name alone.
    pub fn file_override(&self, path: &str) -> Option<OverrideMode> {
        let opts = MatchOptions {
            case_sensitive: true,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.files.iter().find_map(|entry| {
            let pattern = Pattern::new(&entry.pattern).ok()?;
            let hit = pattern.matches_with(path, opts)
                || (!entry.pattern.contains('/') && pattern.matches_with(&name, opts));
            hit.then_some(entry.mode)
        })
    }
}

impl CacheConfig {
    pub fn limits(&self) -> CacheLimits {
        CacheLimits {
            max_bytes: self.max_bytes,
            max_entries: self.max_entries,
        }
    }
}

impl StreamConfig {
    pub fn options(&self) -> StreamOptions {
        StreamOptions {
            pending_hunks: self.pending_hunks.max(1),
            read_buffer: self.read_buffer.max(1),
            ..StreamOptions::default()
        }
    }
}

fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR).join("config.toml"))
}

/// Load config by merging global defaults with per-repo overrides.
/// Priority: `<repo>/.streamdiff.toml` > `<config_dir>/streamdiff/config.toml` > built-in defaults.
/// Merging is deep: individual fields within sections (e.g. `[lfm]`) override independently.
pub fn load_config(repo_root: &Path) -> StreamdiffConfig {
    load_config_from(global_config_path().as_deref(), &repo_root.join(LOCAL_CONFIG))
}

fn read_table(path: &Path) -> Option<toml::map::Map<String, toml::Value>> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<toml::Table>(&content) {
        Ok(t) => Some(t),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed config");
            None
        }
    }
}

fn load_config_from(global: Option<&Path>, local: &Path) -> StreamdiffConfig {
    let global_table = global.and_then(read_table);
    let local_table = read_table(local);

    let merged = match (global_table, local_table) {
        (Some(mut global), Some(local)) => {
            deep_merge(&mut global, local);
            toml::Value::Table(global)
        }
        (Some(global), None) => toml::Value::Table(global),
        (None, Some(local)) => toml::Value::Table(local),
        (None, None) => return StreamdiffConfig::default(),
    };

    merged.try_into().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "config does not match schema, using defaults");
        StreamdiffConfig::default()
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

/// Persist `preset` in the global config file. Other keys in that file are
/// kept, and nothing from a repo's `.streamdiff.toml` is written.
pub fn save_preset(preset: Preset) -> Result<PathBuf> {
    let path = global_config_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    save_preset_to(preset, &path)?;
    Ok(path)
}

fn save_preset_to(preset: Preset, path: &Path) -> Result<()> {
    let mut table = match read_table(path) {
        Some(table) => table,
        None if path.exists() => anyhow::bail!("{} is not valid TOML", path.display()),
        None => toml::Table::new(),
    };
    let lfm = table
        .entry("lfm")
        .or_insert(toml::Value::Table(toml::Table::new()));
    let toml::Value::Table(lfm) = lfm else {
        anyhow::bail!("[lfm] in {} is not a table", path.display());
    };
    lfm.insert("preset".to_string(), toml::Value::String(preset.name().to_string()));

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, toml::to_string_pretty(&table)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn missing_files_give_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(None, &dir.path().join(LOCAL_CONFIG));
        assert_eq!(config.lfm.preset, Preset::Default);
        assert_eq!(config.lfm.thresholds(), LfmThresholds::DEFAULT);
        assert_eq!(config.cache.limits(), CacheLimits::default());
        assert_eq!(config.stream.pending_hunks, DEFAULT_PENDING_HUNKS);
        assert_eq!(config.display.buffer_margin, 20);
    }

    #[test]
    fn local_fields_override_global_fields() {
        let dir = tempfile::tempdir().unwrap();
        let global = write(
            dir.path(),
            "global.toml",
            "[lfm]\npreset = \"conservative\"\nmax_hunks = 50\n[cache]\nmax_entries = 10\n",
        );
        let local = write(dir.path(), LOCAL_CONFIG, "[lfm]\nmax_lines = 123\n");
        let config = load_config_from(Some(&global), &local);

        assert_eq!(config.lfm.preset, Preset::Conservative);
        let t = config.lfm.thresholds();
        assert_eq!(t.max_lines, 123);
        assert_eq!(t.max_hunks, 50);
        assert_eq!(t.max_bytes, LfmThresholds::CONSERVATIVE.max_bytes);
        assert_eq!(config.cache.max_entries, 10);
        assert_eq!(config.cache.max_bytes, default_cache_bytes());
    }

    #[test]
    fn malformed_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let local = write(dir.path(), LOCAL_CONFIG, "[lfm\npreset = ");
        let config = load_config_from(None, &local);
        assert_eq!(config.lfm.preset, Preset::Default);
    }

    #[test]
    fn file_overrides_first_match_wins() {
        let dir = tempfile::tempdir().unwrap();
        let local = write(
            dir.path(),
            LOCAL_CONFIG,
            r#"
[[lfm.files]]
pattern = "*.lock"
mode = "on"

[[lfm.files]]
pattern = "vendor/**"
mode = "off"

[[lfm.files]]
pattern = "vendor/big.lock"
mode = "auto"
"#,
        );
        let lfm = load_config_from(None, &local).lfm;
        assert_eq!(lfm.file_override("Cargo.lock"), Some(OverrideMode::On));
        assert_eq!(lfm.file_override("sub/dir/yarn.lock"), Some(OverrideMode::On));
        assert_eq!(lfm.file_override("vendor/lib/x.rs"), Some(OverrideMode::Off));
        assert_eq!(lfm.file_override("vendor/big.lock"), Some(OverrideMode::On));
        assert_eq!(lfm.file_override("src/main.rs"), None);
    }

    #[test]
    fn saved_preset_keeps_other_global_keys() {
        let dir = tempfile::tempdir().unwrap();
        let global = write(dir.path(), "global.toml", "[lfm]\nmax_lines = 7\n[cache]\nmax_entries = 9\n");
        save_preset_to(Preset::Aggressive, &global).unwrap();

        let loaded = load_config_from(Some(&global), &dir.path().join(LOCAL_CONFIG));
        assert_eq!(loaded.lfm.preset, Preset::Aggressive);
        assert_eq!(loaded.lfm.thresholds().max_lines, 7);
        assert_eq!(loaded.cache.max_entries, 9);
    }

    #[test]
    fn saved_preset_does_not_copy_repo_settings() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("nested").join("config.toml");
        write(
            dir.path(),
            LOCAL_CONFIG,
            "[lfm]\nmax_hunks = 3\n[[lfm.files]]\npattern = \"*.lock\"\nmode = \"on\"\n",
        );
        save_preset_to(Preset::Conservative, &global).unwrap();

        let saved = std::fs::read_to_string(&global).unwrap();
        assert!(saved.contains("conservative"));
        assert!(!saved.contains("max_hunks"));
        assert!(!saved.contains("*.lock"));
    }

    #[test]
    fn malformed_global_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let global = write(dir.path(), "global.toml", "[lfm\n");
        assert!(save_preset_to(Preset::Aggressive, &global).is_err());
        assert_eq!(std::fs::read_to_string(&global).unwrap(), "[lfm\n");
    }

    #[test]
    fn deep_merge_replaces_scalars_and_merges_tables() {
        let mut base: toml::map::Map<String, toml::Value> =
            toml::from_str("[a]\nx = 1\ny = 2\n[b]\nz = 3\n").unwrap();
        let overlay: toml::map::Map<String, toml::Value> = toml::from_str("[a]\ny = 20\n").unwrap();
        deep_merge(&mut base, overlay);
        let a = base.get("a").and_then(|v| v.as_table()).unwrap();
        assert_eq!(a.get("x").and_then(|v| v.as_integer()), Some(1));
        assert_eq!(a.get("y").and_then(|v| v.as_integer()), Some(20));
        let b = base.get("b").and_then(|v| v.as_table()).unwrap();
        assert_eq!(b.get("z").and_then(|v| v.as_integer()), Some(3));
    }
}
