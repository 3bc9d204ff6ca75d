use anyhow::{anyhow, Context};
use pcsmerge_engine::{CaseLayout, DriverConfig, Language, PrinterConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the settings file looked up inside a case directory.
pub const SETTINGS_FILE: &str = "pcsmerge.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub files: FileSettings,
    #[serde(default)]
    pub merge: MergeSettings,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSettings {
    #[serde(default = "default_base_stem")]
    pub base_stem: String,
    #[serde(default = "default_left_stem")]
    pub left_stem: String,
    #[serde(default = "default_right_stem")]
    pub right_stem: String,
    #[serde(default = "default_merged_stem")]
    pub merged_stem: String,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            base_stem: default_base_stem(),
            left_stem: default_left_stem(),
            right_stem: default_right_stem(),
            merged_stem: default_merged_stem(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeSettings {
    /// Language name; inferred from the file extension when absent.
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default = "default_left_label")]
    pub left_label: String,
    #[serde(default = "default_right_label")]
    pub right_label: String,
    #[serde(default)]
    pub write_report: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            left_label: default_left_label(),
            right_label: default_right_label(),
            write_report: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            log_dir: None,
        }
    }
}

fn default_base_stem() -> String {
    "file_base".into()
}
fn default_left_stem() -> String {
    "file_left".into()
}
fn default_right_stem() -> String {
    "file_right".into()
}
fn default_merged_stem() -> String {
    "file_merged".into()
}
fn default_left_label() -> String {
    "LEFT".into()
}
fn default_right_label() -> String {
    "RIGHT".into()
}
fn default_level() -> String {
    "info".into()
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&content)
            .with_context(|| format!("parsing settings {}", path.display()))?;
        Ok(settings)
    }

    /// Settings from `explicit` if given, else from the case directory's
    /// settings file if it exists, else defaults.
    pub fn resolve(explicit: Option<&Path>, case_dir: &Path) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading settings");
                Self::load(path)
            }
            None => {
                let local = case_dir.join(SETTINGS_FILE);
                if local.is_file() {
                    tracing::debug!(path = %local.display(), "loading case settings");
                    Self::load(&local)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn language(&self) -> anyhow::Result<Option<Language>> {
        self.merge
            .language
            .as_deref()
            .map(|name| Language::from_name(name).ok_or_else(|| anyhow!("unknown language {:?}", name)))
            .transpose()
    }

    pub fn driver_config(&self) -> anyhow::Result<DriverConfig> {
        Ok(DriverConfig {
            language: self.language()?,
            layout: CaseLayout {
                base_stem: self.files.base_stem.clone(),
                left_stem: self.files.left_stem.clone(),
                right_stem: self.files.right_stem.clone(),
                merged_stem: self.files.merged_stem.clone(),
            },
            printer: PrinterConfig {
                left_label: self.output.left_label.clone(),
                right_label: self.output.right_label.clone(),
            },
        })
    }
}
