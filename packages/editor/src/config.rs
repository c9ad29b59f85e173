use crate::EditorResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tessera_reconciler::RenderConfig;

pub const DEFAULT_CONFIG_NAME: &str = "tessera.config.json";

/// Editor configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorConfig {
    /// Namespace handed to the presentation host
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Node type tag → class name
    #[serde(default)]
    pub theme: BTreeMap<String, String>,

    /// Transform rounds allowed per transaction
    #[serde(default = "default_max_transform_iterations")]
    pub max_transform_iterations: usize,

    /// Undo depth; 0 keeps every entry
    #[serde(default = "default_history_max_levels")]
    pub history_max_levels: usize,

    /// Whether commands may be dispatched
    #[serde(default = "default_editable")]
    pub editable: bool,
}

fn default_namespace() -> String {
    "tessera".to_string()
}

fn default_max_transform_iterations() -> usize {
    100
}

fn default_history_max_levels() -> usize {
    100
}

fn default_editable() -> bool {
    true
}

impl EditorConfig {
    /// Load config from a JSON file; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> EditorResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: EditorConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(EditorConfig::default())
        }
    }

    /// Load `tessera.config.json` from a directory.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> EditorResult<Self> {
        Self::load(dir.as_ref().join(DEFAULT_CONFIG_NAME))
    }

    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            namespace: self.namespace.clone(),
            theme: self.theme.clone(),
        }
    }

    /// Settings the presentation depends on differ, so it must be rebuilt.
    pub(crate) fn affects_presentation(&self, other: &EditorConfig) -> bool {
        self.namespace != other.namespace || self.theme != other.theme
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            theme: BTreeMap::new(),
            max_transform_iterations: default_max_transform_iterations(),
            history_max_levels: default_history_max_levels(),
            editable: default_editable(),
        }
    }
}
