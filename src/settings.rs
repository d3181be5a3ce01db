use crate::error::{Result, ViewerError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

/// Display configuration of the corpus, read once from `corpus.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusSettings {
    #[serde(default)]
    pub corpus_name: String,
    #[serde(default)]
    pub languages: Languages,
    /// Metadata fields listed in the header tooltip.
    #[serde(default)]
    pub viewable_meta: Vec<String>,
}

/// Language display names, either indexed by numeric language id or keyed by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Languages {
    List(Vec<String>),
    Map(HashMap<String, String>),
}

impl Default for Languages {
    fn default() -> Self {
        Languages::List(Vec::new())
    }
}

impl CorpusSettings {
    pub const FILE_NAME: &'static str = "corpus.json";

    /// Loads `corpus.json` from a settings directory.
    pub fn load(settings_dir: impl AsRef<Path>) -> Result<Self> {
        let path = settings_dir.as_ref().join(Self::FILE_NAME);
        let raw = fs::read_to_string(&path).map_err(|err| ViewerError::settings(&path, err))?;
        let settings = Self::from_json_str(&raw).map_err(|err| ViewerError::settings(&path, err))?;
        info!(
            path = %path.display(),
            corpus = %settings.corpus_name,
            viewable = settings.viewable_meta.len(),
            "Loaded corpus settings"
        );
        Ok(settings)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Display name for a language id; unknown ids are shown as-is.
    pub fn language_name(&self, lang_id: &str) -> String {
        let name = match &self.languages {
            Languages::List(names) => lang_id
                .parse::<usize>()
                .ok()
                .and_then(|idx| names.get(idx)),
            Languages::Map(names) => names.get(lang_id),
        };
        name.cloned().unwrap_or_else(|| lang_id.to_string())
    }
}
