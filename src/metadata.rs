use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

/// Chapter number to parsed title, persisted separately from the parsed
/// store so assembly can label chapters without opening their bodies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TitleIndex {
    titles: BTreeMap<u32, String>,
}

impl TitleIndex {
    pub fn insert(&mut self, number: u32, title: String) {
        self.titles.insert(number, title);
    }

    pub fn get(&self, number: u32) -> Option<&str> {
        self.titles.get(&number).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("read title index: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parse title index: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = serde_json::to_string(self).context("serialize title index")?;
        std::fs::write(path, contents)
            .with_context(|| format!("write title index: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_digit_string_keys() {
        let mut index = TitleIndex::default();
        index.insert(1, "Prologue Ends".to_string());
        index.insert(12, "Chapter Twelve".to_string());

        let json = serde_json::to_string(&index).unwrap();
        assert!(json.starts_with('{'));
        assert!(json.contains("\"12\""));

        let reloaded: TitleIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(reloaded, index);
        assert_eq!(reloaded.get(12), Some("Chapter Twelve"));
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = TitleIndex::load_or_default(&dir.path().join("metadata.json")).unwrap();
        assert!(index.is_empty());
    }
}
