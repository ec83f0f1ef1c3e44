use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

/// One fetch of a source's table of contents, plus the derived missing set.
///
/// `links` keys need not be contiguous or start at 1. For paginated sources
/// the snapshot is an accumulation: `insert_link` keeps `last_chapter` at the
/// running maximum, so a link number may exceed `last_chapter` only while
/// pages are still being merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub title: String,
    pub author: String,
    pub description: String,
    pub language: String,
    pub cover_url: String,
    pub last_chapter: u32,
    pub links: BTreeMap<u32, String>,
    pub missing: BTreeSet<u32>,
}

impl Catalog {
    /// Record one chapter link, growing `last_chapter` to the highest number
    /// observed so far.
    pub fn insert_link(&mut self, number: u32, locator: String) {
        if number > self.last_chapter {
            self.last_chapter = number;
        }
        self.links.insert(number, locator);
    }

    /// Every number in `[1, last_chapter]` without a link. Call only after
    /// all pages have been accumulated.
    pub fn missing_chapters(&self) -> BTreeSet<u32> {
        (1..=self.last_chapter)
            .filter(|n| !self.links.contains_key(n))
            .collect()
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("read catalog index: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parse catalog index: {}", path.display()))
    }

    pub fn load_if_exists(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    /// Overwrites the previous snapshot wholesale; snapshots are never merged.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = serde_json::to_string(self).context("serialize catalog index")?;
        std::fs::write(path, contents)
            .with_context(|| format!("write catalog index: {}", path.display()))
    }
}
