use std::path::Path;

use anyhow::Context as _;
use regex::{Regex, RegexBuilder};

/// Case-insensitive alternation over blacklisted phrases, stripped from
/// chapter text before it is segmented into body lines.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    pattern: Option<Regex>,
}

impl Blacklist {
    /// Reads one phrase per line; blank lines are skipped. A file that does
    /// not exist yields an empty filter.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no blacklist file; filtering nothing");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("read blacklist: {}", path.display()))?;
        Self::from_phrases(contents.lines())
    }

    pub fn from_phrases<'a>(phrases: impl IntoIterator<Item = &'a str>) -> anyhow::Result<Self> {
        let escaped: Vec<String> = phrases
            .into_iter()
            .map(str::trim)
            .filter(|phrase| !phrase.is_empty())
            .map(regex::escape)
            .collect();

        if escaped.is_empty() {
            return Ok(Self::default());
        }

        let pattern = RegexBuilder::new(&format!("(?:{})", escaped.join("|")))
            .case_insensitive(true)
            .build()
            .context("compile blacklist pattern")?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }

    pub fn strip(&self, text: &str) -> String {
        match &self.pattern {
            Some(pattern) => pattern.replace_all(text, "").into_owned(),
            None => text.to_string(),
        }
    }

    /// Strips every match, then segments into non-empty trimmed lines.
    pub fn segments(&self, text: &str) -> Vec<String> {
        self.strip(text)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}
