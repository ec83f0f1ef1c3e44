use std::path::{Path, PathBuf};

use anyhow::Context as _;

/// On-disk layout for one (novel, source) pair.
#[derive(Debug, Clone)]
pub struct NovelPaths {
    pub dir: PathBuf,
    pub raw_archive: PathBuf,
    pub parsed_archive: PathBuf,
    pub info: PathBuf,
    pub metadata: PathBuf,
    pub epub: PathBuf,
}

impl NovelPaths {
    /// Creates `<base>/<title>_<source>/` (special filesystem characters
    /// stripped) and lays out the fixed file names inside it.
    pub fn prepare(base: &Path, title: &str, source: &str) -> anyhow::Result<Self> {
        let folder = sanitize_file_name(&format!("{title}_{source}"));
        let dir = base.join(folder);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create output dir: {}", dir.display()))?;

        Ok(Self {
            raw_archive: dir.join("raw_chapters.zip"),
            parsed_archive: dir.join("parsed_chapters.zip"),
            info: dir.join("info.json"),
            metadata: dir.join("metadata.json"),
            epub: dir.join(format!("{}.epub", sanitize_file_name(title))),
            dir,
        })
    }

    /// Cover image path; extension taken from the locator suffix.
    pub fn cover(&self, cover_url: &str) -> PathBuf {
        self.dir.join(format!("cover.{}", cover_extension(cover_url)))
    }
}

pub fn sanitize_file_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
        .collect()
}

fn cover_extension(cover_url: &str) -> String {
    let Some((_, tail)) = cover_url.rsplit_once('.') else {
        return "img".to_string();
    };
    let ext: String = tail
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    if ext.is_empty() { "img".to_string() } else { ext }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_characters_are_stripped() {
        assert_eq!(
            sanitize_file_name(r#"Sword: God/Emperor? "Vol<1>"|"#),
            "Sword GodEmperor Vol1"
        );
    }

    #[test]
    fn layout_uses_fixed_file_names() {
        let temp = tempfile::tempdir().unwrap();
        let paths = NovelPaths::prepare(temp.path(), "My Novel", "readnovelfull").unwrap();

        assert!(paths.dir.ends_with("My Novel_readnovelfull"));
        assert!(paths.dir.is_dir());
        assert_eq!(
            paths.raw_archive.file_name().unwrap(),
            "raw_chapters.zip"
        );
        assert_eq!(paths.epub.file_name().unwrap(), "My Novel.epub");
    }

    #[test]
    fn cover_extension_comes_from_locator_suffix() {
        let temp = tempfile::tempdir().unwrap();
        let paths = NovelPaths::prepare(temp.path(), "N", "s").unwrap();

        assert!(
            paths
                .cover("https://cdn.example.test/covers/1.jpg")
                .ends_with("cover.jpg")
        );
        assert!(
            paths
                .cover("https://cdn.example.test/covers/1.png?v=2")
                .ends_with("cover.png")
        );
        assert!(paths.cover("no-extension").ends_with("cover.img"));
    }
}
