use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use zip::ZipArchive;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Append-capable keyed store for chapter units, one zip entry per chapter.
///
/// Entries are named `{number}.chapter`. Appending never rewrites existing
/// entries; the pipeline targets each key at most once per run per stage, and
/// a reader resolves a duplicated name to the most recently appended copy.
#[derive(Debug, Clone)]
pub struct ChapterArchive {
    path: PathBuf,
}

impl ChapterArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Enumerates stored chapter numbers without reading any content.
    /// An archive file that does not exist yet reads as the empty store.
    pub fn keys(&self) -> anyhow::Result<BTreeSet<u32>> {
        if !self.path.exists() {
            return Ok(BTreeSet::new());
        }
        let archive = self.open_reader()?;
        Ok(archive
            .file_names()
            .filter_map(chapter_number_from_entry)
            .collect())
    }

    pub fn contains(&self, number: u32) -> anyhow::Result<bool> {
        Ok(self.keys()?.contains(&number))
    }

    pub fn read_unit(&self, number: u32) -> anyhow::Result<String> {
        let mut archive = self.open_reader()?;
        let mut entry = archive
            .by_name(&entry_name(number))
            .with_context(|| format!("chapter {number} not in {}", self.path.display()))?;
        let mut contents = String::new();
        entry
            .read_to_string(&mut contents)
            .with_context(|| format!("read chapter {number} from {}", self.path.display()))?;
        Ok(contents)
    }

    /// Opens the archive for appending, creating it if absent.
    pub fn append_writer(&self) -> anyhow::Result<ArchiveWriter> {
        let zip = if self.path.exists() {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&self.path)
                .with_context(|| format!("open archive: {}", self.path.display()))?;
            ZipWriter::new_append(file)
                .with_context(|| format!("append to archive: {}", self.path.display()))?
        } else {
            let file = File::create(&self.path)
                .with_context(|| format!("create archive: {}", self.path.display()))?;
            ZipWriter::new(file)
        };

        Ok(ArchiveWriter {
            zip,
            path: self.path.clone(),
        })
    }

    fn open_reader(&self) -> anyhow::Result<ZipArchive<File>> {
        let file = File::open(&self.path)
            .with_context(|| format!("open archive: {}", self.path.display()))?;
        ZipArchive::new(file).with_context(|| format!("read archive: {}", self.path.display()))
    }
}

/// Write half of a [`ChapterArchive`]. [`ArchiveWriter::finish`] flushes the
/// central directory; call it instead of relying on drop.
pub struct ArchiveWriter {
    zip: ZipWriter<File>,
    path: PathBuf,
}

impl ArchiveWriter {
    pub fn write_unit(&mut self, number: u32, content: &[u8]) -> anyhow::Result<()> {
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o644);
        self.zip
            .start_file(entry_name(number), options)
            .with_context(|| format!("start chapter {number} in {}", self.path.display()))?;
        self.zip
            .write_all(content)
            .with_context(|| format!("write chapter {number} to {}", self.path.display()))?;
        Ok(())
    }

    pub fn finish(self) -> anyhow::Result<()> {
        self.zip
            .finish()
            .with_context(|| format!("finalize archive: {}", self.path.display()))?;
        Ok(())
    }
}

fn entry_name(number: u32) -> String {
    format!("{number}.chapter")
}

fn chapter_number_from_entry(name: &str) -> Option<u32> {
    name.strip_suffix(".chapter")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChapterArchive::new(dir.path().join("raw_chapters.zip"));

        let mut writer = store.append_writer().unwrap();
        writer.write_unit(1, b"first").unwrap();
        writer.write_unit(4, b"fourth").unwrap();
        writer.finish().unwrap();

        assert_eq!(store.keys().unwrap(), BTreeSet::from([1, 4]));
        assert_eq!(store.read_unit(4).unwrap(), "fourth");
        assert!(store.read_unit(2).is_err());
    }

    #[test]
    fn append_across_reopen_keeps_existing_units() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChapterArchive::new(dir.path().join("raw_chapters.zip"));

        let mut writer = store.append_writer().unwrap();
        writer.write_unit(1, b"one").unwrap();
        writer.finish().unwrap();

        let mut writer = store.append_writer().unwrap();
        writer.write_unit(2, b"two").unwrap();
        writer.finish().unwrap();

        assert_eq!(store.keys().unwrap(), BTreeSet::from([1, 2]));
        assert_eq!(store.read_unit(1).unwrap(), "one");
        assert_eq!(store.read_unit(2).unwrap(), "two");
    }

    #[test]
    fn absent_archive_is_the_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChapterArchive::new(dir.path().join("never_written.zip"));
        assert!(store.keys().unwrap().is_empty());
        assert!(!store.contains(1).unwrap());
    }

    #[test]
    fn foreign_entries_are_ignored_by_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.zip");

        let file = File::create(&path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        zip.start_file("3.chapter", options).unwrap();
        zip.write_all(b"three").unwrap();
        zip.start_file("notes.txt", options).unwrap();
        zip.write_all(b"ignored").unwrap();
        zip.finish().unwrap();

        let store = ChapterArchive::new(path);
        assert_eq!(store.keys().unwrap(), BTreeSet::from([3]));
    }
}
