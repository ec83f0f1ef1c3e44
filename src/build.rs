use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::archive::ChapterArchive;
use crate::blacklist::Blacklist;
use crate::catalog::Catalog;
use crate::cli::{BuildArgs, confirm};
use crate::epub;
use crate::metadata::TitleIndex;
use crate::paths::NovelPaths;
use crate::pipeline::run_stage;
use crate::sources::{self, Source};
use crate::sync;

/// Parse-stage pool size; parsing is local CPU work, not rate limited.
const PARSE_WORKERS: usize = 8;

pub fn run(args: BuildArgs) -> anyhow::Result<()> {
    let source = sources::select(&args.url).context("select source adapter")?;
    execute(source.as_ref(), &args)
}

/// Runs the whole pipeline against an already-selected source: catalog →
/// delta → fetch → cover → parse → assemble.
pub fn execute(source: &dyn Source, args: &BuildArgs) -> anyhow::Result<()> {
    let blacklist = Blacklist::load(Path::new(&args.blacklist)).context("load blacklist")?;

    tracing::info!(source = source.name(), url = %args.url, "fetching catalog");
    let mut catalog = source.fetch_catalog(&args.url).context("fetch catalog")?;
    announce(&catalog);

    let paths = NovelPaths::prepare(Path::new(&args.output), &catalog.title, source.name())
        .context("prepare output layout")?;

    let raw = ChapterArchive::new(&paths.raw_archive);
    let parsed = ChapterArchive::new(&paths.parsed_archive);

    // The persisted snapshot only counts when the raw archive it described
    // is still there.
    let persisted = if paths.raw_archive.exists() {
        Catalog::load_if_exists(&paths.info).context("load persisted catalog")?
    } else {
        None
    };
    match &persisted {
        Some(prev) => tracing::info!(
            last_chapter = prev.last_chapter,
            chapters = prev.links.len(),
            "archive found, checking for updates"
        ),
        None => tracing::info!("no archive found, starting fresh"),
    }

    let delta = sync::compute_delta(&catalog, persisted.as_ref());
    catalog.missing = delta.missing.clone();

    // Chapters the catalog diff missed but the raw store never received
    // (earlier per-chapter failures) are retried on this run.
    let stored = raw.keys().context("enumerate raw store")?;
    let mut to_fetch: BTreeSet<u32> = delta.to_fetch;
    to_fetch.extend(catalog.links.keys().filter(|&n| !stored.contains(n)));

    tracing::info!(
        to_fetch = to_fetch.len(),
        missing = catalog.missing.len(),
        "computed delta"
    );

    if to_fetch.is_empty() {
        tracing::info!("archive up to date, nothing to fetch");
    } else if args.no_download {
        tracing::warn!("skipping download stage on request");
    } else {
        if !args.yes && !confirm(&format!("download {} chapters?", to_fetch.len()))? {
            anyhow::bail!("aborted before download");
        }
        let fetched = fetch_stage(source, &catalog, &raw, &to_fetch)?;
        tracing::info!(fetched, "download stage complete");
    }

    let cover = if args.no_cover {
        None
    } else {
        download_cover(source, &catalog, &paths)
    };

    // Snapshot persisted wholesale; the next run diffs against it.
    catalog.save(&paths.info).context("persist catalog")?;

    let mut titles = TitleIndex::load_or_default(&paths.metadata).context("load title index")?;
    let to_parse = parse_work_set(&raw, &parsed, &paths.metadata)?;

    if to_parse.is_empty() {
        tracing::info!("nothing to parse");
    } else if args.no_parse {
        tracing::warn!("skipping parse stage on request");
    } else {
        if !args.yes && !confirm(&format!("parse {} chapters?", to_parse.len()))? {
            anyhow::bail!("aborted before parse");
        }
        let parsed_count = parse_stage(source, &blacklist, &raw, &parsed, &mut titles, &to_parse)?;
        tracing::info!(parsed = parsed_count, "parse stage complete");
    }

    titles.save(&paths.metadata).context("persist title index")?;

    if !args.yes && !confirm("assemble the EPUB?")? {
        anyhow::bail!("aborted before assembly");
    }

    let options = epub::AssembleOptions {
        include_missing: !args.no_missing,
        cover,
    };
    epub::assemble(&paths.epub, &catalog, &titles, &parsed, &options).context("assemble epub")?;

    tracing::info!(book = %paths.epub.display(), "book written");
    Ok(())
}

fn announce(catalog: &Catalog) {
    let description: String = catalog.description.chars().take(30).collect();
    let ellipsis = if catalog.description.chars().count() > 30 {
        "..."
    } else {
        ""
    };
    tracing::info!(
        language = %catalog.language,
        "{} - {} ({description}{ellipsis})",
        catalog.title,
        catalog.author
    );
    tracing::info!(
        last_chapter = catalog.last_chapter,
        chapters = catalog.links.len(),
        "catalog fetched"
    );
}

/// Stage 1: fetch raw chapters into the raw store, pool size from the
/// adapter's rate limit.
fn fetch_stage(
    source: &dyn Source,
    catalog: &Catalog,
    raw: &ChapterArchive,
    to_fetch: &BTreeSet<u32>,
) -> anyhow::Result<usize> {
    let mut writer = raw.append_writer()?;
    let written = run_stage(
        "fetch",
        to_fetch,
        source.max_concurrent_fetches(),
        |number| {
            let Some(locator) = catalog.links.get(&number) else {
                tracing::warn!("no locator for chapter {number}, skipping");
                return Ok(None);
            };
            source.fetch(locator).map(Some)
        },
        |number, body: String| writer.write_unit(number, body.as_bytes()),
    )?;
    writer.finish()?;
    Ok(written)
}

/// Chapters present in the raw store but absent from the parsed store. When
/// the title index is gone everything is reparsed, since assembly needs the
/// titles back.
fn parse_work_set(
    raw: &ChapterArchive,
    parsed: &ChapterArchive,
    metadata_path: &Path,
) -> anyhow::Result<BTreeSet<u32>> {
    let raw_keys = raw.keys().context("enumerate raw store")?;
    if !metadata_path.exists() {
        return Ok(raw_keys);
    }
    let parsed_keys = parsed.keys().context("enumerate parsed store")?;
    Ok(raw_keys.difference(&parsed_keys).copied().collect())
}

/// Stage 2: parse raw units into the parsed store and collect titles.
fn parse_stage(
    source: &dyn Source,
    blacklist: &Blacklist,
    raw: &ChapterArchive,
    parsed: &ChapterArchive,
    titles: &mut TitleIndex,
    to_parse: &BTreeSet<u32>,
) -> anyhow::Result<usize> {
    let mut writer = parsed.append_writer()?;
    let written = run_stage(
        "parse",
        to_parse,
        PARSE_WORKERS,
        |number| {
            let html = raw.read_unit(number)?;
            source.parse_chapter(&html, blacklist).map(Some)
        },
        |number, chapter| {
            let doc = epub::chapter_document(&chapter.title, &chapter.body);
            writer.write_unit(number, doc.as_bytes())?;
            titles.insert(number, chapter.title);
            Ok(())
        },
    )?;
    writer.finish()?;
    Ok(written)
}

/// Best-effort cover download; a failure never aborts the run.
fn download_cover(
    source: &dyn Source,
    catalog: &Catalog,
    paths: &NovelPaths,
) -> Option<PathBuf> {
    if catalog.cover_url.is_empty() {
        tracing::info!("catalog has no cover locator");
        return None;
    }

    let path = paths.cover(&catalog.cover_url);
    if path.is_file() {
        tracing::info!(cover = %path.display(), "cover already downloaded");
        return Some(path);
    }

    tracing::info!(url = %catalog.cover_url, "downloading cover");
    match source
        .fetch_bytes(&catalog.cover_url)
        .and_then(|bytes| std::fs::write(&path, bytes).context("write cover"))
    {
        Ok(()) => Some(path),
        Err(err) => {
            tracing::warn!("cover download failed: {err:#}");
            None
        }
    }
}
