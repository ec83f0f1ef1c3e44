use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::Utc;
use zip::write::SimpleFileOptions;

use crate::archive::ChapterArchive;
use crate::catalog::Catalog;
use crate::metadata::TitleIndex;

#[derive(Debug, Clone, Default)]
pub struct AssembleOptions {
    /// Emit placeholder pages for chapters the source never listed.
    pub include_missing: bool,
    /// Cover image already downloaded next to the archives, if any.
    pub cover: Option<PathBuf>,
}

/// Renders one parsed chapter into the minimal body document stored in the
/// parsed archive: a heading plus one paragraph per body segment.
pub fn chapter_document(title: &str, body: &[String]) -> String {
    let mut out = String::new();
    out.push_str(&format!("<h1>{}</h1>\n", xml_escape(title)));
    for segment in body {
        out.push_str(&format!("<p>{}</p>\n", xml_escape(segment)));
    }
    out
}

/// Builds the EPUB from the parsed store, the title index, and the catalog.
/// Bodies are streamed one unit at a time; a chapter expected but absent from
/// the parsed store is treated like a missing chapter with a logged notice.
pub fn assemble(
    out_path: &Path,
    catalog: &Catalog,
    titles: &TitleIndex,
    parsed: &ChapterArchive,
    options: &AssembleOptions,
) -> anyhow::Result<()> {
    let lang = lang_tag(&catalog.language);
    let mut chapters: Vec<ChapterSpec> = Vec::new();

    for number in 1..=catalog.last_chapter {
        let listed_missing = catalog.missing.contains(&number);
        let body_doc = if listed_missing {
            None
        } else {
            match parsed.read_unit(number) {
                Ok(doc) => Some(doc),
                Err(err) => {
                    tracing::warn!("chapter {number} absent from parsed store: {err:#}");
                    None
                }
            }
        };

        let (title, body_doc) = match body_doc {
            Some(doc) => {
                let title = titles
                    .get(number)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Chapter {number}"));
                (title, doc)
            }
            None => {
                if !options.include_missing {
                    tracing::info!("leaving missing chapter {number} out of the book");
                    continue;
                }
                (
                    format!("Chapter {number}: Missing"),
                    missing_chapter_document(&catalog.title, number),
                )
            }
        };

        chapters.push(ChapterSpec {
            stem: format!("ch{number}"),
            title,
            body_doc,
        });
    }

    if chapters.is_empty() {
        anyhow::bail!("no chapters available to assemble");
    }

    let cover = match &options.cover {
        Some(path) if path.is_file() => Some(CoverSpec::load(path)?),
        Some(path) => {
            tracing::warn!("cover file missing, building without it: {}", path.display());
            None
        }
        None => None,
    };

    let uuid = uuid::Uuid::new_v4();
    let modified = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    let out_file = File::create(out_path)
        .with_context(|| format!("create epub output: {}", out_path.display()))?;
    let mut zip = zip::ZipWriter::new(out_file);

    // Per EPUB spec, `mimetype` MUST be the first entry and MUST be stored.
    let mimetype_options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    zip.start_file("mimetype", mimetype_options)
        .context("epub start_file mimetype")?;
    zip.write_all(b"application/epub+zip")
        .context("epub write mimetype")?;

    let deflated_options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    zip.start_file("META-INF/container.xml", deflated_options)
        .context("epub start_file container.xml")?;
    zip.write_all(render_container_xml().as_bytes())
        .context("epub write container.xml")?;

    zip.start_file("OEBPS/content.opf", deflated_options)
        .context("epub start_file content.opf")?;
    zip.write_all(
        render_content_opf(catalog, lang, uuid, &modified, &chapters, cover.as_ref()).as_bytes(),
    )
    .context("epub write content.opf")?;

    zip.start_file("OEBPS/nav.xhtml", deflated_options)
        .context("epub start_file nav.xhtml")?;
    zip.write_all(render_nav_xhtml(&catalog.title, lang, &chapters).as_bytes())
        .context("epub write nav.xhtml")?;

    zip.start_file("OEBPS/toc.ncx", deflated_options)
        .context("epub start_file toc.ncx")?;
    zip.write_all(render_toc_ncx(&catalog.title, uuid, &chapters).as_bytes())
        .context("epub write toc.ncx")?;

    zip.start_file("OEBPS/style.css", deflated_options)
        .context("epub start_file style.css")?;
    zip.write_all(default_style_css().as_bytes())
        .context("epub write style.css")?;

    if let Some(cover) = &cover {
        zip.start_file(format!("OEBPS/{}", cover.file_name), deflated_options)
            .context("epub start_file cover")?;
        zip.write_all(&cover.bytes).context("epub write cover")?;
    }

    for chapter in &chapters {
        let xhtml = wrap_xhtml_document(&chapter.title, lang, &chapter.body_doc);
        zip.start_file(format!("OEBPS/{}.xhtml", chapter.stem), deflated_options)
            .with_context(|| format!("epub start_file chapter: {}", chapter.stem))?;
        zip.write_all(xhtml.as_bytes())
            .with_context(|| format!("epub write chapter: {}", chapter.stem))?;
    }

    zip.finish().context("epub finish zip")?;
    Ok(())
}

#[derive(Debug)]
struct ChapterSpec {
    stem: String,
    title: String,
    body_doc: String,
}

#[derive(Debug)]
struct CoverSpec {
    file_name: String,
    media_type: &'static str,
    bytes: Vec<u8>,
}

impl CoverSpec {
    fn load(path: &Path) -> anyhow::Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow::anyhow!("invalid cover file name: {}", path.display()))?
            .to_string();
        let bytes =
            std::fs::read(path).with_context(|| format!("read cover: {}", path.display()))?;
        Ok(Self {
            media_type: media_type_for_image(&file_name),
            file_name,
            bytes,
        })
    }
}

fn missing_chapter_document(novel_title: &str, number: u32) -> String {
    let query: String = url::form_urlencoded::byte_serialize(novel_title.as_bytes()).collect();
    let search = format!("https://www.google.com/search?q={query}+chapter+{number}");
    format!(
        "<h1>Missing Chapter {number}</h1>\n\
         <p>No content found for chapter {number}.</p>\n\
         <p><a href=\"{}\" rel=\"noreferrer\">Search the web</a></p>\n",
        xml_escape(&search)
    )
}

/// Keeps a plausible BCP-47 tag, falls back to `und`.
fn lang_tag(raw: &str) -> &str {
    let raw = raw.trim();
    let plausible = !raw.is_empty()
        && raw.len() <= 35
        && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if plausible { raw } else { "und" }
}

fn render_container_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#
    .to_string()
}

fn default_style_css() -> String {
    r#"@charset "utf-8";

html { font-family: serif; }
body { margin: 0; padding: 0 1.2em; line-height: 1.6; }
h1 { font-size: 1.4em; }
img { max-width: 100%; height: auto; }
"#
    .to_string()
}

fn render_nav_xhtml(title: &str, lang: &str, chapters: &[ChapterSpec]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" lang=\"{}\" xml:lang=\"{}\">\n",
        xml_escape(lang),
        xml_escape(lang)
    ));
    out.push_str("<head>\n");
    out.push_str(&format!("  <title>{}</title>\n", xml_escape(title)));
    out.push_str("  <meta charset=\"utf-8\" />\n");
    out.push_str("  <link rel=\"stylesheet\" type=\"text/css\" href=\"style.css\" />\n");
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str(&format!("  <h1>{}</h1>\n", xml_escape(title)));
    out.push_str("  <nav epub:type=\"toc\" id=\"toc\">\n");
    out.push_str("    <ol>\n");
    for chapter in chapters {
        out.push_str(&format!(
            "      <li><a href=\"{}.xhtml\">{}</a></li>\n",
            xml_escape(&chapter.stem),
            xml_escape(&chapter.title)
        ));
    }
    out.push_str("    </ol>\n");
    out.push_str("  </nav>\n");
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

fn render_toc_ncx(title: &str, uuid: uuid::Uuid, chapters: &[ChapterSpec]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str(
        "<!DOCTYPE ncx PUBLIC \"-//NISO//DTD ncx 2005-1//EN\" \"http://www.daisy.org/z3986/2005/ncx-2005-1.dtd\">\n",
    );
    out.push_str("<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\">\n");
    out.push_str("  <head>\n");
    out.push_str(&format!(
        "    <meta name=\"dtb:uid\" content=\"urn:uuid:{}\" />\n",
        xml_escape(&uuid.to_string())
    ));
    out.push_str("    <meta name=\"dtb:depth\" content=\"1\" />\n");
    out.push_str("    <meta name=\"dtb:totalPageCount\" content=\"0\" />\n");
    out.push_str("    <meta name=\"dtb:maxPageNumber\" content=\"0\" />\n");
    out.push_str("  </head>\n");
    out.push_str("  <docTitle><text>");
    out.push_str(&xml_escape(title));
    out.push_str("</text></docTitle>\n");
    out.push_str("  <navMap>\n");
    for (idx, chapter) in chapters.iter().enumerate() {
        let play = idx + 1;
        out.push_str(&format!(
            "    <navPoint id=\"navPoint-{play}\" playOrder=\"{play}\">\n"
        ));
        out.push_str("      <navLabel><text>");
        out.push_str(&xml_escape(&chapter.title));
        out.push_str("</text></navLabel>\n");
        out.push_str(&format!(
            "      <content src=\"{}.xhtml\" />\n",
            xml_escape(&chapter.stem)
        ));
        out.push_str("    </navPoint>\n");
    }
    out.push_str("  </navMap>\n");
    out.push_str("</ncx>\n");
    out
}

fn render_content_opf(
    catalog: &Catalog,
    lang: &str,
    uuid: uuid::Uuid,
    modified: &str,
    chapters: &[ChapterSpec],
    cover: Option<&CoverSpec>,
) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str(&format!(
        "<package xmlns=\"http://www.idpf.org/2007/opf\" unique-identifier=\"bookid\" version=\"3.0\" xml:lang=\"{}\">\n",
        xml_escape(lang)
    ));
    out.push_str("  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n");
    out.push_str(&format!(
        "    <dc:identifier id=\"bookid\">urn:uuid:{}</dc:identifier>\n",
        xml_escape(&uuid.to_string())
    ));
    out.push_str(&format!(
        "    <dc:title>{}</dc:title>\n",
        xml_escape(&catalog.title)
    ));
    out.push_str(&format!(
        "    <dc:language>{}</dc:language>\n",
        xml_escape(lang)
    ));
    if !catalog.author.is_empty() {
        out.push_str(&format!(
            "    <dc:creator>{}</dc:creator>\n",
            xml_escape(&catalog.author)
        ));
    }
    if !catalog.description.is_empty() {
        out.push_str(&format!(
            "    <dc:description>{}</dc:description>\n",
            xml_escape(&catalog.description)
        ));
    }
    out.push_str(&format!(
        "    <meta property=\"dcterms:modified\">{}</meta>\n",
        xml_escape(modified)
    ));
    if cover.is_some() {
        out.push_str("    <meta name=\"cover\" content=\"cover-image\" />\n");
    }
    out.push_str("  </metadata>\n");
    out.push_str("  <manifest>\n");
    out.push_str(
        "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\" />\n",
    );
    out.push_str(
        "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\" />\n",
    );
    out.push_str("    <item id=\"css\" href=\"style.css\" media-type=\"text/css\" />\n");
    if let Some(cover) = cover {
        out.push_str(&format!(
            "    <item id=\"cover-image\" href=\"{}\" media-type=\"{}\" properties=\"cover-image\" />\n",
            xml_escape(&cover.file_name),
            cover.media_type
        ));
    }
    for chapter in chapters {
        out.push_str(&format!(
            "    <item id=\"{}\" href=\"{}.xhtml\" media-type=\"application/xhtml+xml\" />\n",
            xml_escape(&chapter.stem),
            xml_escape(&chapter.stem)
        ));
    }
    out.push_str("  </manifest>\n");
    out.push_str("  <spine toc=\"ncx\">\n");
    for chapter in chapters {
        out.push_str(&format!(
            "    <itemref idref=\"{}\" />\n",
            xml_escape(&chapter.stem)
        ));
    }
    out.push_str("  </spine>\n");
    out.push_str("</package>\n");
    out
}

fn media_type_for_image(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

fn wrap_xhtml_document(title: &str, lang: &str, body_html: &str) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" lang=\"{}\" xml:lang=\"{}\">\n",
        xml_escape(lang),
        xml_escape(lang)
    ));
    out.push_str("<head>\n");
    out.push_str(&format!("  <title>{}</title>\n", xml_escape(title)));
    out.push_str("  <meta charset=\"utf-8\" />\n");
    out.push_str("  <link rel=\"stylesheet\" type=\"text/css\" href=\"style.css\" />\n");
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str(body_html);
    if !body_html.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use std::io::Read as _;

    use super::*;

    #[test]
    fn chapter_document_escapes_markup() {
        let doc = chapter_document(
            "Q & A <1>",
            &["first <line>".to_string(), "second".to_string()],
        );
        assert!(doc.contains("<h1>Q &amp; A &lt;1&gt;</h1>"));
        assert!(doc.contains("<p>first &lt;line&gt;</p>"));
        assert!(doc.contains("<p>second</p>"));
    }

    #[test]
    fn lang_tag_falls_back_to_und() {
        assert_eq!(lang_tag("en"), "en");
        assert_eq!(lang_tag("en-US"), "en-US");
        assert_eq!(lang_tag(""), "und");
        assert_eq!(lang_tag("not a tag!"), "und");
    }

    fn read_entry(path: &Path, name: &str) -> String {
        let file = File::open(path).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        let mut entry = zip.by_name(name).unwrap();
        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        contents
    }

    fn fixture() -> (tempfile::TempDir, Catalog, TitleIndex, ChapterArchive) {
        let temp = tempfile::tempdir().unwrap();

        let mut catalog = Catalog {
            title: "Test Novel".to_string(),
            author: "A. Author".to_string(),
            language: "en".to_string(),
            ..Catalog::default()
        };
        catalog.insert_link(1, "u1".to_string());
        catalog.insert_link(3, "u3".to_string());
        catalog.missing = catalog.missing_chapters();

        let mut titles = TitleIndex::default();
        titles.insert(1, "One".to_string());
        titles.insert(3, "Three".to_string());

        let parsed = ChapterArchive::new(temp.path().join("parsed_chapters.zip"));
        let mut writer = parsed.append_writer().unwrap();
        for number in [1_u32, 3] {
            let doc =
                chapter_document(&format!("Chapter {number}"), &[format!("body {number}")]);
            writer.write_unit(number, doc.as_bytes()).unwrap();
        }
        writer.finish().unwrap();

        (temp, catalog, titles, parsed)
    }

    #[test]
    fn assemble_includes_placeholder_pages_for_missing_chapters() {
        let (temp, catalog, titles, parsed) = fixture();
        let out = temp.path().join("book.epub");

        assemble(
            &out,
            &catalog,
            &titles,
            &parsed,
            &AssembleOptions {
                include_missing: true,
                cover: None,
            },
        )
        .unwrap();

        let opf = read_entry(&out, "OEBPS/content.opf");
        assert!(opf.contains("<dc:title>Test Novel</dc:title>"));
        assert!(opf.contains("<dc:creator>A. Author</dc:creator>"));

        let nav = read_entry(&out, "OEBPS/nav.xhtml");
        assert!(nav.contains("One"));
        assert!(nav.contains("Chapter 2: Missing"));

        let ch2 = read_entry(&out, "OEBPS/ch2.xhtml");
        assert!(ch2.contains("Missing Chapter 2"));
        assert!(ch2.contains("google.com/search?q=Test+Novel+chapter+2"));
    }

    #[test]
    fn assemble_can_leave_missing_chapters_out() {
        let (temp, catalog, titles, parsed) = fixture();
        let out = temp.path().join("book.epub");

        assemble(&out, &catalog, &titles, &parsed, &AssembleOptions::default()).unwrap();

        let file = File::open(&out).unwrap();
        let zip = zip::ZipArchive::new(file).unwrap();
        let names: Vec<&str> = zip.file_names().collect();
        assert!(names.contains(&"OEBPS/ch1.xhtml"));
        assert!(names.contains(&"OEBPS/ch3.xhtml"));
        assert!(!names.contains(&"OEBPS/ch2.xhtml"));
    }

    #[test]
    fn mimetype_is_the_first_stored_entry() {
        let (temp, catalog, titles, parsed) = fixture();
        let out = temp.path().join("book.epub");
        assemble(&out, &catalog, &titles, &parsed, &AssembleOptions::default()).unwrap();

        let file = File::open(&out).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        let entry = zip.by_index(0).unwrap();
        assert_eq!(entry.name(), "mimetype");
        assert_eq!(entry.compression(), zip::CompressionMethod::Stored);
    }

    #[test]
    fn cover_is_declared_in_the_manifest() {
        let (temp, catalog, titles, parsed) = fixture();
        let cover_path = temp.path().join("cover.png");
        std::fs::write(&cover_path, b"\x89PNG\r\n\x1a\n").unwrap();
        let out = temp.path().join("book.epub");

        assemble(
            &out,
            &catalog,
            &titles,
            &parsed,
            &AssembleOptions {
                include_missing: false,
                cover: Some(cover_path),
            },
        )
        .unwrap();

        let opf = read_entry(&out, "OEBPS/content.opf");
        assert!(opf.contains("properties=\"cover-image\""));
        assert!(opf.contains("media-type=\"image/png\""));
    }
}
