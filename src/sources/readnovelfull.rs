use anyhow::Context as _;
use regex::Regex;
use scraper::Html;

use crate::blacklist::Blacklist;
use crate::catalog::Catalog;

use super::{
    ParsedChapter, Source, element_text, first_element, get_bytes, get_text, http_client, selector,
};

/// readnovelfull.com. The overview page carries the novel metadata; the full
/// chapter list lives behind an ajax endpoint keyed by the novel id.
pub struct ReadNovelFull {
    client: reqwest::blocking::Client,
    digits: Regex,
}

const BASE_URL: &str = "https://readnovelfull.com";

impl ReadNovelFull {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client(None)?,
            digits: Regex::new(r"\d+").context("compile chapter number pattern")?,
        })
    }

    fn chapter_number(&self, link: &str) -> anyhow::Result<u32> {
        if link.contains("/prologue.html") {
            return Ok(0);
        }
        let digits = self
            .digits
            .find(link)
            .ok_or_else(|| anyhow::anyhow!("no chapter number in link: {link}"))?;
        digits
            .as_str()
            .parse()
            .with_context(|| format!("parse chapter number in link: {link}"))
    }

    fn catalog_from_html(&self, overview: &str, chapter_archive: &str) -> anyhow::Result<Catalog> {
        let doc = Html::parse_document(overview);

        let mut catalog = Catalog {
            title: super::select_text(&doc, "h3.title")?,
            description: super::select_text(&doc, "div.desc-text")?,
            language: super::document_language(&doc)?,
            author: super::select_attr(&doc, r#"meta[itemprop="name"]"#, "content")?,
            cover_url: super::select_attr(&doc, r#"meta[name="image"]"#, "content")?,
            ..Catalog::default()
        };

        let archive_doc = Html::parse_document(chapter_archive);
        let anchor = selector("a")?;
        for link in archive_doc.select(&anchor) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let number = self.chapter_number(href)?;
            catalog.insert_link(number, format!("{BASE_URL}{href}"));
        }

        catalog.missing = catalog.missing_chapters();
        Ok(catalog)
    }
}

impl Source for ReadNovelFull {
    fn name(&self) -> &'static str {
        "readnovelfull"
    }

    fn max_concurrent_fetches(&self) -> usize {
        10
    }

    fn fetch(&self, url: &str) -> anyhow::Result<String> {
        get_text(&self.client, url)
    }

    fn fetch_bytes(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        get_bytes(&self.client, url)
    }

    fn fetch_catalog(&self, url: &str) -> anyhow::Result<Catalog> {
        let overview = self.fetch(url)?;
        let doc = Html::parse_document(&overview);
        let novel_id = super::select_attr(&doc, "div#rating", "data-novel-id")?;
        drop(doc);

        let archive_url = format!("{BASE_URL}/ajax/chapter-archive?novelId={novel_id}");
        let chapter_archive = self.fetch(&archive_url)?;
        self.catalog_from_html(&overview, &chapter_archive)
    }

    fn parse_chapter(&self, html: &str, blacklist: &Blacklist) -> anyhow::Result<ParsedChapter> {
        let doc = Html::parse_document(html);
        let title = super::select_text(&doc, "span.chr-text")?;

        first_element(&doc, "div#chr-content")?;
        let paragraph = selector("div#chr-content p")?;
        let body_text = doc
            .select(&paragraph)
            .map(|p| element_text(&p))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ParsedChapter {
            title,
            body: blacklist.segments(&body_text),
        })
    }
}
