use anyhow::Context as _;
use regex::Regex;
use scraper::Html;

use crate::blacklist::Blacklist;
use crate::catalog::Catalog;

use super::{ParsedChapter, Source, get_bytes, get_text, http_client, selector};

/// readernovel.net. The overview page lists every chapter directly; chapter
/// numbers sit in the third digit run of each href.
pub struct ReaderNovel {
    client: reqwest::blocking::Client,
    digits: Regex,
}

const BASE_URL: &str = "https://readernovel.net";

impl ReaderNovel {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client(None)?,
            digits: Regex::new(r"\d+").context("compile chapter number pattern")?,
        })
    }

    fn chapter_number(&self, link: &str) -> anyhow::Result<u32> {
        let digits = self
            .digits
            .find_iter(link)
            .nth(2)
            .ok_or_else(|| anyhow::anyhow!("no chapter number in link: {link}"))?;
        digits
            .as_str()
            .parse()
            .with_context(|| format!("parse chapter number in link: {link}"))
    }

    fn catalog_from_html(&self, overview: &str) -> anyhow::Result<Catalog> {
        let doc = Html::parse_document(overview);

        let mut catalog = Catalog {
            title: super::select_text(&doc, "h1.page-title")?,
            description: super::select_text(&doc, "div#collapseSummary")?,
            language: super::document_language(&doc)?,
            author: super::select_text(&doc, "ul.list-group-flush a")?,
            cover_url: format!(
                "{BASE_URL}{}",
                super::select_attr(&doc, "div.manga-image img", "data-src")?
            ),
            ..Catalog::default()
        };

        let anchor = selector("div.chapter-list-wrapper a")?;
        for link in doc.select(&anchor) {
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

impl Source for ReaderNovel {
    fn name(&self) -> &'static str {
        "readernovel"
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
        self.catalog_from_html(&overview)
    }

    fn parse_chapter(&self, html: &str, blacklist: &Blacklist) -> anyhow::Result<ParsedChapter> {
        let doc = Html::parse_document(html);
        let title = super::select_text(&doc, "span.chapter-title")?;
        let body_text = super::select_text(&doc, "div#chapter-container")?;

        Ok(ParsedChapter {
            title,
            body: blacklist.segments(&body_text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OVERVIEW: &str = r#"<html lang="en"><body>
        <h1 class="page-title">Mage Chronicle</h1>
        <div id="collapseSummary"> A story. </div>
        <ul class="list-group-flush"><li><a> B. Writer </a></li></ul>
        <div class="manga-image"><img data-src="/covers/7.png" /></div>
        <div class="chapter-list-wrapper">
          <a href="/novel/7/mage-chronicle-3421/chapter-1.html">Chapter 1</a>
          <a href="/novel/7/mage-chronicle-3421/chapter-2.html">Chapter 2</a>
        </div></body></html>"#;

    #[test]
    fn catalog_uses_third_digit_run_for_numbers() {
        let source = ReaderNovel::new().unwrap();
        let catalog = source.catalog_from_html(OVERVIEW).unwrap();

        assert_eq!(catalog.title, "Mage Chronicle");
        assert_eq!(catalog.author, "B. Writer");
        assert_eq!(catalog.cover_url, "https://readernovel.net/covers/7.png");
        assert_eq!(catalog.last_chapter, 2);
        assert_eq!(
            catalog.links.keys().copied().collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn chapter_number_requires_three_digit_runs() {
        let source = ReaderNovel::new().unwrap();
        assert_eq!(
            source
                .chapter_number("/novel/7/mage-chronicle-3421/chapter-15.html")
                .unwrap(),
            15
        );
        assert!(source.chapter_number("/novel/7/no-number.html").is_err());
    }

    #[test]
    fn parse_chapter_segments_container_text() {
        let source = ReaderNovel::new().unwrap();
        let blacklist = Blacklist::default();
        let html = r#"<html><body>
            <span class="chapter-title">Ch 2</span>
            <div id="chapter-container">line one
line two</div></body></html>"#;

        let chapter = source.parse_chapter(html, &blacklist).unwrap();
        assert_eq!(chapter.title, "Ch 2");
        assert_eq!(chapter.body, vec!["line one", "line two"]);
    }
}
