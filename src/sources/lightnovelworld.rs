use anyhow::Context as _;
use scraper::Html;

use crate::blacklist::Blacklist;
use crate::catalog::Catalog;

use super::{
    BROWSER_AGENT, ParsedChapter, Source, element_text, get_bytes, get_text, http_client, selector,
};

/// lightnovelworld.org. Requires a browser User-Agent and spreads its chapter
/// list across numbered pages; the catalog is accumulated page by page.
pub struct LightNovelWorld {
    client: reqwest::blocking::Client,
}

const BASE_URL: &str = "https://lightnovelworld.org";

impl LightNovelWorld {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client(Some(BROWSER_AGENT))?,
        })
    }

    /// Folds one chapter-list page into the catalog.
    fn accumulate_chapter_page(&self, catalog: &mut Catalog, html: &str) -> anyhow::Result<()> {
        let doc = Html::parse_document(html);
        let card = selector("div.chapter-card")?;
        let number_sel = selector("div.chapter-number")?;

        for card in doc.select(&card) {
            let number_el = card
                .select(&number_sel)
                .next()
                .ok_or_else(|| anyhow::anyhow!("chapter card without a number"))?;
            let number: u32 = element_text(&number_el)
                .parse()
                .context("parse chapter card number")?;

            let onclick = card
                .value()
                .attr("onclick")
                .ok_or_else(|| anyhow::anyhow!("chapter card without onclick locator"))?;
            let target = onclick_target(onclick)
                .ok_or_else(|| anyhow::anyhow!("malformed onclick locator: {onclick}"))?;

            catalog.insert_link(number, format!("{BASE_URL}{target}"));
        }
        Ok(())
    }

    fn chapter_page_ids(&self, first_page: &str) -> anyhow::Result<Vec<String>> {
        let doc = Html::parse_document(first_page);
        let option = selector("select#pageSelectBottom option")?;
        let ids: Vec<String> = doc
            .select(&option)
            .filter_map(|option| option.value().attr("value").map(str::to_string))
            .collect();
        if ids.is_empty() {
            anyhow::bail!("no chapter list pages found");
        }
        Ok(ids)
    }
}

/// Extracts the path from an inline `location.href='...'` handler.
fn onclick_target(onclick: &str) -> Option<&str> {
    let start = onclick.find('\'')? + 1;
    let end = onclick.rfind('\'')?;
    (end > start).then(|| &onclick[start..end])
}

impl Source for LightNovelWorld {
    fn name(&self) -> &'static str {
        "lightnovelworld"
    }

    fn max_concurrent_fetches(&self) -> usize {
        2
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

        let mut catalog = Catalog {
            title: super::select_text(&doc, "h1.novel-title")?,
            author: super::select_text(&doc, "p.novel-author")?,
            description: super::select_text(&doc, "div.summary-content")?,
            language: super::document_language(&doc)?,
            cover_url: format!(
                "{BASE_URL}{}",
                super::select_attr(&doc, "img.novel-cover", "src")?
            ),
            ..Catalog::default()
        };
        drop(doc);

        let chapters_url = format!("{url}chapters/?page=");
        let first_page = self.fetch(&format!("{chapters_url}1"))?;

        for page_id in self.chapter_page_ids(&first_page)? {
            let page_url = format!("{chapters_url}{page_id}");
            tracing::info!("fetching chapter list page {page_url}");
            let page = self.fetch(&page_url)?;
            self.accumulate_chapter_page(&mut catalog, &page)?;
        }

        catalog.missing = catalog.missing_chapters();
        Ok(catalog)
    }

    fn parse_chapter(&self, html: &str, blacklist: &Blacklist) -> anyhow::Result<ParsedChapter> {
        let doc = Html::parse_document(html);
        let title = super::select_text(&doc, "h1.chapter-title")?;
        let body_text = super::select_text(&doc, "div#chapterText")?;

        Ok(ParsedChapter {
            title,
            body: blacklist.segments(&body_text),
        })
    }
}
