use std::time::Duration;

use anyhow::Context as _;
use scraper::{ElementRef, Html, Selector};

use crate::blacklist::Blacklist;
use crate::catalog::Catalog;

pub mod lightnovelworld;
pub mod readernovel;
pub mod readnovelfull;
pub mod wattpad;

pub use lightnovelworld::LightNovelWorld;
pub use readernovel::ReaderNovel;
pub use readnovelfull::ReadNovelFull;
pub use wattpad::Wattpad;

/// Browser User-Agent for sites that reject the default client string.
pub(crate) const BROWSER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/105.0.0.0 Safari/537.36";

/// One chapter after markup extraction: a title and one string per
/// paragraph-equivalent body segment.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedChapter {
    pub title: String,
    pub body: Vec<String>,
}

/// A source website. Each implementation encapsulates one site's request
/// shaping and markup extraction; callers never inspect markup themselves.
pub trait Source: Send + Sync {
    /// Adapter name; a source is selected when its name is a substring of
    /// the target URL.
    fn name(&self) -> &'static str;

    /// Worker-pool size for the fetch stage (site rate limits).
    fn max_concurrent_fetches(&self) -> usize;

    fn fetch(&self, url: &str) -> anyhow::Result<String>;

    fn fetch_bytes(&self, url: &str) -> anyhow::Result<Vec<u8>>;

    fn fetch_catalog(&self, url: &str) -> anyhow::Result<Catalog>;

    fn parse_chapter(&self, html: &str, blacklist: &Blacklist) -> anyhow::Result<ParsedChapter>;
}

/// Static adapter registry. New sites are added here, not discovered.
pub fn registry() -> anyhow::Result<Vec<Box<dyn Source>>> {
    Ok(vec![
        Box::new(ReadNovelFull::new()?),
        Box::new(ReaderNovel::new()?),
        Box::new(LightNovelWorld::new()?),
        Box::new(Wattpad::new()?),
    ])
}

/// Linear scan for the adapter whose name appears in the URL. Failing to
/// match is fatal and happens before any I/O.
pub fn select(url: &str) -> anyhow::Result<Box<dyn Source>> {
    registry()?
        .into_iter()
        .find(|source| url.contains(source.name()))
        .ok_or_else(|| anyhow::anyhow!("no source adapter matches url: {url}"))
}

pub(crate) fn http_client(user_agent: Option<&str>) -> anyhow::Result<reqwest::blocking::Client> {
    let mut builder = reqwest::blocking::Client::builder().timeout(Duration::from_secs(30));
    if let Some(agent) = user_agent {
        builder = builder.user_agent(agent);
    }
    builder.build().context("build http client")
}

pub(crate) fn get_text(client: &reqwest::blocking::Client, url: &str) -> anyhow::Result<String> {
    let response = client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .with_context(|| format!("GET {url}"))?;
    response.text().with_context(|| format!("read body: {url}"))
}

pub(crate) fn get_bytes(client: &reqwest::blocking::Client, url: &str) -> anyhow::Result<Vec<u8>> {
    let response = client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .with_context(|| format!("GET {url}"))?;
    Ok(response
        .bytes()
        .with_context(|| format!("read body: {url}"))?
        .to_vec())
}

pub(crate) fn selector(css: &str) -> anyhow::Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow::anyhow!("invalid selector {css:?}: {err:?}"))
}

pub(crate) fn first_element<'a>(doc: &'a Html, css: &str) -> anyhow::Result<ElementRef<'a>> {
    let selector = selector(css)?;
    doc.select(&selector)
        .next()
        .ok_or_else(|| anyhow::anyhow!("no element matches {css:?}"))
}

pub(crate) fn select_text(doc: &Html, css: &str) -> anyhow::Result<String> {
    Ok(element_text(&first_element(doc, css)?))
}

pub(crate) fn select_attr(doc: &Html, css: &str, attr: &str) -> anyhow::Result<String> {
    first_element(doc, css)?
        .value()
        .attr(attr)
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("element {css:?} has no attribute {attr:?}"))
}

pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

pub(crate) fn document_language(doc: &Html) -> anyhow::Result<String> {
    select_attr(doc, "html", "lang")
}
