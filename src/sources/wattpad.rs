use scraper::Html;

use crate::blacklist::Blacklist;
use crate::catalog::Catalog;

use super::{
    BROWSER_AGENT, ParsedChapter, Source, element_text, get_bytes, get_text, http_client, selector,
};

/// wattpad.com. The story page does not expose a usable title or description,
/// so the title is reconstructed from the URL slug and parts are numbered in
/// listing order.
pub struct Wattpad {
    client: reqwest::blocking::Client,
}

impl Wattpad {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client(Some(BROWSER_AGENT))?,
        })
    }
}

/// Title from a story URL slug: everything after the numeric story id,
/// dashes as spaces, words title-cased.
fn title_from_url(url: &str) -> String {
    let mut digit_seen = false;
    for (index, c) in url.char_indices() {
        if c.is_ascii_digit() {
            digit_seen = true;
            continue;
        }
        if digit_seen {
            return title_case(&url[index + c.len_utf8()..]);
        }
    }
    url.replace('-', " ")
}

fn title_case(slug: &str) -> String {
    slug.split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl Source for Wattpad {
    fn name(&self) -> &'static str {
        "wattpad"
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
        self.catalog_from_html(url, &overview)
    }

    fn parse_chapter(&self, html: &str, blacklist: &Blacklist) -> anyhow::Result<ParsedChapter> {
        let doc = Html::parse_document(html);
        let title = super::select_text(&doc, "h1.h2")?;

        let pre = super::first_element(&doc, "div.first-page pre")?;
        let body_text = element_text(&pre);

        Ok(ParsedChapter {
            title,
            body: blacklist.segments(&body_text),
        })
    }
}

impl Wattpad {
    fn catalog_from_html(&self, url: &str, overview: &str) -> anyhow::Result<Catalog> {
        let doc = Html::parse_document(overview);

        let mut catalog = Catalog {
            title: title_from_url(url),
            // The story layout exposes no parseable description.
            description: String::new(),
            language: super::document_language(&doc)?,
            author: super::select_text(&doc, r#"div[data-testid="story-badges"] > *"#)?,
            cover_url: super::select_attr(&doc, r#"img[data-testid="image"]"#, "src")?,
            ..Catalog::default()
        };

        let part_link = selector(r#"ul[aria-label="story-parts"] li a"#)?;
        let mut number = 0_u32;
        for link in doc.select(&part_link) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            number += 1;
            catalog.insert_link(number, href.to_string());
        }

        catalog.missing = catalog.missing_chapters();
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_comes_from_the_slug_after_the_story_id() {
        assert_eq!(
            title_from_url("https://www.wattpad.com/story/123456-the-long-night"),
            "The Long Night"
        );
        assert_eq!(title_from_url("no-digits-here"), "no digits here");
    }

    #[test]
    fn parts_are_numbered_in_listing_order() {
        let source = Wattpad::new().unwrap();
        let html = r#"<html lang="en"><body>
            <div data-testid="story-badges"><span> C. Poster </span></div>
            <img data-testid="image" src="https://img.example.test/c.png" />
            <ul aria-label="story-parts">
              <li><a href="https://www.wattpad.com/1001-part-one">one</a></li>
              <li><a href="https://www.wattpad.com/1002-part-two">two</a></li>
              <li><a href="https://www.wattpad.com/1003-part-three">three</a></li>
            </ul></body></html>"#;

        let catalog = source
            .catalog_from_html("https://www.wattpad.com/story/123456-the-long-night", html)
            .unwrap();

        assert_eq!(catalog.title, "The Long Night");
        assert_eq!(catalog.author, "C. Poster");
        assert_eq!(catalog.last_chapter, 3);
        assert_eq!(
            catalog.links.get(&2).map(String::as_str),
            Some("https://www.wattpad.com/1002-part-two")
        );
        assert!(catalog.missing.is_empty());
    }

    #[test]
    fn parse_chapter_reads_the_first_page_pre_block() {
        let source = Wattpad::new().unwrap();
        let blacklist = Blacklist::default();
        let html = r#"<html><body>
            <h1 class="h2">Part One</h1>
            <div class="first-page"><pre>line a
line b</pre></div></body></html>"#;

        let chapter = source.parse_chapter(html, &blacklist).unwrap();
        assert_eq!(chapter.title, "Part One");
        assert_eq!(chapter.body, vec!["line a", "line b"]);
    }
}
