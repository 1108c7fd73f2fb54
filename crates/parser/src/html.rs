use scraper::{Html, Selector};

use fledgling_core::{CrawlError, PageParser, ParsedPage};

/// Link and text extraction from raw page bytes. The underlying parser is
/// error-recovering, so truncated or malformed markup still yields a result.
#[derive(Default)]
pub struct HtmlParser;

impl HtmlParser {
    pub fn new() -> Self {
        Self
    }
}

impl PageParser for HtmlParser {
    fn parse(&self, body: &[u8]) -> Result<ParsedPage, CrawlError> {
        let html = String::from_utf8_lossy(body);
        let document = Html::parse_document(&html);

        let anchors =
            Selector::parse("a[href]").map_err(|e| CrawlError::Parse(e.to_string()))?;
        let links = document
            .select(&anchors)
            .filter_map(|el| el.value().attr("href"))
            .map(str::to_string)
            .collect();

        let text = document
            .root_element()
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        Ok(ParsedPage { text, links })
    }
}
