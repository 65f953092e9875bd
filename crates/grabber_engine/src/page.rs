use grabber_core::{DEFAULT_PAGE_TITLE, DEFAULT_SITE_ID};
use scraper::{Html, Selector};
use url::Url;

/// Naming metadata and resolution base of a scanned page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub title: String,
    pub site_id: String,
    pub base_url: Option<Url>,
}

impl PageInfo {
    /// Pulls `<title>`, the page host and the effective base URL.
    ///
    /// A `<base href>` is joined onto `page_url`; without one the page URL itself
    /// is the base.
    pub fn from_html(html: &str, page_url: Option<&str>) -> Self {
        let doc = Html::parse_document(html);
        Self::from_document(&doc, page_url)
    }

    pub fn from_document(doc: &Html, page_url: Option<&str>) -> Self {
        let page_url = page_url.and_then(|u| Url::parse(u).ok());

        let title = first_match(doc, "title")
            .map(|t| t.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_PAGE_TITLE.to_string());

        let site_id = page_url
            .as_ref()
            .and_then(|u| u.host_str())
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| DEFAULT_SITE_ID.to_string());

        let base_href = first_match(doc, "base[href]")
            .and_then(|base| base.value().attr("href"))
            .map(str::trim);
        let base_url = match (base_href, page_url.as_ref()) {
            (Some(href), Some(page)) => page.join(href).ok().or_else(|| Some(page.clone())),
            (Some(href), None) => Url::parse(href).ok(),
            (None, page) => page.cloned(),
        };

        Self {
            title,
            site_id,
            base_url,
        }
    }
}

fn first_match<'a>(doc: &'a Html, selector: &str) -> Option<scraper::ElementRef<'a>> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel).next()
}
