use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Schemes whose addresses are self-contained and never resolved against a base.
const PASSTHROUGH_SCHEMES: &[&str] = &["data:", "blob:"];

/// Single-address attributes tried after `current_src`, in priority order.
const ADDRESS_ATTRIBUTES: &[&str] = &[
    "src",
    "data-src",
    "data-lazy-src",
    "data-original",
    "data-fallback-src",
    "data-lazy",
];

/// Lazy-load attribute holding a descriptor list rather than a single address.
const LAZY_SRCSET_ATTRIBUTE: &str = "data-srcset";

const DENSITY_WEIGHT: f64 = 10_000.0;

static CSS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)url\(\s*(?:"((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)'|((?:[^)\\]|\\.)*?))\s*\)"#,
    )
    .expect("css url pattern is valid")
});

/// Host-neutral view of an `<img>` element.
///
/// `picture_sources` holds the `srcset` of every `<source>` inside an enclosing
/// `<picture>`, in document order. `current_src` is only known to a live DOM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageElement {
    pub current_src: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub picture_sources: Vec<String>,
}

impl ImageElement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn with_picture_source(mut self, srcset: impl Into<String>) -> Self {
        self.picture_sources.push(srcset.into());
        self
    }

    pub fn with_current_src(mut self, src: impl Into<String>) -> Self {
        self.current_src = Some(src.into());
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Resolves image-bearing elements and background styles into absolute addresses.
#[derive(Debug, Clone, Default)]
pub struct CandidateResolver {
    base: Option<Url>,
}

impl CandidateResolver {
    pub fn new(base: Option<Url>) -> Self {
        Self { base }
    }

    /// Resolver for a document at `base`; an unparsable base behaves like no base.
    pub fn for_document(base: &str) -> Self {
        Self::new(Url::parse(base).ok())
    }

    /// Best source address of an image element, or `None` if it is not a candidate.
    ///
    /// Responsive descriptor lists win over plain attributes; the first list that
    /// yields a usable address is taken.
    pub fn resolve_image(&self, element: &ImageElement) -> Option<String> {
        let descriptor_lists = element
            .picture_sources
            .iter()
            .map(String::as_str)
            .chain(element.attr("srcset"));
        for list in descriptor_lists {
            if let Some(best) = self.pick_best_descriptor(list) {
                return Some(best);
            }
        }

        if let Some(url) = element
            .current_src
            .as_deref()
            .and_then(|src| self.resolve_url(src))
        {
            return Some(url);
        }

        for name in ADDRESS_ATTRIBUTES {
            if let Some(url) = element.attr(name).and_then(|value| self.resolve_url(value)) {
                return Some(url);
            }
        }

        element
            .attr(LAZY_SRCSET_ATTRIBUTE)
            .and_then(|list| self.pick_best_descriptor(list))
    }

    /// Address named by the first `url(...)` token of a `background-image` value.
    pub fn resolve_background(&self, style_value: &str) -> Option<String> {
        let value = style_value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("none") {
            return None;
        }
        let captures = CSS_URL.captures(value)?;
        let raw = (1..=3).find_map(|group| captures.get(group))?.as_str();
        self.resolve_url(&css_unescape(raw))
    }

    /// Picks the highest-scoring entry of a comma-separated descriptor list.
    ///
    /// Width hints (`640w`) score their pixel value, density hints (`2x`) score
    /// `value * 10000`, entries without a recognised hint score 0. Ties keep the
    /// earliest entry.
    pub fn pick_best_descriptor(&self, list: &str) -> Option<String> {
        let mut best: Option<(f64, String)> = None;
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut tokens = entry.split_whitespace();
            let Some(address) = tokens.next() else {
                continue;
            };
            let Some(url) = self.resolve_url(address) else {
                continue;
            };
            let score = tokens.next().map(descriptor_score).unwrap_or(0.0);
            if best.as_ref().is_none_or(|(top, _)| score > *top) {
                best = Some((score, url));
            }
        }
        best.map(|(_, url)| url)
    }

    /// Resolves a raw reference. `data:`/`blob:` addresses pass through untouched.
    pub fn resolve_url(&self, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let lower = trimmed.to_ascii_lowercase();
        if PASSTHROUGH_SCHEMES.iter().any(|s| lower.starts_with(s)) {
            return Some(trimmed.to_string());
        }
        let resolved = match self.base.as_ref() {
            Some(base) => base.join(trimmed),
            None => Url::parse(trimmed),
        };
        resolved.ok().map(String::from)
    }
}

fn descriptor_score(hint: &str) -> f64 {
    let hint = hint.to_ascii_lowercase();
    if let Some(width) = hint.strip_suffix('w') {
        if !width.is_empty() && width.bytes().all(|b| b.is_ascii_digit()) {
            return width.parse().unwrap_or(0.0);
        }
    } else if let Some(density) = hint.strip_suffix('x') {
        if is_decimal(density) {
            return density.parse::<f64>().unwrap_or(0.0) * DENSITY_WEIGHT;
        }
    }
    0.0
}

/// Accepts `[0-9]*\.?[0-9]+`.
fn is_decimal(text: &str) -> bool {
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => ("", text),
    };
    !fraction.is_empty()
        && whole.bytes().all(|b| b.is_ascii_digit())
        && fraction.bytes().all(|b| b.is_ascii_digit())
}

/// Undoes CSS string escapes: `\"`, `\)` and up to six hex digits.
fn css_unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let mut hex = String::new();
        while hex.len() < 6 {
            match chars.peek() {
                Some(c) if c.is_ascii_hexdigit() => {
                    hex.push(*c);
                    chars.next();
                }
                _ => break,
            }
        }
        if !hex.is_empty() {
            let code = u32::from_str_radix(&hex, 16).unwrap_or(0xFFFD);
            out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
            if chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }
            continue;
        }
        match chars.next() {
            Some('\n') | None => {}
            Some(other) => out.push(other),
        }
    }
    out
}
