use std::collections::HashSet;

use ego_tree::NodeRef;
use grabber_core::{CandidateResolver, ImageElement};
use scraper::node::Node;
use scraper::{ElementRef, Html};

const DEFAULT_MAX_RESULTS: usize = 5_000;

/// Images smaller than this in either declared dimension are treated as icons.
pub const DEFAULT_MIN_DIMENSION: u32 = 32;
const LARGE_MIN_WIDTH: u32 = 800;
const LARGE_MIN_HEIGHT: u32 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Img,
    Background,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedImage {
    pub url: String,
    pub kind: ImageKind,
    /// Declared `width`/`height` attributes; the layout size is unknown here.
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ScannedImage {
    fn dimensions(&self) -> Option<(u32, u32)> {
        self.width.zip(self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// Everything except images declared smaller than the icon threshold.
    All { min_dimension: u32 },
    /// Images declared at least 800 wide or 600 tall.
    Large,
    /// Images with exactly these declared dimensions.
    SameSize { width: u32, height: u32 },
}

impl Default for SelectionMode {
    fn default() -> Self {
        Self::All {
            min_dimension: DEFAULT_MIN_DIMENSION,
        }
    }
}

/// Collects every `<img>` and inline `background-image` of a page, in document order.
pub struct PageScanner {
    max_results: usize,
}

impl PageScanner {
    pub fn new() -> Self {
        Self::with_max_results(DEFAULT_MAX_RESULTS)
    }

    pub fn with_max_results(max_results: usize) -> Self {
        Self { max_results }
    }

    pub fn scan(&self, html: &str, resolver: &CandidateResolver) -> Vec<ScannedImage> {
        let document = Html::parse_document(html);
        self.scan_document(&document, resolver)
    }

    pub fn scan_document(&self, document: &Html, resolver: &CandidateResolver) -> Vec<ScannedImage> {
        let mut ctx = ScanContext::new(resolver, self.max_results);
        for child in document.root_element().children() {
            visit_node(child, &mut ctx);
        }
        ctx.found
    }
}

impl Default for PageScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Addresses of the scanned images that `mode` selects.
pub fn filter_candidates(images: &[ScannedImage], mode: SelectionMode) -> Vec<String> {
    images
        .iter()
        .filter(|image| match mode {
            SelectionMode::All { min_dimension } => match image.dimensions() {
                Some((w, h)) => w >= min_dimension && h >= min_dimension,
                None => true,
            },
            SelectionMode::Large => image.kind == ImageKind::Img
                && (image.width.is_some_and(|w| w >= LARGE_MIN_WIDTH)
                    || image.height.is_some_and(|h| h >= LARGE_MIN_HEIGHT)),
            SelectionMode::SameSize { width, height } => {
                image.kind == ImageKind::Img && image.dimensions() == Some((width, height))
            }
        })
        .map(|image| image.url.clone())
        .collect()
}

/// Host-neutral view of a parsed `<img>`; `picture_sources` comes from the caller.
pub fn image_element(element: ElementRef, picture_sources: &[String]) -> ImageElement {
    ImageElement {
        current_src: None,
        attributes: element
            .value()
            .attrs()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
        picture_sources: picture_sources.to_vec(),
    }
}

struct ScanContext<'r> {
    resolver: &'r CandidateResolver,
    found: Vec<ScannedImage>,
    seen: HashSet<String>,
    picture_sources: Vec<Vec<String>>,
    max_results: usize,
}

impl<'r> ScanContext<'r> {
    fn new(resolver: &'r CandidateResolver, max_results: usize) -> Self {
        Self {
            resolver,
            found: Vec::new(),
            seen: HashSet::new(),
            picture_sources: Vec::new(),
            max_results,
        }
    }

    fn push(&mut self, image: ScannedImage) {
        if self.found.len() >= self.max_results || !self.seen.insert(image.url.clone()) {
            return;
        }
        self.found.push(image);
    }
}

fn visit_node(node: NodeRef<'_, Node>, ctx: &mut ScanContext) {
    match node.value() {
        Node::Element(_) => {
            if let Some(element) = ElementRef::wrap(node) {
                visit_element(element, ctx);
            }
        }
        _ => {
            for child in node.children() {
                visit_node(child, ctx);
            }
        }
    }
}

fn visit_element(element: ElementRef, ctx: &mut ScanContext) {
    let tag = element.value().name().to_ascii_lowercase();
    match tag.as_str() {
        "script" | "style" | "noscript" | "template" => return,
        "img" => handle_image(element, ctx),
        _ => {}
    }

    if let Some(style) = element.value().attr("style") {
        if let Some(url) = background_from_style(style, ctx.resolver) {
            ctx.push(ScannedImage {
                url,
                kind: ImageKind::Background,
                width: None,
                height: None,
            });
        }
    }

    let is_picture = tag == "picture";
    if is_picture {
        ctx.picture_sources.push(picture_sources(element));
    }
    for child in element.children() {
        visit_node(child, ctx);
    }
    if is_picture {
        ctx.picture_sources.pop();
    }
}

fn handle_image(element: ElementRef, ctx: &mut ScanContext) {
    let sources = ctx.picture_sources.last().cloned().unwrap_or_default();
    let view = image_element(element, &sources);
    if let Some(url) = ctx.resolver.resolve_image(&view) {
        ctx.push(ScannedImage {
            url,
            kind: ImageKind::Img,
            width: view.attr("width").and_then(parse_dimension),
            height: view.attr("height").and_then(parse_dimension),
        });
    }
}

fn picture_sources(picture: ElementRef) -> Vec<String> {
    picture
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name().eq_ignore_ascii_case("source"))
        .filter_map(|el| el.value().attr("srcset"))
        .map(ToOwned::to_owned)
        .collect()
}

fn background_from_style(style: &str, resolver: &CandidateResolver) -> Option<String> {
    split_declarations(style).into_iter().find_map(|declaration| {
        let (property, value) = declaration.split_once(':')?;
        let property = property.trim().to_ascii_lowercase();
        if property == "background-image" || property == "background" {
            resolver.resolve_background(value)
        } else {
            None
        }
    })
}

/// Splits an inline style on `;`, ignoring those inside parentheses or quotes
/// (`url(data:image/png;base64,...)`).
fn split_declarations(style: &str) -> Vec<&str> {
    let mut declarations = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in style.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (c, quote) {
            ('\\', _) => escaped = true,
            (q, Some(open)) if q == open => quote = None,
            (_, Some(_)) => {}
            ('"' | '\'', None) => quote = Some(c),
            ('(', None) => depth += 1,
            (')', None) => depth = depth.saturating_sub(1),
            (';', None) if depth == 0 => {
                declarations.push(&style[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    declarations.push(&style[start..]);
    declarations
}

/// Leading digits of a `width`/`height` attribute (`"640"`, `"640px"`).
fn parse_dimension(value: &str) -> Option<u32> {
    let digits: String = value
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::{parse_dimension, split_declarations};

    #[test]
    fn declarations_split_outside_parentheses_and_quotes() {
        assert_eq!(
            split_declarations("color: red; background: url(data:image/png;base64,AA==) no-repeat"),
            vec!["color: red", " background: url(data:image/png;base64,AA==) no-repeat"]
        );
        assert_eq!(
            split_declarations("content: 'a;b'; top: 0"),
            vec!["content: 'a;b'", " top: 0"]
        );
    }

    #[test]
    fn dimensions_accept_pixel_suffix() {
        assert_eq!(parse_dimension("640"), Some(640));
        assert_eq!(parse_dimension(" 32px"), Some(32));
        assert_eq!(parse_dimension("auto"), None);
    }
}
