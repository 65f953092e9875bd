use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use grabber_logging::grab_debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPage {
    pub html: String,
    pub encoding_label: String,
    /// Malformed sequences were replaced with U+FFFD.
    pub lossy: bool,
}

/// Decode page bytes into UTF-8: BOM -> Content-Type charset -> chardetng guess.
///
/// Never fails; a page with a few broken bytes still has scannable images.
pub fn decode_page(bytes: &[u8], content_type: Option<&str>) -> DecodedPage {
    let encoding = Encoding::for_bom(bytes)
        .map(|(encoding, _)| encoding)
        .or_else(|| {
            content_type
                .and_then(charset_label)
                .and_then(|label| Encoding::for_label(label.as_bytes()))
        })
        .unwrap_or_else(|| {
            let mut detector = EncodingDetector::new();
            detector.feed(bytes, true);
            detector.guess(None, true)
        });

    let (text, _, lossy) = encoding.decode(bytes);
    if lossy {
        grab_debug!("Lossy page decode with {}", encoding.name());
    }
    DecodedPage {
        html: text.into_owned(),
        encoding_label: encoding.name().to_string(),
        lossy,
    }
}

fn charset_label(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(['"', '\'']).to_string())
    })
}
