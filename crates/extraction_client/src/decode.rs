use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use extraction_logging::extraction_debug;

/// Decode a response body to UTF-8. The encoding comes from a BOM, then the
/// Content-Type charset, then detection; malformed sequences become U+FFFD.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    let encoding = Encoding::for_bom(bytes)
        .map(|(encoding, _)| encoding)
        .or_else(|| {
            content_type
                .and_then(charset)
                .and_then(|label| Encoding::for_label(label.as_bytes()))
        })
        .unwrap_or_else(|| {
            let mut detector = EncodingDetector::new();
            detector.feed(bytes, true);
            detector.guess(None, true)
        });

    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        extraction_debug!("Body is not valid {}, replaced bad sequences", encoding.name());
    }
    text.into_owned()
}

fn charset(content_type: &str) -> Option<&str> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim_matches([' ', '"', '\''].as_ref()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charset_parameter_is_case_insensitive() {
        assert_eq!(charset("text/html; Charset=\"ISO-8859-1\""), Some("ISO-8859-1"));
        assert_eq!(charset("text/html"), None);
    }

    #[test]
    fn header_charset_decodes_latin1() {
        assert_eq!(decode_body(b"caf\xe9", Some("text/html; charset=iso-8859-1")), "café");
    }

    #[test]
    fn bom_wins_over_header() {
        assert_eq!(
            decode_body(b"\xEF\xBB\xBFok", Some("text/html; charset=iso-8859-1")),
            "ok"
        );
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        assert_eq!(
            decode_body(b"a\xffb", Some("text/html; charset=utf-8")),
            "a\u{FFFD}b"
        );
    }
}
