//! Inline media on the request side: data URIs, remote images and the
//! markdown image form that assistant content carries across turns.

use std::future::Future;
use std::sync::LazyLock;

use regex_lite::Regex;

use super::{GeminiBlob, GeminiPart};
use crate::error::ProxyError;

/// Alt text used for images written into assistant content.
pub const INLINE_IMAGE_TAG: &str = "image";

static MARKDOWN_INLINE_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[[^\]]*\]\(data:(?P<mime>[^;,()\s]+);base64,(?P<data>[A-Za-z0-9+/=_-]+)\)")
        .expect("markdown image pattern is a valid literal")
});

/// Fetches a remote resource and returns it base64-encoded with its mime type.
pub trait MediaFetcher: Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<GeminiBlob, ProxyError>> + Send;
}

/// Split a `data:` URI into mime type and payload.
#[must_use]
pub fn parse_data_uri(uri: &str) -> Option<GeminiBlob> {
    let rest = uri.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let mime_type = header.strip_suffix(";base64").unwrap_or(header);
    Some(GeminiBlob {
        mime_type: mime_type.to_string(),
        data: data.to_string(),
    })
}

/// Turn an `image_url` value into an inline part, fetching remote URLs.
///
/// # Errors
///
/// Returns a 400 [`ProxyError`] for a malformed data URI or a failed fetch.
pub async fn resolve_image_url<F: MediaFetcher>(
    url: &str,
    fetcher: &F,
) -> Result<GeminiPart, ProxyError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        let blob = fetcher
            .fetch(url)
            .await
            .map_err(|err| ProxyError::invalid_request(format!("Error fetching image: {err}")))?;
        return Ok(GeminiPart {
            inline_data: Some(blob),
            ..GeminiPart::default()
        });
    }
    let blob = parse_data_uri(url)
        .ok_or_else(|| ProxyError::invalid_request(format!("Invalid image data: {}", preview(url))))?;
    Ok(GeminiPart {
        inline_data: Some(blob),
        ..GeminiPart::default()
    })
}

/// `file_data` is a data URI, or bare base64 that is taken to be a PDF.
///
/// # Errors
///
/// Returns a 400 [`ProxyError`] when the value cannot be parsed.
pub fn resolve_file_data(file_data: &str) -> Result<GeminiPart, ProxyError> {
    let blob = if file_data.starts_with("data:") {
        parse_data_uri(file_data)
    } else {
        Some(GeminiBlob {
            mime_type: "application/pdf".to_string(),
            data: file_data.to_string(),
        })
    };
    let blob = blob.ok_or_else(|| {
        ProxyError::invalid_request(format!("Invalid file data: {}", preview(file_data)))
    })?;
    Ok(GeminiPart {
        inline_data: Some(blob),
        ..GeminiPart::default()
    })
}

/// Markdown form of an inline image, as written into response content.
#[must_use]
pub fn inline_image_markdown(blob: &GeminiBlob) -> String {
    format!(
        "![{INLINE_IMAGE_TAG}](data:{};base64,{})",
        blob.mime_type, blob.data
    )
}

/// Split assistant text back into text and inline-data parts.
///
/// Always returns at least one part.
#[must_use]
pub fn split_inline_images(text: &str) -> Vec<GeminiPart> {
    let mut parts = Vec::new();
    let mut cursor = 0;
    for caps in MARKDOWN_INLINE_IMAGE.captures_iter(text) {
        let (Some(whole), Some(mime), Some(data)) =
            (caps.get(0), caps.name("mime"), caps.name("data"))
        else {
            continue;
        };
        let before = &text[cursor..whole.start()];
        if !before.is_empty() {
            parts.push(GeminiPart::text(before));
        }
        parts.push(GeminiPart::inline_data(mime.as_str(), data.as_str()));
        cursor = whole.end();
    }
    let rest = &text[cursor..];
    if !rest.is_empty() || parts.is_empty() {
        parts.push(GeminiPart::text(rest));
    }
    parts
}

fn preview(value: &str) -> &str {
    match value.char_indices().nth(64) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::gemini::PartKind;

    struct StubFetcher;

    impl MediaFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<GeminiBlob, ProxyError> {
            if url.ends_with("missing.png") {
                return Err(ProxyError::Transport(format!("404 Not Found ({url})")));
            }
            Ok(GeminiBlob {
                mime_type: "image/png".into(),
                data: "iVBORw0KGgo=".into(),
            })
        }
    }

    #[test]
    fn test_parse_data_uri() {
        let blob = parse_data_uri("data:image/jpeg;base64,/9j/4AAQ").unwrap();
        assert_eq!(blob.mime_type, "image/jpeg");
        assert_eq!(blob.data, "/9j/4AAQ");

        let blob = parse_data_uri("data:text/plain,hello").unwrap();
        assert_eq!(blob.mime_type, "text/plain");
        assert_eq!(blob.data, "hello");

        assert!(parse_data_uri("image/png;base64,AAAA").is_none());
        assert!(parse_data_uri("data:image/png;base64").is_none());
    }

    #[test]
    fn test_inline_image_round_trip() {
        let original = GeminiBlob {
            mime_type: "image/png".into(),
            data: "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==".into(),
        };
        let content = format!("Here you go:\n\n{}\n\nEnjoy", inline_image_markdown(&original));
        let parts = split_inline_images(&content);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].kind(), PartKind::Text("Here you go:\n\n"));
        match parts[1].kind() {
            PartKind::InlineData(blob) => assert_eq!(blob, &original),
            other => panic!("expected InlineData, got {other:?}"),
        }
        assert_eq!(parts[2].kind(), PartKind::Text("\n\nEnjoy"));
    }

    #[test]
    fn test_markdown_image_pattern_compiles() {
        let caps = MARKDOWN_INLINE_IMAGE
            .captures("![image](data:image/gif;base64,R0lGOD==)")
            .unwrap();
        assert_eq!(&caps["mime"], "image/gif");
        assert_eq!(&caps["data"], "R0lGOD==");
        assert!(!MARKDOWN_INLINE_IMAGE.is_match("![image](https://example.com/a.png)"));
    }

    #[test]
    fn test_split_without_images_keeps_single_text_part() {
        assert_eq!(split_inline_images("plain"), vec![GeminiPart::text("plain")]);
        assert_eq!(split_inline_images(""), vec![GeminiPart::text("")]);
    }

    #[test]
    fn test_adjacent_images() {
        let a = GeminiBlob {
            mime_type: "image/png".into(),
            data: "AAAA".into(),
        };
        let b = GeminiBlob {
            mime_type: "image/webp".into(),
            data: "BBBB".into(),
        };
        let content = format!("{}{}", inline_image_markdown(&a), inline_image_markdown(&b));
        let parts = split_inline_images(&content);
        assert_eq!(
            parts,
            vec![
                GeminiPart::inline_data("image/png", "AAAA"),
                GeminiPart::inline_data("image/webp", "BBBB"),
            ]
        );
    }

    #[tokio::test]
    async fn test_resolve_remote_image() {
        let part = resolve_image_url("https://example.com/cat.png", &StubFetcher)
            .await
            .unwrap();
        assert_eq!(part, GeminiPart::inline_data("image/png", "iVBORw0KGgo="));
    }

    #[tokio::test]
    async fn test_remote_fetch_failure_is_request_error() {
        match resolve_image_url("https://example.com/missing.png", &StubFetcher).await {
            Err(ProxyError::Validation { status, message }) => {
                assert_eq!(status, http::StatusCode::BAD_REQUEST);
                assert!(message.starts_with("Error fetching image"), "{message}");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_image_data() {
        match resolve_image_url("not-a-uri", &StubFetcher).await {
            Err(ProxyError::Validation { message, .. }) => {
                assert!(message.starts_with("Invalid image data"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_file_data_defaults_to_pdf() {
        assert_eq!(
            resolve_file_data("JVBERi0xLjQ=").unwrap(),
            GeminiPart::inline_data("application/pdf", "JVBERi0xLjQ=")
        );
        assert_eq!(
            resolve_file_data("data:text/csv;base64,YSxi").unwrap(),
            GeminiPart::inline_data("text/csv", "YSxi")
        );
        assert!(resolve_file_data("data:broken").is_err());
    }
}
