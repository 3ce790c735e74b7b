//! Page fetching and readable-text extraction.
//!
//! Uses `ureq` for synchronous HTTP requests with a timeout and a cap on the
//! body size, and `scraper` to pull readable text out of HTML.

use std::io::Read;
use std::time::Duration;

use miette::Diagnostic;
use scraper::{Html, Selector};
use thiserror::Error;

/// Maximum response body size (256 KB).
pub const MAX_PAGE_BYTES: u64 = 256 * 1024;

#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error("invalid URL \"{url}\": must start with http:// or https://")]
    #[diagnostic(code(factdesk::page::invalid_url))]
    InvalidUrl { url: String },

    #[error("HTTP error {code} fetching \"{url}\"")]
    #[diagnostic(
        code(factdesk::page::status),
        help("The server answered but refused the page.")
    )]
    Status { url: String, code: u16 },

    #[error("transport error fetching \"{url}\": {message}")]
    #[diagnostic(
        code(factdesk::page::transport),
        help("Check network access and that the host resolves.")
    )]
    Transport { url: String, message: String },

    #[error("failed to read body of \"{url}\": {message}")]
    #[diagnostic(code(factdesk::page::body))]
    Body { url: String, message: String },
}

/// Readable content of one fetched page.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    /// The URL that was requested, not the post-redirect one.
    pub url: String,
    pub title: Option<String>,
    pub text: String,
    pub truncated: bool,
}

/// Fetch `url` and extract its readable text.
pub fn fetch(url: &str, timeout: Duration) -> Result<FetchedPage, FetchError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(FetchError::InvalidUrl { url: url.into() });
    }

    let agent = ureq::AgentBuilder::new().timeout(timeout).build();
    let response = agent.get(url).call().map_err(|e| match e {
        ureq::Error::Status(code, _) => FetchError::Status {
            url: url.into(),
            code,
        },
        ureq::Error::Transport(transport) => FetchError::Transport {
            url: url.into(),
            message: transport.to_string(),
        },
    })?;

    let is_html = response
        .header("Content-Type")
        .is_none_or(|ct| ct.contains("html"));

    let mut body = Vec::new();
    response
        .into_reader()
        .take(MAX_PAGE_BYTES + 1)
        .read_to_end(&mut body)
        .map_err(|e| FetchError::Body {
            url: url.into(),
            message: e.to_string(),
        })?;
    let truncated = body.len() as u64 > MAX_PAGE_BYTES;
    body.truncate(MAX_PAGE_BYTES as usize);
    let raw = String::from_utf8_lossy(&body);

    let (title, text) = if is_html {
        extract_text(&raw)
    } else {
        (None, raw.trim().to_string())
    };

    tracing::debug!(url, bytes = body.len(), truncated, "fetched page");
    Ok(FetchedPage {
        url: url.into(),
        title,
        text,
        truncated,
    })
}

/// Extract the `<title>` and block-level text of an HTML document.
///
/// Headings, paragraphs, list items, table cells and quotes are joined with
/// newlines in document order. Pages with none of those fall back to the
/// `<body>` text.
pub fn extract_text(html: &str) -> (Option<String>, String) {
    let document = Html::parse_document(html);

    let title = Selector::parse("title").ok().and_then(|sel| {
        document
            .select(&sel)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty())
    });

    let mut blocks = Vec::new();
    if let Ok(sel) = Selector::parse("h1, h2, h3, h4, h5, h6, p, li, td, blockquote, pre") {
        for el in document.select(&sel) {
            let text = collapse_whitespace(&el.text().collect::<String>());
            if !text.is_empty() {
                blocks.push(text);
            }
        }
    }

    if blocks.is_empty() {
        if let Ok(sel) = Selector::parse("body") {
            if let Some(body) = document.select(&sel).next() {
                let text = collapse_whitespace(&body.text().collect::<Vec<_>>().join(" "));
                if !text.is_empty() {
                    blocks.push(text);
                }
            }
        }
    }

    (title, blocks.join("\n"))
}

/// Collapse runs of whitespace to single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_http_url_is_rejected() {
        let err = fetch("ftp://example.com/file", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }

    #[test]
    fn unreachable_host_is_a_transport_error() {
        let err = fetch("http://127.0.0.1:1/", Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
    }

    #[test]
    fn extracts_title_and_blocks() {
        let html = r#"<html><head><title> Subsidy  rules </title></head>
            <body><script>var x = 1;</script>
            <h1>Household subsidy</h1>
            <p>Each household receives
               NT$10,000.</p>
            <ul><li>Apply online</li><li></li></ul>
            </body></html>"#;
        let (title, text) = extract_text(html);
        assert_eq!(title.as_deref(), Some("Subsidy rules"));
        assert_eq!(
            text,
            "Household subsidy\nEach household receives NT$10,000.\nApply online"
        );
    }

    #[test]
    fn falls_back_to_body_text() {
        let (title, text) = extract_text("<html><body><div>Only <b>div</b> text</div></body></html>");
        assert!(title.is_none());
        assert_eq!(text, "Only div text");
    }
}
