use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex_lite::Regex;

use super::{ContentFetcher, FetchedContent, IngestionError};

const USER_AGENT: &str = concat!("neo-alexandria/", env!("CARGO_PKG_VERSION"));
const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

pub struct HttpContentFetcher {
    client: reqwest::Client,
}

impl HttpContentFetcher {
    pub fn new(timeout: Duration) -> Result<Self, IngestionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| IngestionError::Fetch {
                url: String::new(),
                message: format!("failed to initialize HTTP client: {error}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedContent, IngestionError> {
        let fail = |message: String| IngestionError::Fetch {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| fail(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("server returned status {status}")));
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.contains("html"))
            .unwrap_or(false);
        let bytes = read_capped(response).await.map_err(fail)?;
        let body = String::from_utf8_lossy(&bytes);

        tracing::debug!(url, bytes = bytes.len(), is_html, "fetched resource body");
        if is_html || looks_like_html(&body) {
            Ok(FetchedContent {
                title: extract_title(&body),
                text: html_to_text(&body),
            })
        } else {
            Ok(FetchedContent {
                title: None,
                text: body.trim().to_string(),
            })
        }
    }
}

/// Read the body chunk by chunk, giving up as soon as it passes
/// `MAX_BODY_BYTES` (or announces that it will).
async fn read_capped(mut response: reqwest::Response) -> Result<Vec<u8>, String> {
    let too_large = |size: u64| format!("body is {size} bytes, limit is {MAX_BODY_BYTES}");
    if let Some(length) = response.content_length() {
        if length > MAX_BODY_BYTES as u64 {
            return Err(too_large(length));
        }
    }

    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|error| error.to_string())? {
        if bytes.len() + chunk.len() > MAX_BODY_BYTES {
            return Err(too_large((bytes.len() + chunk.len()) as u64));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

fn looks_like_html(body: &str) -> bool {
    let head: String = body.trim_start().chars().take(64).collect();
    let head = head.to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern compiles"))
}

pub fn extract_title(html: &str) -> Option<String> {
    static TITLE: OnceLock<Regex> = OnceLock::new();
    regex(&TITLE, r"(?is)<title[^>]*>(.*?)</title>")
        .captures(html)
        .and_then(|cap| cap.get(1))
        .map(|m| collapse_whitespace(&decode_entities(m.as_str())))
        .filter(|title| !title.is_empty())
}

/// Strip markup down to readable text. Scripts, styles, comments and the
/// `<head>` are dropped; block elements become line breaks.
pub fn html_to_text(html: &str) -> String {
    static DROPPED: OnceLock<Regex> = OnceLock::new();
    static BLOCKS: OnceLock<Regex> = OnceLock::new();
    static TAGS: OnceLock<Regex> = OnceLock::new();

    let text = regex(
        &DROPPED,
        r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>|<head(?:\s[^>]*)?>.*?</head>|<!--.*?-->",
    )
    .replace_all(html, " ");
    let text = regex(&BLOCKS, r"(?i)</?(?:p|div|br|h[1-6]|li|tr|section|article)(?:\s[^>]*)?/?>")
        .replace_all(&text, "\n");
    let text = regex(&TAGS, r"<[^>]+>").replace_all(&text, " ");
    let text = decode_entities(&text);

    text.lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
