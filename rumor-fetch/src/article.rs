//! Article body fetching
//!
//! Downloads a rumor's source page and keeps its readable text. Callers
//! treat every failure here as missing content, never as fatal.

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::{Client, Response};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::{
    create_article_client, parse_article_url, random_user_agent, FetchConfig, FetchError,
};

/// Readable content of an article page
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedArticle {
    pub url: String,
    pub title: Option<String>,
    pub text: String,
    pub char_count: usize,
    pub truncated: bool,
}

/// Source of full article text
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, link: &str) -> Result<FetchedArticle, FetchError>;
}

/// Fetches article pages over plain HTTP
pub struct HttpArticleFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpArticleFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = create_article_client(&config)?;
        Ok(Self { client, config })
    }

    /// Use a preconfigured client, e.g. one with custom proxy settings
    pub fn with_client(client: Client, config: FetchConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ContentFetcher for HttpArticleFetcher {
    async fn fetch(&self, link: &str) -> Result<FetchedArticle, FetchError> {
        let url = parse_article_url(link)?;
        debug!("Fetching article: {}", url);

        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, random_user_agent())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            warn!("Article fetch of {} returned status: {}", url, status);
            return Err(FetchError::Status(status.as_u16()));
        }

        let (body, body_truncated) = read_capped_body(response, self.config.max_body_bytes).await?;
        if body_truncated {
            debug!(
                "Article body of {} cut at {} bytes",
                url, self.config.max_body_bytes
            );
        }
        let html = String::from_utf8_lossy(&body);
        let (title, text) = extract_article(&html);
        if text.is_empty() {
            return Err(FetchError::EmptyContent(url.to_string()));
        }

        let (text, truncated) = truncate_chars(text, self.config.max_chars);
        Ok(FetchedArticle {
            url: url.to_string(),
            title,
            char_count: text.chars().count(),
            text,
            truncated: truncated || body_truncated,
        })
    }
}

/// Read at most `max_bytes` of the body, dropping the connection past the cap
async fn read_capped_body(
    mut response: Response,
    max_bytes: usize,
) -> Result<(Vec<u8>, bool), FetchError> {
    let declared = response.content_length().map_or(0, |len| len as usize);
    let mut body = Vec::with_capacity(declared.min(max_bytes));
    while let Some(chunk) = response.chunk().await? {
        if append_capped(&mut body, &chunk, max_bytes) {
            return Ok((body, true));
        }
    }
    Ok((body, false))
}

/// Append up to the cap; true once the cap cut the chunk short
fn append_capped(body: &mut Vec<u8>, chunk: &[u8], max_bytes: usize) -> bool {
    let room = max_bytes.saturating_sub(body.len());
    if chunk.len() > room {
        body.extend_from_slice(&chunk[..room]);
        return true;
    }
    body.extend_from_slice(chunk);
    false
}

/// Elements whose text never belongs to the article body
const EXCLUDED_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "footer", "header", "aside", "form", "figcaption",
];

/// Extract title and readable text, preferring `<article>` over `<main>` over `<body>`
pub fn extract_article(html: &str) -> (Option<String>, String) {
    let document = Html::parse_document(html);

    let title = select_first(&document, "title")
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let text = ["article", "main", "body"]
        .iter()
        .filter_map(|sel| select_first(&document, sel))
        .map(readable_text)
        .find(|text| !text.is_empty())
        .unwrap_or_default();

    (title, text)
}

fn select_first<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    document.select(&selector).next()
}

fn readable_text(root: ElementRef<'_>) -> String {
    use scraper::node::Node;

    let mut parts = Vec::new();
    for node_ref in root.descendants() {
        if let Node::Text(text_node) = node_ref.value() {
            let excluded = node_ref.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .map(|el| EXCLUDED_TAGS.contains(&el.name()))
                    .unwrap_or(false)
            });
            if excluded {
                continue;
            }
            let trimmed = text_node.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
        }
    }
    normalize_whitespace(&parts.join(" "))
}

/// Cut at a character boundary
fn truncate_chars(text: String, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (text[..byte_idx].to_string(), true),
        None => (text, false),
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_prefers_article() {
        let html = r#"
            <html>
            <head><title> Betis close in on Fekir </title></head>
            <body>
                <nav>Home | Football | Betis</nav>
                <article>
                    <h1>Fekir return</h1>
                    <script>var tracking = 1;</script>
                    <p>Real Betis are in talks to bring back Nabil Fekir.</p>
                </article>
                <footer>Cookies policy</footer>
            </body>
            </html>
        "#;

        let (title, text) = extract_article(html);
        assert_eq!(title, Some("Betis close in on Fekir".to_string()));
        assert!(text.contains("Fekir return"));
        assert!(text.contains("bring back Nabil Fekir"));
        assert!(!text.contains("tracking"));
        assert!(!text.contains("Home | Football"));
        assert!(!text.contains("Cookies"));
    }

    #[test]
    fn test_extract_falls_back_to_body() {
        let html = "<html><body><p>Isco   renews\n until 2027</p><style>.x{}</style></body></html>";
        let (title, text) = extract_article(html);
        assert_eq!(title, None);
        assert_eq!(text, "Isco renews until 2027");
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        let (text, truncated) = truncate_chars("Bellerín ñ".to_string(), 8);
        assert_eq!(text, "Bellerín");
        assert!(truncated);

        let (text, truncated) = truncate_chars("short".to_string(), 10);
        assert_eq!(text, "short");
        assert!(!truncated);
    }

    #[test]
    fn test_append_capped_stops_at_limit() {
        let mut body = Vec::new();
        assert!(!append_capped(&mut body, b"abcd", 6));
        assert!(append_capped(&mut body, b"efgh", 6));
        assert_eq!(body, b"abcdef");
        assert!(append_capped(&mut body, b"ij", 6));
        assert_eq!(body.len(), 6);
    }

    fn local_fetcher(config: FetchConfig) -> HttpArticleFetcher {
        let client = Client::builder().no_proxy().build().unwrap();
        HttpArticleFetcher::with_client(client, config)
    }

    /// Serves one canned response and hands back the raw request head
    async fn serve_once(body: String) -> (String, tokio::sync::oneshot::Receiver<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let _ = tx.send(String::from_utf8_lossy(&head).to_string());
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            // The client hangs up once its cap is reached
            let _ = socket.write_all(response.as_bytes()).await;
        });
        (format!("http://{}/rumor", addr), rx)
    }

    #[tokio::test]
    async fn test_fetch_caps_large_body() {
        let page = format!(
            "<html><body><p>{}</p></body></html>",
            "Fekir vuelve al Betis. ".repeat(200_000)
        );
        let (url, _head) = serve_once(page).await;
        let config = FetchConfig {
            max_chars: 10_000_000,
            max_body_bytes: 64 * 1024,
            ..FetchConfig::default()
        };
        let fetcher = local_fetcher(config);

        let article = fetcher.fetch(&url).await.unwrap();
        assert!(article.truncated);
        assert!(article.text.starts_with("Fekir vuelve al Betis."));
        assert!(article.text.len() <= 64 * 1024);
    }

    #[tokio::test]
    async fn test_fetch_sends_user_agent_per_request() {
        let page = "<html><body><p>Isco renews until 2027</p></body></html>".to_string();
        let (url, head) = serve_once(page).await;
        let fetcher = local_fetcher(FetchConfig::default());

        let article = fetcher.fetch(&url).await.unwrap();
        assert_eq!(article.text, "Isco renews until 2027");
        assert!(!article.truncated);

        let head = head.await.unwrap().to_lowercase();
        assert!(head.contains("user-agent: mozilla/5.0"));
    }
}
