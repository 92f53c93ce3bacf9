//! Search 工具：抓取财经网页，域名白名单、超时、结果大小限制
//!
//! 仅允许配置中的域名（SEC、Yahoo Finance、Reuters 等）；GET 请求带超时与 User-Agent；
//! 对 HTML 响应使用 html2text 提取可读文本，超过 max_result_chars 时截断并追加 ...[truncated]。

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use html2text::from_read;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use serde_json::Value;

use crate::config::SearchSection;
use crate::tools::{Tool, ToolError};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

pub struct SearchTool {
    client: Client,
    allowed_domains: HashSet<String>,
    max_result_chars: usize,
}

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    let lower = s.chars().take(512).collect::<String>().to_ascii_lowercase();
    lower.starts_with("<!doctype")
        || lower.starts_with("<html")
        || (lower.contains('<') && (lower.contains("</") || lower.contains("<head") || lower.contains("<meta")))
}

/// 从 URL 中提取 host（小写，不含端口）
fn extract_domain(url: &str) -> Option<String> {
    let url = url.trim();
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let host = rest.split(|c: char| c == '/' || c == '?' || c == '#').next()?;
    let host = host.split(':').next()?;
    (!host.is_empty()).then(|| host.to_lowercase())
}

impl SearchTool {
    pub fn new(allowed_domains: Vec<String>, timeout_secs: u64, max_result_chars: usize) -> Self {
        let allowed_domains = allowed_domains.into_iter().map(|s| s.to_lowercase()).collect();
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .unwrap_or_default();
        Self {
            client,
            allowed_domains,
            max_result_chars,
        }
    }

    pub fn from_config(cfg: &SearchSection) -> Self {
        Self::new(cfg.allowed_domains.clone(), cfg.timeout_secs, cfg.max_result_chars)
    }

    fn is_allowed(&self, url: &str) -> Result<(), ToolError> {
        let domain =
            extract_domain(url).ok_or_else(|| ToolError::Failed("Invalid or missing URL".into()))?;
        if self.allowed_domains.contains(&domain) {
            return Ok(());
        }
        Err(ToolError::Failed(format!("Domain not in allowlist: {}", domain)))
    }

    fn html_to_text(&self, html: &str) -> String {
        match from_read(html.as_bytes(), 120) {
            Ok(text) if !text.trim().is_empty() => text,
            _ => strip_html_tags(html),
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, ToolError> {
        self.is_allowed(url)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::Failed(format!("Request failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(ToolError::Failed(format!("HTTP {}", resp.status())));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| ToolError::Failed(format!("Read body: {}", e)))?;
        let body = body.trim_start_matches('\u{FEFF}');

        let text = if looks_like_html(body) {
            self.html_to_text(body)
        } else {
            body.to_string()
        };

        if text.chars().count() > self.max_result_chars {
            Ok(text.chars().take(self.max_result_chars).collect::<String>() + "\n...[truncated]")
        } else {
            Ok(text)
        }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Fetch a financial web page (SEC filings, Yahoo Finance, Nasdaq, Reuters, CNBC, Investopedia, Wikipedia) and return its readable text. Args: {\"url\": \"https://...\"}."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Absolute http(s) URL on an allowed domain" }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let url = args.get("url").and_then(|v| v.as_str()).unwrap_or("").trim();
        if url.is_empty() {
            return Err(ToolError::Failed("Missing url".into()));
        }
        tracing::info!(url = %url, "search tool fetch");
        self.fetch(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://www.sec.gov/cgi-bin/browse?x=1"),
            Some("www.sec.gov".into())
        );
        assert_eq!(extract_domain("http://127.0.0.1:8080/a"), Some("127.0.0.1".into()));
        assert_eq!(extract_domain("ftp://x"), None);
    }

    #[tokio::test]
    async fn test_rejects_domain_outside_allowlist() {
        let tool = SearchTool::new(vec!["www.sec.gov".into()], 5, 100);
        let err = tool
            .execute(serde_json::json!({"url": "https://evil.example.com"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("allowlist"));
        assert!(tool.execute(serde_json::json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_html_and_truncate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><head><title>t</title></head><body><p>Apple closed at 190 dollars today.</p></body></html>",
            ))
            .mount(&server)
            .await;

        let tool = SearchTool::new(vec!["127.0.0.1".into()], 5, 12);
        let out = tool
            .execute(serde_json::json!({"url": format!("{}/quote", server.uri())}))
            .await
            .unwrap();
        assert!(out.ends_with("...[truncated]"));
        assert!(!out.contains("<p>"));
    }
}
