//! 行情工具：查询股票最近 5 个交易日的收盘价与涨跌（Yahoo Finance chart API 兼容接口）

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

use crate::tools::{Tool, ToolError};

/// stock_quote 参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct QuoteArgs {
    /// 股票代码，如 AAPL、MSFT、BRK-B
    pub symbol: String,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    symbol: String,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    exchange_name: Option<String>,
    #[serde(default)]
    regular_market_price: Option<f64>,
    #[serde(default)]
    chart_previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

pub struct StockQuoteTool {
    client: Client,
    base_url: String,
}

impl StockQuoteTool {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .user_agent("finrag/0.1")
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn quote(&self, symbol: &str) -> Result<String, ToolError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        let resp = self
            .client
            .get(&url)
            .query(&[("range", "5d"), ("interval", "1d")])
            .send()
            .await
            .map_err(|e| ToolError::Failed(format!("Request failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(ToolError::Failed(format!("HTTP {} for {}", resp.status(), symbol)));
        }
        let body: ChartResponse = resp
            .json()
            .await
            .map_err(|e| ToolError::Failed(format!("Decode quote: {}", e)))?;

        if let Some(err) = body.chart.error {
            return Err(ToolError::Failed(err.description));
        }
        let result = body
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| ToolError::Failed(format!("No quote data for {}", symbol)))?;
        Ok(format_quote(&result))
    }
}

fn format_quote(result: &ChartResult) -> String {
    let meta = &result.meta;
    let closes: Vec<f64> = result
        .indicators
        .as_ref()
        .and_then(|i| i.quote.first())
        .map(|q| q.close.iter().flatten().copied().collect())
        .unwrap_or_default();

    let currency = meta.currency.as_deref().unwrap_or("USD");
    let mut out = format!(
        "{} ({}, {})",
        meta.symbol,
        currency,
        meta.exchange_name.as_deref().unwrap_or("n/a")
    );
    if let Some(price) = meta.regular_market_price.or_else(|| closes.last().copied()) {
        out.push_str(&format!(": last {:.2}", price));
        if let Some(prev) = meta.chart_previous_close.filter(|p| *p != 0.0) {
            let change = (price - prev) / prev * 100.0;
            out.push_str(&format!(", 5d change {:+.2}%", change));
        }
    }
    if !closes.is_empty() {
        let series: Vec<String> = closes.iter().map(|c| format!("{:.2}", c)).collect();
        out.push_str(&format!("; daily closes: {}", series.join(", ")));
    }
    out
}

#[async_trait]
impl Tool for StockQuoteTool {
    fn name(&self) -> &str {
        "stock_quote"
    }

    fn description(&self) -> &str {
        "Get the latest price, 5-day change and daily closes for a stock ticker. Args: {\"symbol\": \"AAPL\"}."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schema_for!(QuoteArgs)).unwrap_or(Value::Null)
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: QuoteArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::Failed(format!("Invalid args: {}", e)))?;
        let symbol = args.symbol.trim().to_uppercase();
        if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric() || "-.^=".contains(c)) {
            return Err(ToolError::Failed(format!("Invalid symbol: {}", args.symbol)));
        }
        tracing::info!(symbol = %symbol, "stock quote");
        self.quote(&symbol).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_quote_formats_chart_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/AAPL"))
            .and(query_param("range", "5d"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "chart": {
                    "result": [{
                        "meta": {
                            "symbol": "AAPL",
                            "currency": "USD",
                            "exchangeName": "NMS",
                            "regularMarketPrice": 110.0,
                            "chartPreviousClose": 100.0
                        },
                        "indicators": {"quote": [{"close": [101.0, null, 110.0]}]}
                    }],
                    "error": null
                }
            })))
            .mount(&server)
            .await;

        let tool = StockQuoteTool::new(&server.uri(), 5);
        let out = tool.execute(json!({"symbol": "aapl"})).await.unwrap();
        assert_eq!(
            out,
            "AAPL (USD, NMS): last 110.00, 5d change +10.00%; daily closes: 101.00, 110.00"
        );
    }

    #[tokio::test]
    async fn test_quote_error_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}
            })))
            .mount(&server)
            .await;

        let tool = StockQuoteTool::new(&server.uri(), 5);
        let err = tool.execute(json!({"symbol": "ZZZZ"})).await.unwrap_err();
        assert!(err.to_string().contains("delisted"));
    }

    #[tokio::test]
    async fn test_invalid_symbol_rejected() {
        let tool = StockQuoteTool::new("http://127.0.0.1:1", 1);
        assert!(tool.execute(json!({"symbol": "../etc"})).await.is_err());
        assert!(tool.execute(json!({})).await.is_err());
        assert!(tool.parameters_schema()["properties"]["symbol"].is_object());
    }
}
