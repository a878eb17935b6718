use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use common::{Advisor, Error, MarketAnalysis, PricePoint, Result, Sentiment};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Advisory backed by the Gemini `generateContent` endpoint.
///
/// Without an API key every call returns the "key missing" stub and no
/// request is made.
pub struct GeminiAdvisor {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiAdvisor {
    pub fn new(
        api_key: Option<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_key,
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn generate(&self, api_key: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "sentiment": { "type": "STRING", "enum": ["bullish", "bearish", "neutral"] },
                        "advice": { "type": "STRING" },
                        "confidence": { "type": "INTEGER" }
                    }
                }
            }
        });

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Advisor(format!("HTTP {status}: {text}")));
        }

        let payload: Value = resp.json().await.map_err(|e| Error::Http(e.to_string()))?;
        payload
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| Error::Advisor("no response text".into()))
    }
}

#[async_trait]
impl Advisor for GeminiAdvisor {
    async fn analyze(&self, window: &[PricePoint]) -> MarketAnalysis {
        let Some(api_key) = self.api_key.as_deref() else {
            return MarketAnalysis::neutral("API key missing. Cannot perform AI analysis.");
        };
        if window.is_empty() {
            return MarketAnalysis::neutral("Not enough market data to analyze.");
        }

        let prompt = build_prompt(window);
        match self.generate(api_key, &prompt).await {
            Ok(text) => {
                debug!(len = text.len(), "Advisor responded");
                parse_analysis(&text)
            }
            Err(e) => {
                warn!(error = %e, "Advisor request failed");
                MarketAnalysis::neutral("Market analysis unavailable.")
            }
        }
    }
}

fn build_prompt(window: &[PricePoint]) -> String {
    let prices = window
        .iter()
        .map(|p| format!("{:.2}", p.value))
        .collect::<Vec<_>>()
        .join(", ");
    let current = window.last().map(|p| p.value).unwrap_or(0.0);

    format!(
        "You are a short-term binary options assistant.\n\
         Analyze this live sequence of BTC/USD prices (1-second ticks): [{prices}].\n\
         Current price: ${current}.\n\
         The trader is looking for short-term reversals or momentum for 30-second to 1-minute expirations.\n\
         Respond with JSON:\n\
         1. sentiment: \"bullish\" (CALL bias), \"bearish\" (PUT bias), or \"neutral\".\n\
         2. advice: a very short, direct instruction for a binary trader.\n\
         3. confidence: 0-100."
    )
}

#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    sentiment: String,
    #[serde(default)]
    advice: String,
    #[serde(default)]
    confidence: f64,
}

/// Parse an advisor reply, tolerating Markdown code fences.
/// Anything unparseable becomes the neutral stub.
pub fn parse_analysis(text: &str) -> MarketAnalysis {
    let clean = text.replace("```json", "").replace("```", "");
    match serde_json::from_str::<RawAnalysis>(clean.trim()) {
        Ok(raw) => {
            let sentiment = match raw.sentiment.trim().to_lowercase().as_str() {
                "bullish" => Sentiment::Bullish,
                "bearish" => Sentiment::Bearish,
                _ => Sentiment::Neutral,
            };
            let confidence = if raw.confidence.is_finite() {
                raw.confidence.round().clamp(0.0, 100.0) as u8
            } else {
                0
            };
            MarketAnalysis {
                sentiment,
                advice: raw.advice,
                confidence,
            }
        }
        Err(e) => {
            warn!(error = %e, "Failed to parse advisor response");
            MarketAnalysis::neutral("Unable to analyze market conditions at this moment.")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};

    fn window(n: usize) -> Vec<PricePoint> {
        (0..n).map(|i| PricePoint::now(100.0 + i as f64)).collect()
    }

    #[test]
    fn parses_plain_json() {
        let a = parse_analysis(r#"{"sentiment":"bullish","advice":"Look for CALLs","confidence":72}"#);
        assert_eq!(a.sentiment, Sentiment::Bullish);
        assert_eq!(a.advice, "Look for CALLs");
        assert_eq!(a.confidence, 72);
    }

    #[test]
    fn strips_code_fences() {
        let text = "```json\n{\"sentiment\":\"bearish\",\"advice\":\"Fade the rally\",\"confidence\":55}\n```";
        let a = parse_analysis(text);
        assert_eq!(a.sentiment, Sentiment::Bearish);
        assert_eq!(a.confidence, 55);
    }

    #[test]
    fn clamps_confidence_and_defaults_sentiment() {
        let a = parse_analysis(r#"{"sentiment":"sideways","advice":"wait","confidence":250}"#);
        assert_eq!(a.sentiment, Sentiment::Neutral);
        assert_eq!(a.confidence, 100);

        let a = parse_analysis(r#"{"sentiment":"bullish","advice":"","confidence":-3}"#);
        assert_eq!(a.confidence, 0);
    }

    #[test]
    fn malformed_reply_is_neutral_stub() {
        let a = parse_analysis("the market looks great!");
        assert_eq!(a.sentiment, Sentiment::Neutral);
        assert_eq!(a.confidence, 0);
    }

    #[test]
    fn prompt_lists_prices() {
        let prompt = build_prompt(&window(3));
        assert!(prompt.contains("[100.00, 101.00, 102.00]"));
        assert!(prompt.contains("Current price: $102"));
    }

    #[tokio::test]
    async fn missing_key_short_circuits() {
        let advisor = GeminiAdvisor::new(None, "m", "http://127.0.0.1:1");
        let a = advisor.analyze(&window(30)).await;
        assert_eq!(a.confidence, 0);
        assert!(a.advice.contains("API key missing"));
    }

    #[tokio::test]
    async fn unreachable_backend_degrades() {
        let advisor = GeminiAdvisor::new(Some("k".into()), "m", "http://127.0.0.1:1");
        let a = advisor.analyze(&window(30)).await;
        assert_eq!(a, MarketAnalysis::neutral("Market analysis unavailable."));
    }

    #[tokio::test]
    async fn reads_text_from_generate_content_reply() {
        let app = Router::new().route(
            "/v1beta/models/test-model:generateContent",
            post(|| async {
                Json(json!({
                    "candidates": [{
                        "content": { "parts": [{ "text": "{\"sentiment\":\"bullish\",\"advice\":\"Momentum up\",\"confidence\":80}" }] }
                    }]
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let advisor = GeminiAdvisor::new(
            Some("k".into()),
            "test-model",
            format!("http://{addr}/v1beta/"),
        );
        let a = advisor.analyze(&window(30)).await;
        assert_eq!(a.sentiment, Sentiment::Bullish);
        assert_eq!(a.advice, "Momentum up");
        assert_eq!(a.confidence, 80);
    }

    #[tokio::test]
    async fn error_status_degrades() {
        let app = Router::new().route(
            "/models/m:generateContent",
            post(|| async { (axum::http::StatusCode::FORBIDDEN, "bad key") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let advisor = GeminiAdvisor::new(Some("k".into()), "m", format!("http://{addr}"));
        let a = advisor.analyze(&window(5)).await;
        assert_eq!(a.sentiment, Sentiment::Neutral);
        assert_eq!(a.confidence, 0);
    }
}
