use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use common::{Error, FeedEvent, PricePoint, Result};

/// Streaming price feed for a single instrument.
///
/// Connects to a ticker WebSocket, parses each message into a
/// `FeedEvent::Tick` and forwards it to the engine. Connection changes are
/// reported as `Connected` / `Disconnected`. On any failure the stream waits
/// a fixed backoff and reconnects, forever, until the engine side of the
/// channel is dropped.
pub struct PriceStream {
    url: String,
    feed_tx: mpsc::Sender<FeedEvent>,
    backoff: Duration,
}

impl PriceStream {
    pub fn new(url: impl Into<String>, feed_tx: mpsc::Sender<FeedEvent>, backoff: Duration) -> Self {
        Self {
            url: url.into(),
            feed_tx,
            backoff,
        }
    }

    /// Run the stream loop, reconnecting on failure.
    /// Call this inside a `tokio::spawn`.
    pub async fn run(self) {
        loop {
            info!(url = %self.url, "Connecting to price feed");
            match self.connect_once().await {
                Ok(()) => info!("Price feed closed cleanly"),
                Err(e) => warn!(error = %e, backoff = ?self.backoff, "Price feed error, reconnecting"),
            }

            if self.feed_tx.send(FeedEvent::Disconnected).await.is_err() {
                info!("Engine gone, price feed exiting");
                return;
            }
            tokio::time::sleep(self.backoff).await;
        }
    }

    async fn connect_once(&self) -> Result<()> {
        let url = Url::parse(&self.url).map_err(|e| Error::WebSocket(e.to_string()))?;

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;

        self.forward(FeedEvent::Connected).await?;
        info!(url = %self.url, "Price feed connected");

        let (_, mut read) = ws_stream.split();

        while let Some(msg) = read.next().await {
            let msg = msg.map_err(|e| Error::WebSocket(e.to_string()))?;

            match msg {
                Message::Text(text) => match parse_tick(&text) {
                    Ok(price) => {
                        debug!(price, "Tick");
                        self.forward(FeedEvent::Tick(PricePoint::now(price))).await?;
                    }
                    Err(e) => {
                        warn!(error = %e, "Dropping malformed tick");
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }

        Ok(())
    }

    async fn forward(&self, event: FeedEvent) -> Result<()> {
        self.feed_tx
            .send(event)
            .await
            .map_err(|_| Error::Other("engine feed channel closed".into()))
    }
}

// ─── Tick parsing ────────────────────────────────────────────────────────────

/// Extract a price from a ticker message.
///
/// Accepts `{"price": 123.4}` and Binance mini-ticker messages, whose close
/// price arrives as a string in `"c"`. Non-finite or non-positive prices are
/// rejected.
pub fn parse_tick(text: &str) -> Result<f64> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let field = value
        .get("price")
        .or_else(|| value.get("c"))
        .ok_or_else(|| Error::Other("tick has no price field".into()))?;

    let price = match field {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| Error::Other(format!("unparseable price: {field}")))?;

    if !price.is_finite() || price <= 0.0 {
        return Err(Error::Other(format!("invalid price: {price}")));
    }
    Ok(price)
}
