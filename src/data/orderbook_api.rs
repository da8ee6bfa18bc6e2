use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use crate::data::price_source::QuoteProvider;
use crate::data::types::{lenient_f64, FetchError, PriceQuote, Venue};

/// Bid levels averaged into the quoted price.
const BOOK_DEPTH: usize = 5;

/// Venue B: order-book endpoint; the quote is the mean of the best bids.
pub struct OrderBookClient {
    client: Client,
    base_url: String,
    market_id: String,
}

#[derive(Debug, Deserialize)]
struct OrderBookResponse {
    #[serde(default)]
    bids: Vec<Vec<serde_json::Value>>,
    #[serde(default, deserialize_with = "lenient_f64")]
    volume: Option<f64>,
}

impl OrderBookClient {
    pub fn new(base_url: String, market_id: String, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            market_id,
        })
    }
}

#[async_trait]
impl QuoteProvider for OrderBookClient {
    fn venue(&self) -> Venue {
        Venue::B
    }

    async fn fetch_quote(&self) -> Result<PriceQuote, FetchError> {
        let url = format!("{}/v1/markets/{}/orderbook", self.base_url, self.market_id);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let body = response.text().await?;
        parse_order_book(&body)
    }
}

/// Levels are `[price, size]`. Only the first `BOOK_DEPTH` levels are looked at,
/// and among those, null, empty-string and numeric zero prices are skipped.
/// A quoted `"0"` is a real level and is averaged in.
pub fn parse_order_book(body: &str) -> Result<PriceQuote, FetchError> {
    let book: OrderBookResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::Malformed(e.to_string()))?;

    let mut prices = Vec::with_capacity(BOOK_DEPTH);
    for level in book.bids.iter().take(BOOK_DEPTH) {
        let Some(raw) = level.first() else { continue };
        if let Some(price) = level_price(raw)? {
            if !price.is_finite() || !(0.0..=1.0).contains(&price) {
                return Err(FetchError::Malformed(format!("bid price {} outside [0, 1]", price)));
            }
            prices.push(price);
        }
    }

    let price = if prices.is_empty() {
        0.5
    } else {
        prices.iter().sum::<f64>() / prices.len() as f64
    };

    PriceQuote::remote(price, book.volume.unwrap_or(0.0)).validated()
}

fn level_price(raw: &serde_json::Value) -> Result<Option<f64>, FetchError> {
    match raw {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => Ok(n.as_f64().filter(|p| *p != 0.0)),
        serde_json::Value::String(s) if s.is_empty() => Ok(None),
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .map(Some)
            .map_err(|_| FetchError::Malformed(format!("bad bid price {:?}", s))),
        other => Err(FetchError::Malformed(format!("bad bid price {}", other))),
    }
}
