use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use crate::data::price_source::QuoteProvider;
use crate::data::types::{lenient_f64, FetchError, PriceQuote, Venue};

/// Venue A: Gamma-style market listing that carries an implied "yes" bid.
pub struct GammaApiClient {
    client: Client,
    base_url: String,
    market_slug: String,
}

#[derive(Debug, Deserialize)]
struct GammaMarket {
    #[serde(default, deserialize_with = "lenient_f64")]
    yes_bid: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GammaMarketsResponse {
    #[serde(default)]
    markets: Vec<GammaMarket>,
}

impl GammaApiClient {
    pub fn new(base_url: String, market_slug: String, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            market_slug,
        })
    }
}

#[async_trait]
impl QuoteProvider for GammaApiClient {
    fn venue(&self) -> Venue {
        Venue::A
    }

    async fn fetch_quote(&self) -> Result<PriceQuote, FetchError> {
        let url = format!("{}/markets", self.base_url);

        let response = self.client
            .get(&url)
            .query(&[("slug", self.market_slug.as_str()), ("active", "true")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let body = response.text().await?;
        parse_markets_response(&body)
    }
}

/// First listed market wins. Missing price defaults to 0.5, missing volume to 0.
pub fn parse_markets_response(body: &str) -> Result<PriceQuote, FetchError> {
    let response: GammaMarketsResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::Malformed(e.to_string()))?;

    let market = response
        .markets
        .first()
        .ok_or_else(|| FetchError::Malformed("no markets in response".to_string()))?;

    PriceQuote::remote(
        market.yes_bid.unwrap_or(0.5),
        market.volume.unwrap_or(0.0),
    )
    .validated()
}
