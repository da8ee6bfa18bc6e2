use async_trait::async_trait;
use rand::Rng;
use std::sync::Mutex;
use tracing::warn;
use crate::config::VenueConfig;
use crate::data::types::{FetchError, PriceQuote, Venue};

/// A live venue that may or may not answer.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn venue(&self) -> Venue;

    async fn fetch_quote(&self) -> Result<PriceQuote, FetchError>;
}

/// Uniform draws from a plausible band, used when the venue is unavailable.
#[derive(Debug, Clone)]
pub struct SimulatedQuote {
    price_min: f64,
    price_max: f64,
    volume_min: u64,
    volume_max: u64,
}

impl SimulatedQuote {
    pub fn new(price_min: f64, price_max: f64, volume_min: u64, volume_max: u64) -> Self {
        Self {
            price_min,
            price_max,
            volume_min,
            volume_max,
        }
    }

    pub fn from_config(config: &VenueConfig) -> Self {
        Self::new(
            config.sim_price_min,
            config.sim_price_max,
            config.sim_volume_min,
            config.sim_volume_max,
        )
    }

    /// Price in `[price_min, price_max)`, volume in `[volume_min, volume_max)`.
    pub fn quote<R: Rng + ?Sized>(&self, rng: &mut R) -> PriceQuote {
        let price = rng.gen_range(self.price_min..self.price_max);
        let volume = rng.gen_range(self.volume_min..self.volume_max);
        PriceQuote::simulated(price, volume as f64)
    }
}

/// Quote acquisition that never fails: remote first, simulated on any error.
pub struct PriceSource {
    remote: Box<dyn QuoteProvider>,
    fallback: SimulatedQuote,
    rng: Mutex<rand::rngs::StdRng>,
}

impl PriceSource {
    pub fn new(remote: Box<dyn QuoteProvider>, fallback: SimulatedQuote) -> Self {
        use rand::SeedableRng;

        Self {
            remote,
            fallback,
            rng: Mutex::new(rand::rngs::StdRng::from_entropy()),
        }
    }

    /// Fixed seed for reproducible fallback draws.
    pub fn with_seed(remote: Box<dyn QuoteProvider>, fallback: SimulatedQuote, seed: u64) -> Self {
        use rand::SeedableRng;

        Self {
            remote,
            fallback,
            rng: Mutex::new(rand::rngs::StdRng::seed_from_u64(seed)),
        }
    }

    pub fn venue(&self) -> Venue {
        self.remote.venue()
    }

    pub async fn fetch(&self) -> PriceQuote {
        match self.remote.fetch_quote().await.and_then(PriceQuote::validated) {
            Ok(quote) => quote,
            Err(e) => {
                warn!("{} unavailable, using simulated quote: {}", self.venue(), e);
                self.simulate()
            }
        }
    }

    fn simulate(&self) -> PriceQuote {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.fallback.quote(&mut *rng)
    }
}
