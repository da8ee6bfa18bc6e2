use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Venue {
    A,
    B,
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Venue::A => write!(f, "venue A"),
            Venue::B => write!(f, "venue B"),
        }
    }
}

/// Where a quote came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Remote,
    Simulated,
}

/// A "yes" price in [0, 1] and a volume figure, as seen by one venue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceQuote {
    pub price: f64,
    pub volume: f64,
    pub provenance: Provenance,
}

impl PriceQuote {
    pub fn remote(price: f64, volume: f64) -> Self {
        Self {
            price,
            volume,
            provenance: Provenance::Remote,
        }
    }

    pub fn simulated(price: f64, volume: f64) -> Self {
        Self {
            price,
            volume,
            provenance: Provenance::Simulated,
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.provenance == Provenance::Simulated
    }

    /// Rejects prices that are not a probability in [0, 1].
    pub fn validated(self) -> Result<Self, FetchError> {
        if self.price.is_finite() && (0.0..=1.0).contains(&self.price) {
            Ok(self)
        } else {
            Err(FetchError::Malformed(format!("price {} outside [0, 1]", self.price)))
        }
    }
}

/// Why a venue call produced no usable quote. Never leaves `PriceSource`.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Accepts `0.52`, `"0.52"` or `null` for numeric API fields.
pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Str(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Num(n)) => Ok(Some(n)),
        Some(Raw::Str(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Str(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
