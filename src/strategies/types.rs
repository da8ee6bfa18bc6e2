use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Recommended direction for one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "BUY_A_SELL_B")]
    BuyASellB,
    #[serde(rename = "BUY_B_SELL_A")]
    BuyBSellA,
    #[serde(rename = "NO_OPPORTUNITY")]
    NoOpportunity,
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Action::BuyASellB => "BUY_A_SELL_B",
            Action::BuyBSellA => "BUY_B_SELL_A",
            Action::NoOpportunity => "NO_OPPORTUNITY",
        }
    }

    pub fn is_opportunity(&self) -> bool {
        *self != Action::NoOpportunity
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One sample of both venues. Prices and spread carry 4 decimals, profit 2.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub captured_at: DateTime<FixedOffset>,
    pub venue_a_price: f64,
    pub venue_b_price: f64,
    pub spread: f64,
    pub action: Action,
    pub estimated_profit: f64,
    pub venue_a_volume: u64,
    pub venue_b_volume: u64,
    pub venue_a_simulated: bool,
    pub venue_b_simulated: bool,
}
