pub mod gamma_api;
pub mod orderbook_api;
pub mod price_source;
pub mod types;
