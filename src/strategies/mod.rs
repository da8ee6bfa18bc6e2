pub mod spread;
pub mod types;
