pub mod heatmap;
pub mod logger;
pub mod report;
