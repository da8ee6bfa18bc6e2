pub mod monitor;
pub mod sampler;
pub mod scheduler;
