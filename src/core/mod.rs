pub mod config;
pub mod normalizer;
pub mod pipeline;
pub mod sampler;
pub mod traversal;
