//! Client bundles and collectors for concrete platforms.

pub mod aws;
pub mod simulated;
