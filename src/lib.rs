#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod dataset;
pub mod digit;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod network;
pub mod retry;
pub mod sampler;
pub mod sprite;

pub use config::{LoaderConfig, Source, TrainConfig};
pub use dataset::MnistData;
pub use error::LoadError;
pub use network::{Network, TrainEvent};
pub use sampler::{Batch, Partition};
