use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to decode sprite image from {source_id}")]
    Image {
        source_id: String,
        #[source]
        source: image::ImageError,
    },
    #[error("sprite {source_id} is {actual} pixels wide, expected {expected}")]
    Width {
        source_id: String,
        expected: usize,
        actual: usize,
    },
    #[error("sprite decode task for {source_id} did not finish: {message}")]
    Worker { source_id: String, message: String },
    #[error("sprite decode for {source_id} was abandoned by its caller")]
    Cancelled { source_id: String },
}

#[derive(Debug, Error)]
#[error("loading {source_id} did not finish within {after:?}")]
pub struct TimeoutError {
    pub source_id: String,
    pub after: Duration,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GET {url} failed: status={status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("GET {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to gunzip {source_id}")]
    Gzip {
        source_id: String,
        #[source]
        source: std::io::Error,
    },
}

/// Anything that can go wrong while producing the image corpus.
#[derive(Debug, Error)]
pub enum SpriteError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("image corpus has {actual} values, expected {expected}")]
    ImageCorpus { expected: usize, actual: usize },
    #[error("label corpus has {actual} bytes, expected {expected}")]
    LabelCorpus { expected: usize, actual: usize },
    #[error("{num_examples} examples leave the train or test partition empty")]
    EmptyPartition { num_examples: usize },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid loader configuration")]
    Config(#[from] ConfigError),
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),
    #[error("failed to load MNIST images")]
    Images(#[source] SpriteError),
    #[error("failed to load MNIST labels")]
    Labels(#[source] FetchError),
    #[error("MNIST data failed validation")]
    Validation(#[from] ValidationError),
}
