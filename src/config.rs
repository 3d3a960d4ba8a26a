use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryPolicy;

/// Number of pixels in one 28x28 digit.
pub const IMAGE_SIZE: usize = 784;
pub const NUM_CLASSES: usize = 10;
/// Number of digits stacked in the sprite (one per row).
pub const NUM_DATASET_ELEMENTS: usize = 65000;

// TRAIN_TEST_RATIO = 5/6, kept as a fraction so the split is exact integer arithmetic.
pub const TRAIN_TEST_RATIO_NUM: usize = 5;
pub const TRAIN_TEST_RATIO_DEN: usize = 6;

pub const MAX_RETRIES: usize = 3;
pub const RETRY_DELAY_MS: u64 = 1000;
pub const RETRY_DELAY: Duration = Duration::from_millis(RETRY_DELAY_MS);
pub const SPRITE_CHUNK_ROWS: usize = 5000;
pub const DECODE_TIMEOUT: Duration = Duration::from_secs(30);

pub const MNIST_IMAGES_URL: &str =
    "https://storage.googleapis.com/learnjs-data/model-builder/mnist_images.png";
pub const MNIST_LABELS_URL: &str =
    "https://storage.googleapis.com/learnjs-data/model-builder/mnist_labels_uint8";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sprite chunk size must be at least one row")]
    ZeroChunkRows,
    #[error("retry policy must allow at least one attempt")]
    ZeroAttempts,
    #[error("dataset of {0} examples leaves an empty train or test partition")]
    EmptyPartition(usize),
    #[error("batch size must be at least 1")]
    ZeroBatchSize,
    #[error("network needs an input and an output layer, got {0} layer(s)")]
    TooFewLayers(usize),
    #[error(
        "network layer sizes must start at {} and end at {}, got {first}..{last}",
        IMAGE_SIZE,
        NUM_CLASSES
    )]
    LayerShape { first: usize, last: usize },
}

/// Where a dataset resource lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Http(String),
    Local(PathBuf),
}

impl Source {
    pub fn parse(location: &str) -> Source {
        if location.starts_with("http://") || location.starts_with("https://") {
            Source::Http(location.to_string())
        } else {
            Source::Local(PathBuf::from(location))
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Http(url) => f.write_str(url),
            Source::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Everything `MnistData::load` needs to know.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub images: Source,
    pub labels: Source,
    pub retry: RetryPolicy,
    pub chunk_rows: usize,
    pub decode_timeout: Duration,
    /// Expected example count. Only tests and trimmed mirrors of the dataset change this.
    pub num_examples: usize,
    /// Seed for the partition permutations; `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            images: Source::parse(MNIST_IMAGES_URL),
            labels: Source::parse(MNIST_LABELS_URL),
            retry: RetryPolicy::default(),
            chunk_rows: SPRITE_CHUNK_ROWS,
            decode_timeout: DECODE_TIMEOUT,
            num_examples: NUM_DATASET_ELEMENTS,
            seed: None,
        }
    }
}

impl LoaderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_rows == 0 {
            return Err(ConfigError::ZeroChunkRows);
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        let train = train_size(self.num_examples);
        if train == 0 || train == self.num_examples {
            return Err(ConfigError::EmptyPartition(self.num_examples));
        }
        Ok(())
    }
}

/// Size of the training partition for a dataset of `num_examples`.
pub fn train_size(num_examples: usize) -> usize {
    num_examples * TRAIN_TEST_RATIO_NUM / TRAIN_TEST_RATIO_DEN
}

/// Hyperparameters for `Network::train`.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub layer_sizes: Vec<usize>,
    pub epochs: usize,
    pub batch_size: usize,
    /// Train examples drawn per epoch. Defaults to one full pass over the train partition.
    pub examples_per_epoch: usize,
    pub learning_rate: f32,
    pub test_batch_size: usize,
    /// Emit a batch progress event every this many batches (0 disables).
    pub log_every: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            layer_sizes: vec![IMAGE_SIZE, 30, NUM_CLASSES],
            epochs: 10,
            batch_size: 10,
            examples_per_epoch: train_size(NUM_DATASET_ELEMENTS),
            learning_rate: 3.0,
            test_batch_size: 1000,
            log_every: 500,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 || self.test_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        match (self.layer_sizes.first(), self.layer_sizes.last()) {
            _ if self.layer_sizes.len() < 2 => {
                Err(ConfigError::TooFewLayers(self.layer_sizes.len()))
            }
            (Some(&first), Some(&last)) if first != IMAGE_SIZE || last != NUM_CLASSES => {
                Err(ConfigError::LayerShape { first, last })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_sizes_match_the_fixed_dataset() {
        let train = train_size(NUM_DATASET_ELEMENTS);
        assert_eq!(train, 54166);
        assert_eq!(NUM_DATASET_ELEMENTS - train, 10834);
    }

    #[test]
    fn source_parse_distinguishes_urls_from_paths() {
        assert_eq!(
            Source::parse("http://localhost/x.png"),
            Source::Http("http://localhost/x.png".into())
        );
        assert_eq!(
            Source::parse("data/mnist_images.png"),
            Source::Local(PathBuf::from("data/mnist_images.png"))
        );
    }

    #[test]
    fn loader_config_rejects_degenerate_values() {
        let config = LoaderConfig {
            chunk_rows: 0,
            ..LoaderConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroChunkRows)));

        let config = LoaderConfig {
            num_examples: 1,
            ..LoaderConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyPartition(1))
        ));

        assert!(LoaderConfig::default().validate().is_ok());
    }

    #[test]
    fn train_config_checks_layer_shape() {
        let config = TrainConfig {
            layer_sizes: vec![IMAGE_SIZE, 30, 9],
            ..TrainConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::LayerShape { first: 784, last: 9 })
        ));
        let config = TrainConfig {
            layer_sizes: vec![IMAGE_SIZE],
            ..TrainConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::TooFewLayers(1))));
    }
}
