#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand::rngs::StdRng;
use tracing::info;

use mnist_sprite::config::{
    DECODE_TIMEOUT, IMAGE_SIZE, MAX_RETRIES, MNIST_IMAGES_URL, MNIST_LABELS_URL,
    NUM_CLASSES, NUM_DATASET_ELEMENTS, RETRY_DELAY_MS, SPRITE_CHUNK_ROWS, train_size,
};
use mnist_sprite::digit::{load_digit, visualize};
use mnist_sprite::retry::RetryPolicy;
use mnist_sprite::{LoaderConfig, MnistData, Network, Source, TrainConfig, TrainEvent};

#[derive(Debug, Parser)]
#[command(name = "mnist-sprite", about = "Train a digit classifier on the MNIST sprite")]
struct Args {
    /// Sprite image: http(s) URL or local path.
    #[arg(long, env = "MNIST_IMAGES", default_value = MNIST_IMAGES_URL)]
    images: String,

    /// One-hot label buffer: http(s) URL or local path.
    #[arg(long, env = "MNIST_LABELS", default_value = MNIST_LABELS_URL)]
    labels: String,

    #[arg(long, env = "MNIST_MAX_ATTEMPTS", default_value_t = MAX_RETRIES)]
    max_attempts: usize,

    #[arg(long, env = "MNIST_RETRY_DELAY_MS", default_value_t = RETRY_DELAY_MS)]
    retry_delay_ms: u64,

    #[arg(long, env = "MNIST_CHUNK_ROWS", default_value_t = SPRITE_CHUNK_ROWS)]
    chunk_rows: usize,

    #[arg(long, env = "MNIST_DECODE_TIMEOUT_SECS", default_value_t = DECODE_TIMEOUT.as_secs())]
    decode_timeout_secs: u64,

    #[arg(long, env = "MNIST_NUM_EXAMPLES", default_value_t = NUM_DATASET_ELEMENTS)]
    num_examples: usize,

    /// Seed for the partition permutations and the network weights.
    #[arg(long, env = "MNIST_SEED")]
    seed: Option<u64>,

    /// Hidden layer sizes, comma separated.
    #[arg(long, env = "MNIST_HIDDEN", value_delimiter = ',', default_value = "30")]
    hidden: Vec<usize>,

    #[arg(long, env = "MNIST_EPOCHS", default_value_t = 10)]
    epochs: usize,

    #[arg(long, env = "MNIST_BATCH_SIZE", default_value_t = 10)]
    batch_size: usize,

    /// Train examples per epoch (defaults to the whole train partition).
    #[arg(long, env = "MNIST_EXAMPLES_PER_EPOCH")]
    examples_per_epoch: Option<usize>,

    #[arg(long, env = "MNIST_LEARNING_RATE", default_value_t = 3.0)]
    learning_rate: f32,

    #[arg(long, env = "MNIST_TEST_BATCH_SIZE", default_value_t = 1000)]
    test_batch_size: usize,

    /// Log training loss every N batches (0 disables).
    #[arg(long, env = "MNIST_LOG_EVERY", default_value_t = 500)]
    log_every: usize,

    /// Classify this image file once training is done.
    #[arg(long)]
    classify: Option<PathBuf>,
}

impl Args {
    fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            images: Source::parse(&self.images),
            labels: Source::parse(&self.labels),
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                delay: Duration::from_millis(self.retry_delay_ms),
            },
            chunk_rows: self.chunk_rows,
            decode_timeout: Duration::from_secs(self.decode_timeout_secs),
            num_examples: self.num_examples,
            seed: self.seed,
        }
    }

    fn train_config(&self) -> TrainConfig {
        let mut layer_sizes = vec![IMAGE_SIZE];
        layer_sizes.extend(&self.hidden);
        layer_sizes.push(NUM_CLASSES);
        TrainConfig {
            layer_sizes,
            epochs: self.epochs,
            batch_size: self.batch_size,
            examples_per_epoch: self
                .examples_per_epoch
                .unwrap_or_else(|| train_size(self.num_examples)),
            learning_rate: self.learning_rate,
            test_batch_size: self.test_batch_size,
            log_every: self.log_every,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    mnist_sprite::logging::init_tracing();
    let args = Args::parse();

    let train_config = args.train_config();
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut network = Network::from_config(&train_config, &mut rng)?;

    let mut data = MnistData::load(&args.loader_config())
        .await
        .context("loading MNIST sprite dataset")?;

    network.train(&mut data, &train_config, |event| match event {
        TrainEvent::Batch { epoch, batch, loss } => {
            info!(epoch, batch, loss, "batch");
        }
        TrainEvent::Epoch {
            epoch,
            test_loss,
            test_accuracy,
        } => {
            info!(epoch, test_loss, test_accuracy, "epoch done");
        }
    })?;

    if let Some(path) = &args.classify {
        let digit = load_digit(path).with_context(|| format!("reading {}", path.display()))?;
        println!("{}", visualize(digit.view()));
        println!("Prediction: {}", network.predict(digit.view()));
    }

    Ok(())
}
