use tracing_subscriber::EnvFilter;

/// Initializes a `tracing_subscriber` using `MNIST_LOG` first, then `RUST_LOG`, then `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt().with_env_filter(env_filter()).init();
}

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("MNIST_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
