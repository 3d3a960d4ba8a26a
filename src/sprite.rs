use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use image::{DynamicImage, GenericImageView, imageops};
use tracing::{debug, info};

use crate::config::{IMAGE_SIZE, LoaderConfig, Source};
use crate::error::{DecodeError, SpriteError, TimeoutError};
use crate::fetch::fetch_bytes;

/// Decodes a sprite (one `IMAGE_SIZE`-pixel digit per row) into a flat buffer of
/// `IMAGE_SIZE * height` values in [0, 1].
///
/// The image is walked in chunks of `chunk_rows` rows; only the current chunk's pixels are
/// materialized at a time. All channels of the sprite are equal, so only channel 0 is read.
pub fn decode_sprite(
    bytes: &[u8],
    source_id: &str,
    chunk_rows: usize,
) -> Result<Vec<f32>, DecodeError> {
    decode_sprite_until(bytes, source_id, chunk_rows, &AtomicBool::new(false))
}

/// Like `decode_sprite`, but gives up between chunks once `cancelled` is set.
fn decode_sprite_until(
    bytes: &[u8],
    source_id: &str,
    chunk_rows: usize,
    cancelled: &AtomicBool,
) -> Result<Vec<f32>, DecodeError> {
    let img = image::load_from_memory(bytes).map_err(|source| DecodeError::Image {
        source_id: source_id.to_string(),
        source,
    })?;
    let width = img.width() as usize;
    if width != IMAGE_SIZE {
        return Err(DecodeError::Width {
            source_id: source_id.to_string(),
            expected: IMAGE_SIZE,
            actual: width,
        });
    }
    normalize_chunked(&img, chunk_rows, cancelled).ok_or_else(|| DecodeError::Cancelled {
        source_id: source_id.to_string(),
    })
}

// `img` must be exactly IMAGE_SIZE pixels wide. Returns `None` if cancelled.
fn normalize_chunked(
    img: &DynamicImage,
    chunk_rows: usize,
    cancelled: &AtomicBool,
) -> Option<Vec<f32>> {
    let (width, height) = img.dimensions();
    let height = height as usize;
    let mut out = vec![0f32; height * IMAGE_SIZE];
    let chunk_rows = chunk_rows.max(1);

    for (chunk_index, y0) in (0..height).step_by(chunk_rows).enumerate() {
        if cancelled.load(Ordering::Relaxed) {
            return None;
        }
        let rows = chunk_rows.min(height - y0);
        // y0 and rows are both bounded by `height`, which came from a u32.
        let chunk = imageops::crop_imm(img, 0, y0 as u32, width, rows as u32).to_image();
        let offset = chunk_index * chunk_rows * IMAGE_SIZE;
        for (dst, px) in out[offset..offset + rows * IMAGE_SIZE]
            .iter_mut()
            .zip(chunk.pixels())
        {
            *dst = f32::from(px.0[0]) / 255.0;
        }
        debug!(chunk_index, rows, "decoded sprite chunk");
    }

    Some(out)
}

/// Fetches and decodes the sprite named by `config.images`, bounded by `config.decode_timeout`.
pub async fn load_sprite(
    client: &reqwest::Client,
    config: &LoaderConfig,
) -> Result<Vec<f32>, SpriteError> {
    let source = &config.images;
    let source_id = source.to_string();
    let images = with_deadline(&source_id, config.decode_timeout, async {
        let bytes = fetch_bytes(client, source).await?;
        decode_off_thread(bytes, source, config.chunk_rows).await
    })
    .await??;
    info!(source = %source_id, values = images.len(), "sprite decoded");
    Ok(images)
}

// Raises the flag when the awaiting future is dropped, e.g. by a timeout.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

// The blocking task cannot be aborted, so a caller that stops waiting (timeout) sets a flag the
// worker checks between chunks. The initial PNG decode itself still runs to completion.
async fn decode_off_thread(
    bytes: Vec<u8>,
    source: &Source,
    chunk_rows: usize,
) -> Result<Vec<f32>, SpriteError> {
    let source_id = source.to_string();
    let worker_id = source_id.clone();
    let cancelled = Arc::new(AtomicBool::new(false));
    let guard = CancelOnDrop(cancelled.clone());
    let decoded = tokio::task::spawn_blocking(move || {
        decode_sprite_until(&bytes, &worker_id, chunk_rows, &cancelled)
    })
    .await
    .map_err(|e| DecodeError::Worker {
        source_id,
        message: e.to_string(),
    })??;
    drop(guard);
    Ok(decoded)
}

/// Fails with `TimeoutError` if `fut` has not resolved after `after`.
pub async fn with_deadline<T>(
    source_id: &str,
    after: Duration,
    fut: impl Future<Output = T>,
) -> Result<T, TimeoutError> {
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| TimeoutError {
            source_id: source_id.to_string(),
            after,
        })
}
