use std::io::Read;

use flate2::read::GzDecoder;
use tracing::debug;

use crate::config::Source;
use crate::error::FetchError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Fetches the raw bytes behind `source`, gunzipping them if they carry the gzip magic.
pub async fn fetch_bytes(client: &reqwest::Client, source: &Source) -> Result<Vec<u8>, FetchError> {
    let bytes = match source {
        Source::Http(url) => http_get(client, url).await?,
        Source::Local(path) => tokio::fs::read(path).await.map_err(|source| FetchError::Read {
            path: path.clone(),
            source,
        })?,
    };
    debug!(source = %source, bytes = bytes.len(), "fetched");

    if bytes.starts_with(&GZIP_MAGIC) {
        gunzip(&bytes, source)
    } else {
        Ok(bytes)
    }
}

/// Fetches the one-hot label buffer: `NUM_CLASSES` bytes per example, sprite order.
pub async fn load_labels(client: &reqwest::Client, source: &Source) -> Result<Vec<u8>, FetchError> {
    fetch_bytes(client, source).await
}

async fn http_get(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let transport = |source| FetchError::Transport {
        url: url.to_string(),
        source,
    };

    let resp = client.get(url).send().await.map_err(transport)?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status,
        });
    }
    let bytes = resp.bytes().await.map_err(transport)?;
    Ok(bytes.to_vec())
}

fn gunzip(bytes: &[u8], source: &Source) -> Result<Vec<u8>, FetchError> {
    let mut unzipped = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut unzipped)
        .map_err(|source_err| FetchError::Gzip {
            source_id: source.to_string(),
            source: source_err,
        })?;
    Ok(unzipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    fn temp_file(name: &str, contents: &[u8]) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("mnist-sprite-fetch-{name}-{}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn reads_local_files_verbatim() {
        let path = temp_file("plain", &[0, 1, 0, 0]);
        let client = reqwest::Client::new();
        let bytes = load_labels(&client, &Source::Local(path)).await.unwrap();
        assert_eq!(bytes, vec![0, 1, 0, 0]);
    }

    #[tokio::test]
    async fn gunzips_compressed_sources() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[1, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        let path = temp_file("gz", &encoder.finish().unwrap());

        let client = reqwest::Client::new();
        let bytes = fetch_bytes(&client, &Source::Local(path)).await.unwrap();
        assert_eq!(bytes, vec![1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let client = reqwest::Client::new();
        let source = Source::Local("/nonexistent/mnist_labels_uint8".into());
        let err = fetch_bytes(&client, &source).await.unwrap_err();
        assert!(matches!(err, FetchError::Read { .. }));
    }

    #[tokio::test]
    async fn truncated_gzip_is_reported() {
        let path = temp_file("badgz", &[0x1f, 0x8b, 0x08]);
        let client = reqwest::Client::new();
        let err = fetch_bytes(&client, &Source::Local(path)).await.unwrap_err();
        assert!(matches!(err, FetchError::Gzip { .. }));
    }
}
