use ndarray::Array2;
use ndarray_rand::rand::rngs::StdRng;
use ndarray_rand::rand::{Rng, SeedableRng};
use tracing::info;

use crate::config::{IMAGE_SIZE, LoaderConfig, NUM_CLASSES, train_size};
use crate::error::{LoadError, ValidationError};
use crate::fetch::load_labels;
use crate::retry::retry;
use crate::sampler::{Batch, Partition, ShuffledSampler};
use crate::sprite::load_sprite;

/// The MNIST sprite dataset held in memory, split into a train and a test partition, each with
/// its own shuffled sampler.
///
/// Image and label corpora are fixed once constructed; drawing a batch only moves the partition's
/// cursor.
#[derive(Debug)]
pub struct MnistData {
    images: Vec<f32>,
    labels: Vec<u8>,
    num_examples: usize,
    train: ShuffledSampler,
    test: ShuffledSampler,
}

impl MnistData {
    /// Fetches the sprite and the labels concurrently (each retried on its own), validates them
    /// and builds the partitions.
    pub async fn load(config: &LoaderConfig) -> Result<MnistData, LoadError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(LoadError::Client)?;

        info!(images = %config.images, labels = %config.labels, "loading MNIST");
        let (images, labels) = tokio::join!(
            retry(config.retry, "sprite", || load_sprite(&client, config)),
            retry(config.retry, "labels", || load_labels(&client, &config.labels)),
        );
        let images = images.map_err(LoadError::Images)?;
        let labels = labels.map_err(LoadError::Labels)?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let data = MnistData::from_corpora(images, labels, config.num_examples, &mut rng)?;
        info!(
            train = data.num_train(),
            test = data.num_test(),
            "MNIST loaded"
        );
        Ok(data)
    }

    /// Validates already-decoded corpora of `num_examples` examples and partitions them.
    pub fn from_corpora<R: Rng + ?Sized>(
        images: Vec<f32>,
        labels: Vec<u8>,
        num_examples: usize,
        rng: &mut R,
    ) -> Result<MnistData, ValidationError> {
        let expected = num_examples * IMAGE_SIZE;
        if images.len() != expected {
            return Err(ValidationError::ImageCorpus {
                expected,
                actual: images.len(),
            });
        }
        let expected = num_examples * NUM_CLASSES;
        if labels.len() != expected {
            return Err(ValidationError::LabelCorpus {
                expected,
                actual: labels.len(),
            });
        }

        let num_train = train_size(num_examples);
        if num_train == 0 || num_train == num_examples {
            return Err(ValidationError::EmptyPartition { num_examples });
        }
        let train = ShuffledSampler::new(num_train, rng);
        let test = ShuffledSampler::new(num_examples - num_train, rng);
        Ok(MnistData {
            images,
            labels,
            num_examples,
            train,
            test,
        })
    }

    pub fn num_examples(&self) -> usize {
        self.num_examples
    }

    pub fn num_train(&self) -> usize {
        self.train.len()
    }

    pub fn num_test(&self) -> usize {
        self.test.len()
    }

    pub fn sampler(&self, partition: Partition) -> &ShuffledSampler {
        match partition {
            Partition::Train => &self.train,
            Partition::Test => &self.test,
        }
    }

    /// The partition's images, `IMAGE_SIZE` values per example.
    pub fn images(&self, partition: Partition) -> &[f32] {
        let split = self.num_train() * IMAGE_SIZE;
        match partition {
            Partition::Train => &self.images[..split],
            Partition::Test => &self.images[split..],
        }
    }

    /// The partition's one-hot labels, `NUM_CLASSES` bytes per example.
    pub fn labels(&self, partition: Partition) -> &[u8] {
        let split = self.num_train() * NUM_CLASSES;
        match partition {
            Partition::Train => &self.labels[..split],
            Partition::Test => &self.labels[split..],
        }
    }

    pub fn next_train_batch(&mut self, batch_size: usize) -> Batch {
        self.next_batch(Partition::Train, batch_size)
    }

    pub fn next_test_batch(&mut self, batch_size: usize) -> Batch {
        self.next_batch(Partition::Test, batch_size)
    }

    /// Draws `batch_size` examples in permutation order, wrapping as often as needed.
    pub fn next_batch(&mut self, partition: Partition, batch_size: usize) -> Batch {
        let sampler = match partition {
            Partition::Train => &mut self.train,
            Partition::Test => &mut self.test,
        };
        let indices: Vec<usize> = (0..batch_size).map(|_| sampler.next_index()).collect();

        let (images, labels) = (self.images(partition), self.labels(partition));

        let mut batch_images = Array2::zeros((batch_size, IMAGE_SIZE));
        let mut batch_labels = Array2::zeros((batch_size, NUM_CLASSES));
        for ((&index, mut image_row), mut label_row) in indices
            .iter()
            .zip(batch_images.rows_mut())
            .zip(batch_labels.rows_mut())
        {
            let image = &images[index * IMAGE_SIZE..(index + 1) * IMAGE_SIZE];
            let label = &labels[index * NUM_CLASSES..(index + 1) * NUM_CLASSES];
            image_row.iter_mut().zip(image).for_each(|(dst, &v)| *dst = v);
            label_row
                .iter_mut()
                .zip(label)
                .for_each(|(dst, &v)| *dst = f32::from(v));
        }

        Batch {
            images: batch_images,
            labels: batch_labels,
            indices,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A dataset whose example `i` has every pixel equal to `i / 1000` and label `i % 10`.
    pub(crate) fn tagged_corpora(num_examples: usize) -> (Vec<f32>, Vec<u8>) {
        let mut images = Vec::with_capacity(num_examples * IMAGE_SIZE);
        let mut labels = vec![0u8; num_examples * NUM_CLASSES];
        for i in 0..num_examples {
            images.extend(std::iter::repeat_n(i as f32 / 1000.0, IMAGE_SIZE));
            labels[i * NUM_CLASSES + i % NUM_CLASSES] = 1;
        }
        (images, labels)
    }

    fn tagged(num_examples: usize, seed: u64) -> MnistData {
        let (images, labels) = tagged_corpora(num_examples);
        MnistData::from_corpora(images, labels, num_examples, &mut StdRng::seed_from_u64(seed))
            .unwrap()
    }

    #[test]
    fn rejects_short_image_corpus() {
        let (mut images, labels) = tagged_corpora(12);
        images.pop();
        let err = MnistData::from_corpora(images, labels, 12, &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::ImageCorpus {
                expected: 12 * IMAGE_SIZE,
                actual: 12 * IMAGE_SIZE - 1
            }
        );
    }

    #[test]
    fn rejects_long_label_corpus() {
        let (images, mut labels) = tagged_corpora(12);
        labels.push(0);
        let err = MnistData::from_corpora(images, labels, 12, &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::LabelCorpus {
                expected: 120,
                actual: 121
            }
        );
    }

    #[test]
    fn rejects_counts_that_leave_a_partition_empty() {
        for num_examples in [0, 1] {
            let (images, labels) = tagged_corpora(num_examples);
            let err = MnistData::from_corpora(
                images,
                labels,
                num_examples,
                &mut StdRng::seed_from_u64(0),
            )
            .unwrap_err();
            assert_eq!(err, ValidationError::EmptyPartition { num_examples });
        }
    }

    #[test]
    fn smallest_count_with_both_partitions_loads() {
        let data = tagged(2, 0);
        assert_eq!(data.num_train(), 1);
        assert_eq!(data.num_test(), 1);
    }

    #[test]
    fn partitions_split_at_five_sixths_without_reordering() {
        let data = tagged(12, 0);
        assert_eq!(data.num_train(), 10);
        assert_eq!(data.num_test(), 2);
        assert_eq!(data.images(Partition::Train).len(), 10 * IMAGE_SIZE);
        assert_eq!(data.labels(Partition::Test).len(), 2 * NUM_CLASSES);
        // First test example is corpus example 10.
        assert_eq!(data.images(Partition::Test)[0], 10.0 / 1000.0);
        assert_eq!(data.labels(Partition::Test)[0], 1);
    }

    #[test]
    fn batch_rows_match_their_indices() {
        let mut data = tagged(30, 3);
        let batch = data.next_train_batch(7);
        assert_eq!(batch.images.dim(), (7, IMAGE_SIZE));
        assert_eq!(batch.labels.dim(), (7, NUM_CLASSES));

        for (row, &index) in batch.indices.iter().enumerate() {
            let image = batch.images.row(row);
            assert!(image.iter().all(|&v| v == index as f32 / 1000.0));
            let hot: Vec<usize> = batch
                .labels
                .row(row)
                .iter()
                .enumerate()
                .filter(|(_, v)| **v == 1.0)
                .map(|(class, _)| class)
                .collect();
            assert_eq!(hot, vec![index % NUM_CLASSES]);
        }
    }

    #[test]
    fn test_batches_are_offset_into_the_test_partition() {
        let mut data = tagged(12, 5);
        let batch = data.next_test_batch(2);
        let mut seen: Vec<f32> = batch.images.column(0).to_vec();
        seen.sort_by(f32::total_cmp);
        assert_eq!(seen, vec![10.0 / 1000.0, 11.0 / 1000.0]);
    }

    #[test]
    fn slices_do_not_bleed_into_neighbours() {
        let mut data = tagged(12, 9);
        for _ in 0..10 {
            let batch = data.next_train_batch(1);
            let index = batch.indices[0];
            let first = batch.images[[0, 0]];
            let last = batch.images[[0, IMAGE_SIZE - 1]];
            assert_eq!(first, index as f32 / 1000.0);
            assert_eq!(last, index as f32 / 1000.0);
            assert_eq!(batch.labels.row(0).sum(), 1.0);
        }
    }

    #[test]
    fn full_pass_covers_partition_then_wraps() {
        let mut data = tagged(60, 11);
        let pass = data.next_train_batch(50);
        let mut sorted = pass.indices.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
        assert_eq!(pass.indices, data.sampler(Partition::Train).permutation());

        let next = data.next_train_batch(1);
        assert_eq!(next.indices[0], pass.indices[0]);
    }

    #[test]
    fn oversized_batches_wrap_repeatedly() {
        let mut data = tagged(12, 1);
        let perm = data.sampler(Partition::Test).permutation().to_vec();
        let batch = data.next_test_batch(5);
        assert_eq!(
            batch.indices,
            vec![perm[0], perm[1], perm[0], perm[1], perm[0]]
        );
        for (row, &index) in batch.indices.iter().enumerate() {
            assert_eq!(batch.images[[row, 0]], (10 + index) as f32 / 1000.0);
        }
    }

    #[test]
    fn cursors_are_independent_per_partition() {
        let mut data = tagged(12, 2);
        data.next_train_batch(3);
        assert_eq!(data.sampler(Partition::Train).cursor(), Some(2));
        assert_eq!(data.sampler(Partition::Test).cursor(), None);
    }
}
