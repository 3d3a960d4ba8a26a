use ndarray::Array2;
use ndarray_rand::rand::Rng;
use ndarray_rand::rand::seq::SliceRandom;

/// Which half of the dataset a batch is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Train,
    Test,
}

/// A fixed permutation of a partition's indices and a cursor into it.
///
/// The permutation is drawn once and reused on every pass: after the last index the cursor wraps
/// back to the start and the same order repeats.
#[derive(Debug, Clone)]
pub struct ShuffledSampler {
    permutation: Vec<usize>,
    // `None` until the first draw, so that the first draw yields `permutation[0]`.
    cursor: Option<usize>,
}

impl ShuffledSampler {
    /// Shuffles `0..len` with `rng`. `len` must be non-zero; `MnistData` rejects empty
    /// partitions before building its samplers.
    pub(crate) fn new<R: Rng + ?Sized>(len: usize, rng: &mut R) -> ShuffledSampler {
        let mut permutation: Vec<usize> = (0..len).collect();
        permutation.shuffle(rng);
        ShuffledSampler::from_permutation(permutation)
    }

    pub(crate) fn from_permutation(permutation: Vec<usize>) -> ShuffledSampler {
        assert!(!permutation.is_empty(), "cannot sample an empty partition");
        ShuffledSampler {
            permutation,
            cursor: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.permutation.len()
    }

    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    /// Position of the last drawn index in the permutation.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Advances the cursor by one (wrapping) and returns the index it now points at.
    pub fn next_index(&mut self) -> usize {
        let next = match self.cursor {
            None => 0,
            Some(cursor) => (cursor + 1) % self.permutation.len(),
        };
        self.cursor = Some(next);
        self.permutation[next]
    }
}

/// A batch of examples ready to feed to a model.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `[batch_size, IMAGE_SIZE]`, values in [0, 1].
    pub images: Array2<f32>,
    /// `[batch_size, NUM_CLASSES]`, one-hot 0.0 / 1.0.
    pub labels: Array2<f32>,
    /// Partition-relative example index of each row.
    pub indices: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand::rngs::StdRng;

    #[test]
    fn draws_follow_the_permutation_from_the_start() {
        let mut sampler = ShuffledSampler::from_permutation(vec![3, 0, 5, 2, 4, 1]);
        assert_eq!(sampler.cursor(), None);

        let drawn: Vec<usize> = (0..4).map(|_| sampler.next_index()).collect();
        assert_eq!(drawn, vec![3, 0, 5, 2]);
        assert_eq!(sampler.cursor(), Some(3));
        assert_eq!(sampler.permutation()[3], 2);
    }

    #[test]
    fn one_pass_covers_every_index_then_repeats() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut sampler = ShuffledSampler::new(50, &mut rng);

        let mut first_pass: Vec<usize> = (0..50).map(|_| sampler.next_index()).collect();
        assert_eq!(first_pass, sampler.permutation());
        let first = first_pass[0];
        assert_eq!(sampler.next_index(), first);

        first_pass.sort_unstable();
        assert_eq!(first_pass, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn wraps_many_times_without_drifting() {
        let mut sampler = ShuffledSampler::from_permutation(vec![2, 0, 1]);
        let drawn: Vec<usize> = (0..10).map(|_| sampler.next_index()).collect();
        assert_eq!(drawn, vec![2, 0, 1, 2, 0, 1, 2, 0, 1, 2]);
        assert_eq!(sampler.cursor(), Some(0));
    }

    #[test]
    fn same_seed_same_permutation() {
        let a = ShuffledSampler::new(100, &mut StdRng::seed_from_u64(42));
        let b = ShuffledSampler::new(100, &mut StdRng::seed_from_u64(42));
        assert_eq!(a.permutation(), b.permutation());
    }
}
