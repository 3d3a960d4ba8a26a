use itertools::Itertools;
use ndarray::{Array, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_rand::{RandomExt, rand::Rng, rand_distr::StandardNormal};

use crate::config::{ConfigError, TrainConfig};
use crate::dataset::MnistData;
use crate::sampler::Batch;

/// Progress reported by `Network::train`.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainEvent {
    /// Emitted every `log_every` batches. `batch` counts from 1 within the epoch.
    Batch { epoch: usize, batch: usize, loss: f32 },
    /// Emitted once per epoch after scoring one test batch.
    Epoch {
        epoch: usize,
        test_loss: f32,
        test_accuracy: f32,
    },
}

pub struct Network {
    num_layers: usize,
    biases: Vec<Array2<f32>>,
    weights: Vec<Array2<f32>>,
}

impl Network {
    pub fn new<R: Rng + ?Sized>(sizes: Vec<usize>, rng: &mut R) -> Network {
        Network {
            num_layers: sizes.len(),
            // One [size x 1] column of standard-normal biases per layer after the input layer.
            biases: sizes
                .iter()
                .skip(1)
                .map(|&size| Array::random_using((size, 1), StandardNormal, rng))
                .collect(),
            // One [next_size x current_size] standard-normal matrix between each pair of layers.
            weights: sizes
                .iter()
                .tuple_windows()
                .map(|(&current_size, &next_size)| {
                    Array::random_using((next_size, current_size), StandardNormal, rng)
                })
                .collect(),
        }
    }

    pub fn from_config<R: Rng + ?Sized>(
        config: &TrainConfig,
        rng: &mut R,
    ) -> Result<Network, ConfigError> {
        config.validate()?;
        Ok(Network::new(config.layer_sizes.clone(), rng))
    }

    // Output activations for a [input_size x n] matrix whose columns are separate inputs. The
    // result is [output_size x n].
    pub fn feedforward(&self, input: ArrayView2<f32>) -> Array2<f32> {
        let mut activation = self.weights[0].dot(&input) + &self.biases[0];
        activation.mapv_inplace(sigmoid);

        for (biases, weights) in self.biases.iter().zip(self.weights.iter()).skip(1) {
            activation = weights.dot(&activation) + biases;
            activation.mapv_inplace(sigmoid);
        }

        activation
    }

    /// Most likely digit for a single flattened image.
    pub fn predict(&self, image: ArrayView1<f32>) -> usize {
        let output = self.feedforward(image.insert_axis(Axis(1)));
        argmax(output.column(0))
    }

    /// Quadratic cost and fraction of correctly classified rows of `batch`. An empty batch
    /// scores `(0.0, 0.0)`.
    pub fn evaluate(&self, batch: &Batch) -> (f32, f32) {
        if batch.is_empty() {
            return (0.0, 0.0);
        }
        let output = self.feedforward(batch.images.t());
        let loss = quadratic_cost(&output, batch.labels.t());
        let correct = output
            .columns()
            .into_iter()
            .zip(batch.labels.rows())
            .filter(|(out, expected)| argmax(out.view()) == argmax(expected.view()))
            .count();
        (loss, correct as f32 / batch.len() as f32)
    }

    /// Trains with stochastic gradient descent on batches drawn from the train partition.
    ///
    /// Each epoch draws `examples_per_epoch / batch_size` batches, so the sampler's cursor (and
    /// its fixed permutation order) carries over from one epoch to the next. After every epoch
    /// one `test_batch_size` batch from the test partition is scored.
    pub fn train<F>(
        &mut self,
        data: &mut MnistData,
        config: &TrainConfig,
        mut on_event: F,
    ) -> Result<(), ConfigError>
    where
        F: FnMut(&TrainEvent),
    {
        config.validate()?;
        let batches_per_epoch = (config.examples_per_epoch / config.batch_size).max(1);

        for epoch in 0..config.epochs {
            for batch_index in 1..=batches_per_epoch {
                let batch = data.next_train_batch(config.batch_size);
                let loss = self.update_mini_batch(&batch, config.learning_rate);
                if config.log_every > 0 && batch_index % config.log_every == 0 {
                    on_event(&TrainEvent::Batch {
                        epoch,
                        batch: batch_index,
                        loss,
                    });
                }
            }

            let test_batch = data.next_test_batch(config.test_batch_size);
            let (test_loss, test_accuracy) = self.evaluate(&test_batch);
            on_event(&TrainEvent::Epoch {
                epoch,
                test_loss,
                test_accuracy,
            });
        }

        Ok(())
    }

    // Takes one gradient step on `batch` and returns the batch's cost before the step.
    fn update_mini_batch(&mut self, batch: &Batch, learning_rate: f32) -> f32 {
        // Batches are row-per-example; the network works on column-per-example matrices.
        let inputs = batch.images.t();
        let expected = batch.labels.t();
        let (nabla_biases, nabla_weights, output) = self.backpropagate(inputs, expected);
        let scale = learning_rate / batch.len() as f32;

        for (bias, mut nabla_bias) in self.biases.iter_mut().zip(nabla_biases) {
            nabla_bias.mapv_inplace(|nb| nb * scale);
            *bias -= &nabla_bias;
        }
        for (weight, mut nabla_weight) in self.weights.iter_mut().zip(nabla_weights) {
            nabla_weight.mapv_inplace(|nw| nw * scale);
            *weight -= &nabla_weight;
        }

        quadratic_cost(&output, expected)
    }

    // Gradients of the cost summed over the batch, plus the output activations of the forward
    // pass.
    fn backpropagate(
        &self,
        inputs: ArrayView2<f32>,
        expected: ArrayView2<f32>,
    ) -> (Vec<Array2<f32>>, Vec<Array2<f32>>, Array2<f32>) {
        let mut nabla_biases: Vec<Array2<f32>> = self
            .biases
            .iter()
            .map(|bias| Array::zeros(bias.raw_dim()))
            .collect();
        let mut nabla_weights: Vec<Array2<f32>> = self
            .weights
            .iter()
            .map(|weight| Array::zeros(weight.raw_dim()))
            .collect();

        let mut activation = inputs.to_owned();
        let mut activations = Vec::with_capacity(self.num_layers);
        let mut zs = Vec::with_capacity(self.num_layers - 1);

        // Each activation is moved into `activations` before the next one is computed, so the
        // output activation is the one left over after the loop.
        for (bias, weight) in self.biases.iter().zip(self.weights.iter()) {
            let z = weight.dot(&activation) + bias;
            activations.push(activation);
            activation = z.mapv(sigmoid);
            zs.push(z);
        }

        // zs and the nabla vectors have num_layers - 1 entries; activations (without the output)
        // has num_layers - 1 too.
        let last = self.num_layers - 2;
        let z = &mut zs[last];
        z.mapv_inplace(sigmoid_derivative);
        let mut delta = (&activation - &expected) * &*z;

        // Each column of delta belongs to one example; summing across columns sums the batch.
        nabla_biases[last] = delta.sum_axis(Axis(1)).insert_axis(Axis(1));
        nabla_weights[last] = delta.dot(&activations[last].t());

        for l in 2..self.num_layers {
            let layer = self.num_layers - 1 - l;
            let z = &mut zs[layer];
            z.mapv_inplace(sigmoid_derivative);
            delta = self.weights[layer + 1].t().dot(&delta) * &*z;

            nabla_biases[layer] = delta.sum_axis(Axis(1)).insert_axis(Axis(1));
            nabla_weights[layer] = delta.dot(&activations[layer].t());
        }

        (nabla_biases, nabla_weights, activation)
    }
}

// Mean over columns of half the squared distance between output and expected.
fn quadratic_cost(output: &Array2<f32>, expected: ArrayView2<f32>) -> f32 {
    let n = output.ncols().max(1) as f32;
    (output - &expected).mapv(|d| d * d).sum() / (2.0 * n)
}

fn argmax(values: ArrayView1<f32>) -> usize {
    values
        .iter()
        .position_max_by(|a, b| a.total_cmp(b))
        .unwrap_or(0)
}

fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + f32::exp(-z))
}

fn sigmoid_derivative(z: f32) -> f32 {
    (1.0 - sigmoid(z)) * sigmoid(z)
}
