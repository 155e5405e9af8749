//! Model compilation
//!
//! Turns a canonical layer list into a `CompiledModel`: an executable
//! forward graph over a central parameter store, with activations fused
//! onto their owning layers and the loss selected by task kind. Parameter
//! initialization is drawn from a caller-provided seed so compilation is
//! reproducible.

use crate::dataset::{DatasetSpec, TaskKind};
use crate::model::layer::Activation;
use crate::model::validate::CanonicalLayer;
use crate::train::loss::LossKind;
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("CompilationFailed: {0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, CompileError>;

/// Spatial extent carried between conv/pool ops: (channels, height, width)
type SpatialShape = (usize, usize, usize);

/// One executable op; `w`/`b` index into the central parameter store
#[derive(Debug, Clone)]
enum LayerOp {
    Dense {
        w: usize,
        b: usize,
        activation: Activation,
    },
    Dropout {
        rate: f32,
    },
    Conv2d {
        w: usize,
        b: usize,
        activation: Activation,
        in_shape: SpatialShape,
        kernel: usize,
        filters: usize,
    },
    MaxPool2d {
        pool: usize,
        in_shape: SpatialShape,
    },
}

/// Per-op values cached by the training forward pass for backprop
pub(crate) enum OpCache {
    Dense {
        input: Array2<f32>,
        z: Array2<f32>,
        a: Array2<f32>,
    },
    Dropout {
        mask: Array2<f32>,
    },
    Conv2d {
        cols: Vec<Array2<f32>>,
        z: Array2<f32>,
        a: Array2<f32>,
    },
    MaxPool2d {
        // flat input index chosen per (sample, output element)
        argmax: Vec<Vec<usize>>,
    },
}

/// An executable forward graph with initialized parameters
///
/// Owned by one training engine for the life of one session. The forward
/// path for classification produces logits; softmax lives in the paired
/// loss (and in `predict_proba`), never in the graph itself.
pub struct CompiledModel {
    params: Vec<Array2<f32>>,
    ops: Vec<LayerOp>,
    task: TaskKind,
    output_arity: usize,
}

impl CompiledModel {
    pub fn task(&self) -> TaskKind {
        self.task
    }

    pub fn output_arity(&self) -> usize {
        self.output_arity
    }

    /// Loss paired at compile time by task kind
    pub fn loss(&self) -> LossKind {
        match self.task {
            TaskKind::Classification => LossKind::CrossEntropyLogits,
            TaskKind::Regression => LossKind::MeanSquaredError,
        }
    }

    /// Total number of trainable parameters
    pub fn num_parameters(&self) -> usize {
        self.params.iter().map(Array2::len).sum()
    }

    pub(crate) fn params(&self) -> &[Array2<f32>] {
        &self.params
    }

    pub(crate) fn params_mut(&mut self) -> &mut [Array2<f32>] {
        &mut self.params
    }

    /// Inference pass: dropout is skipped, classification output is logits
    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let mut current = x.clone();
        for op in &self.ops {
            current = match op {
                LayerOp::Dense { w, b, activation } => {
                    let mut z = current.dot(&self.params[*w]);
                    z += &self.params[*b];
                    activation.apply(&mut z);
                    z
                }
                LayerOp::Dropout { .. } => current,
                LayerOp::Conv2d {
                    w,
                    b,
                    activation,
                    in_shape,
                    kernel,
                    filters,
                } => {
                    let (out, _) = self.conv_forward(
                        &current,
                        *w,
                        *b,
                        *in_shape,
                        *kernel,
                        *filters,
                        false,
                    );
                    let mut out = out;
                    activation.apply(&mut out);
                    out
                }
                LayerOp::MaxPool2d { pool, in_shape } => {
                    let (out, _) = pool_forward(&current, *pool, *in_shape);
                    out
                }
            };
        }
        current
    }

    /// Training pass: applies dropout and caches intermediates for backprop
    pub(crate) fn forward_train(
        &self,
        x: &Array2<f32>,
        rng: &mut StdRng,
    ) -> (Array2<f32>, Vec<OpCache>) {
        let mut current = x.clone();
        let mut caches = Vec::with_capacity(self.ops.len());
        for op in &self.ops {
            match op {
                LayerOp::Dense { w, b, activation } => {
                    let input = current;
                    let mut z = input.dot(&self.params[*w]);
                    z += &self.params[*b];
                    let mut a = z.clone();
                    activation.apply(&mut a);
                    current = a.clone();
                    caches.push(OpCache::Dense { input, z, a });
                }
                LayerOp::Dropout { rate } => {
                    let keep = 1.0 - rate;
                    let mask = Array2::from_shape_fn(current.raw_dim(), |_| {
                        if rng.gen::<f32>() < keep {
                            1.0 / keep
                        } else {
                            0.0
                        }
                    });
                    current = &current * &mask;
                    caches.push(OpCache::Dropout { mask });
                }
                LayerOp::Conv2d {
                    w,
                    b,
                    activation,
                    in_shape,
                    kernel,
                    filters,
                } => {
                    let (z, cols) = self.conv_forward(
                        &current,
                        *w,
                        *b,
                        *in_shape,
                        *kernel,
                        *filters,
                        true,
                    );
                    let mut a = z.clone();
                    activation.apply(&mut a);
                    current = a.clone();
                    caches.push(OpCache::Conv2d {
                        cols: cols.unwrap_or_default(),
                        z,
                        a,
                    });
                }
                LayerOp::MaxPool2d { pool, in_shape } => {
                    let (out, argmax) = pool_forward(&current, *pool, *in_shape);
                    current = out;
                    caches.push(OpCache::MaxPool2d { argmax });
                }
            }
        }
        (current, caches)
    }

    /// Backward pass over the cached forward; returns gradients aligned
    /// with the parameter store. `grad_out` is dL/d(output).
    pub(crate) fn backward(
        &self,
        caches: &[OpCache],
        grad_out: Array2<f32>,
    ) -> Vec<Array2<f32>> {
        let mut grads: Vec<Array2<f32>> = self
            .params
            .iter()
            .map(|p| Array2::zeros(p.raw_dim()))
            .collect();
        let mut grad = grad_out;

        for (op, cache) in self.ops.iter().zip(caches).rev() {
            match (op, cache) {
                (LayerOp::Dense { w, b, activation }, OpCache::Dense { input, z, a }) => {
                    let gz = activation.backward(z, a, &grad);
                    grads[*w] = input.t().dot(&gz);
                    grads[*b] = gz.sum_axis(Axis(0)).insert_axis(Axis(0));
                    grad = gz.dot(&self.params[*w].t());
                }
                (LayerOp::Dropout { .. }, OpCache::Dropout { mask }) => {
                    grad = &grad * mask;
                }
                (
                    LayerOp::Conv2d {
                        w,
                        b,
                        activation,
                        in_shape,
                        kernel,
                        filters,
                    },
                    OpCache::Conv2d { cols, z, a },
                ) => {
                    let gz = activation.backward(z, a, &grad);
                    grad = self.conv_backward(
                        &gz,
                        cols,
                        *w,
                        *b,
                        &mut grads,
                        *in_shape,
                        *kernel,
                        *filters,
                    );
                }
                (LayerOp::MaxPool2d { in_shape, .. }, OpCache::MaxPool2d { argmax }) => {
                    grad = pool_backward(&grad, argmax, *in_shape);
                }
                _ => unreachable!("op/cache mismatch"),
            }
        }
        grads
    }

    #[allow(clippy::too_many_arguments)]
    fn conv_forward(
        &self,
        x: &Array2<f32>,
        w: usize,
        b: usize,
        in_shape: SpatialShape,
        kernel: usize,
        filters: usize,
        keep_cols: bool,
    ) -> (Array2<f32>, Option<Vec<Array2<f32>>>) {
        let (c, h, wd) = in_shape;
        let (oh, ow) = (h - kernel + 1, wd - kernel + 1);
        let batch = x.nrows();
        let mut out = Array2::zeros((batch, filters * oh * ow));
        let mut all_cols = keep_cols.then(|| Vec::with_capacity(batch));

        let weight = &self.params[w];
        let bias = &self.params[b];
        for s in 0..batch {
            let cols = im2col(&x.row(s).to_owned(), c, h, wd, kernel);
            // (filters, c*k*k) . (c*k*k, oh*ow)
            let mut fmap = weight.dot(&cols);
            for f in 0..filters {
                let bv = bias[[0, f]];
                fmap.row_mut(f).mapv_inplace(|v| v + bv);
            }
            for f in 0..filters {
                for o in 0..oh * ow {
                    out[[s, f * oh * ow + o]] = fmap[[f, o]];
                }
            }
            if let Some(cs) = all_cols.as_mut() {
                cs.push(cols);
            }
        }
        (out, all_cols)
    }

    #[allow(clippy::too_many_arguments)]
    fn conv_backward(
        &self,
        gz: &Array2<f32>,
        cols: &[Array2<f32>],
        w: usize,
        b: usize,
        grads: &mut [Array2<f32>],
        in_shape: SpatialShape,
        kernel: usize,
        filters: usize,
    ) -> Array2<f32> {
        let (c, h, wd) = in_shape;
        let (oh, ow) = (h - kernel + 1, wd - kernel + 1);
        let batch = gz.nrows();
        let weight = &self.params[w];
        let mut grad_in = Array2::zeros((batch, c * h * wd));

        for s in 0..batch {
            let mut g = Array2::zeros((filters, oh * ow));
            for f in 0..filters {
                for o in 0..oh * ow {
                    g[[f, o]] = gz[[s, f * oh * ow + o]];
                }
            }
            let delta = g.dot(&cols[s].t());
            grads[w] += &delta;
            for f in 0..filters {
                grads[b][[0, f]] += g.row(f).sum();
            }
            let dcols = weight.t().dot(&g);
            col2im(&dcols, c, h, wd, kernel, &mut grad_in, s);
        }
        grad_in
    }
}

/// Unroll one flat sample into convolution columns: (c*k*k, oh*ow)
fn im2col(sample: &ndarray::Array1<f32>, c: usize, h: usize, w: usize, k: usize) -> Array2<f32> {
    let (oh, ow) = (h - k + 1, w - k + 1);
    let mut cols = Array2::zeros((c * k * k, oh * ow));
    for ci in 0..c {
        for ki in 0..k {
            for kj in 0..k {
                let row = ci * k * k + ki * k + kj;
                for oi in 0..oh {
                    for oj in 0..ow {
                        let src = ci * h * w + (oi + ki) * w + (oj + kj);
                        cols[[row, oi * ow + oj]] = sample[src];
                    }
                }
            }
        }
    }
    cols
}

/// Scatter-add column gradients back into the flat input gradient
fn col2im(
    dcols: &Array2<f32>,
    c: usize,
    h: usize,
    w: usize,
    k: usize,
    grad_in: &mut Array2<f32>,
    sample: usize,
) {
    let (oh, ow) = (h - k + 1, w - k + 1);
    for ci in 0..c {
        for ki in 0..k {
            for kj in 0..k {
                let row = ci * k * k + ki * k + kj;
                for oi in 0..oh {
                    for oj in 0..ow {
                        let dst = ci * h * w + (oi + ki) * w + (oj + kj);
                        grad_in[[sample, dst]] += dcols[[row, oi * ow + oj]];
                    }
                }
            }
        }
    }
}

/// Non-overlapping max pooling; records argmax indices for backprop
fn pool_forward(
    x: &Array2<f32>,
    pool: usize,
    in_shape: SpatialShape,
) -> (Array2<f32>, Vec<Vec<usize>>) {
    let (c, h, w) = in_shape;
    let (oh, ow) = (h / pool, w / pool);
    let batch = x.nrows();
    let mut out = Array2::zeros((batch, c * oh * ow));
    let mut argmax = Vec::with_capacity(batch);
    for s in 0..batch {
        let mut indices = Vec::with_capacity(c * oh * ow);
        for ci in 0..c {
            for oi in 0..oh {
                for oj in 0..ow {
                    let mut best = f32::NEG_INFINITY;
                    let mut best_idx = 0;
                    for pi in 0..pool {
                        for pj in 0..pool {
                            let idx = ci * h * w + (oi * pool + pi) * w + (oj * pool + pj);
                            let v = x[[s, idx]];
                            if v > best {
                                best = v;
                                best_idx = idx;
                            }
                        }
                    }
                    out[[s, ci * oh * ow + oi * ow + oj]] = best;
                    indices.push(best_idx);
                }
            }
        }
        argmax.push(indices);
    }
    (out, argmax)
}

fn pool_backward(
    grad: &Array2<f32>,
    argmax: &[Vec<usize>],
    in_shape: SpatialShape,
) -> Array2<f32> {
    let (c, h, w) = in_shape;
    let batch = grad.nrows();
    let mut grad_in = Array2::zeros((batch, c * h * w));
    for s in 0..batch {
        for (o, &src) in argmax[s].iter().enumerate() {
            grad_in[[s, src]] += grad[[s, o]];
        }
    }
    grad_in
}

/// He-uniform limit for the relu family, Glorot-uniform otherwise
fn init_limit(fan_in: usize, fan_out: usize, activation: Activation) -> f32 {
    if activation.is_relu_family() {
        (6.0 / fan_in as f32).sqrt()
    } else {
        (6.0 / (fan_in + fan_out) as f32).sqrt()
    }
}

fn init_weight(
    rng: &mut StdRng,
    fan_in: usize,
    fan_out: usize,
    activation: Activation,
) -> Array2<f32> {
    let limit = init_limit(fan_in, fan_out, activation);
    Array2::from_shape_fn((fan_in, fan_out), |_| rng.gen_range(-limit..limit))
}

/// Compile a validated architecture against its dataset
///
/// The validator has already established structure; shape inconsistencies
/// found here indicate a compiler bug and surface as `CompilationFailed`.
pub fn compile(
    canonical: &[CanonicalLayer],
    spec: &DatasetSpec,
    seed: u64,
) -> Result<CompiledModel> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut params: Vec<Array2<f32>> = Vec::new();
    let mut ops: Vec<LayerOp> = Vec::new();

    let mut width = 0usize;
    let mut spatial: Option<SpatialShape> = None;

    for layer in canonical {
        match layer {
            CanonicalLayer::Input { shape } => {
                width = shape.iter().product();
                if shape.len() >= 2 {
                    spatial = Some((1, shape[0], shape[1]));
                }
                if width == 0 {
                    return Err(CompileError::Failed(
                        "input layer has zero width".to_string(),
                    ));
                }
            }
            CanonicalLayer::Hidden { neurons, activation } => {
                let w = params.len();
                params.push(init_weight(&mut rng, width, *neurons, *activation));
                let b = params.len();
                params.push(Array2::zeros((1, *neurons)));
                ops.push(LayerOp::Dense {
                    w,
                    b,
                    activation: *activation,
                });
                width = *neurons;
                spatial = None;
            }
            CanonicalLayer::Output { neurons, activation } => {
                let w = params.len();
                params.push(init_weight(&mut rng, width, *neurons, *activation));
                let b = params.len();
                params.push(Array2::zeros((1, *neurons)));
                // Softmax on the output is fused into the cross-entropy
                // loss; the graph emits logits.
                ops.push(LayerOp::Dense {
                    w,
                    b,
                    activation: Activation::Linear,
                });
                width = *neurons;
            }
            CanonicalLayer::Dropout { rate } => {
                ops.push(LayerOp::Dropout { rate: *rate });
            }
            CanonicalLayer::Conv2d {
                filters,
                kernel,
                activation,
            } => {
                let in_shape = spatial.ok_or_else(|| {
                    CompileError::Failed("conv2d without a spatial input shape".to_string())
                })?;
                let (c, h, wd) = in_shape;
                if *kernel > h.min(wd) {
                    return Err(CompileError::Failed(format!(
                        "conv2d kernel {kernel} exceeds the {h}x{wd} feature map"
                    )));
                }
                let w = params.len();
                let fan_in = c * kernel * kernel;
                let limit = init_limit(fan_in, *filters, *activation);
                // weight rows are filters: shape (filters, c*k*k)
                params.push(Array2::from_shape_fn((*filters, fan_in), |_| {
                    rng.gen_range(-limit..limit)
                }));
                let b = params.len();
                params.push(Array2::zeros((1, *filters)));
                let (oh, ow) = (h - kernel + 1, wd - kernel + 1);
                ops.push(LayerOp::Conv2d {
                    w,
                    b,
                    activation: *activation,
                    in_shape,
                    kernel: *kernel,
                    filters: *filters,
                });
                spatial = Some((*filters, oh, ow));
                width = filters * oh * ow;
            }
            CanonicalLayer::Maxpool2d { pool } => {
                let in_shape = spatial.ok_or_else(|| {
                    CompileError::Failed("maxpool2d without a spatial input shape".to_string())
                })?;
                let (c, h, wd) = in_shape;
                let (oh, ow) = (h / pool, wd / pool);
                if oh == 0 || ow == 0 {
                    return Err(CompileError::Failed(format!(
                        "maxpool2d pool {pool} exceeds the {h}x{wd} feature map"
                    )));
                }
                ops.push(LayerOp::MaxPool2d {
                    pool: *pool,
                    in_shape,
                });
                spatial = Some((c, oh, ow));
                width = c * oh * ow;
            }
            CanonicalLayer::Flatten => {
                spatial = None;
            }
        }
    }

    if width != spec.output_arity {
        return Err(CompileError::Failed(format!(
            "output width {width} does not match dataset arity {}",
            spec.output_arity
        )));
    }

    Ok(CompiledModel {
        params,
        ops,
        task: spec.task,
        output_arity: spec.output_arity,
    })
}
