use anyhow::{Error, Result};
use ndarray::{s, Array1, Array2, Array3, ArrayD, ArrayView1, ArrayView3, Axis, Ix1, Ix3};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
    Elu,
}

impl Activation {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "linear" => Some(Activation::Linear),
            "relu" => Some(Activation::Relu),
            "sigmoid" => Some(Activation::Sigmoid),
            "tanh" => Some(Activation::Tanh),
            "softmax" => Some(Activation::Softmax),
            "elu" => Some(Activation::Elu),
            _ => None,
        }
    }

    pub fn apply(&self, mut x: ArrayD<f32>) -> ArrayD<f32> {
        match self {
            Activation::Linear => {}
            Activation::Relu => x.mapv_inplace(|v| v.max(0.0)),
            Activation::Sigmoid => x.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Tanh => x.mapv_inplace(f32::tanh),
            Activation::Elu => x.mapv_inplace(|v| if v > 0.0 { v } else { v.exp() - 1.0 }),
            Activation::Softmax => {
                if x.ndim() == 0 {
                    return x;
                }
                let last = Axis(x.ndim() - 1);
                for mut lane in x.lanes_mut(last) {
                    let max = lane.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                    lane.mapv_inplace(|v| (v - max).exp());
                    let sum = lane.sum();
                    if sum > 0.0 {
                        lane.mapv_inplace(|v| v / sum);
                    }
                }
            }
        }
        x
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    #[default]
    Valid,
    Same,
}

impl Padding {
    /// Output length and leading pad for one spatial axis.
    pub fn window(&self, input: usize, kernel: usize, stride: usize) -> Option<(usize, usize)> {
        if input == 0 || kernel == 0 || stride == 0 {
            return None;
        }
        match self {
            Padding::Valid => {
                if input < kernel {
                    return None;
                }
                Some(((input - kernel) / stride + 1, 0))
            }
            Padding::Same => {
                let out = (input + stride - 1) / stride;
                let total = ((out - 1) * stride + kernel).saturating_sub(input);
                Some((out, total / 2))
            }
        }
    }
}

/// Activation shape between layers, batch dimension excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Spatial(usize, usize, usize),
    Flat(usize),
}

#[derive(Debug, Clone)]
pub struct Conv2D {
    kernel: Array2<f32>,
    bias: Option<Array1<f32>>,
    kernel_size: (usize, usize),
    strides: (usize, usize),
    padding: Padding,
    activation: Activation,
}

impl Conv2D {
    /// `kernel` is the Keras `(kh, kw, in_channels, filters)` tensor flattened
    /// to `(kh * kw * in_channels, filters)`.
    pub fn new(
        kernel: Array2<f32>,
        bias: Option<Array1<f32>>,
        kernel_size: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
        activation: Activation,
    ) -> Self {
        Conv2D {
            kernel,
            bias,
            kernel_size,
            strides,
            padding,
            activation,
        }
    }

    fn filters(&self) -> usize {
        self.kernel.ncols()
    }

    pub fn output_shape(&self, input: Shape) -> Option<Shape> {
        let Shape::Spatial(h, w, c) = input else {
            return None;
        };
        if c * self.kernel_size.0 * self.kernel_size.1 != self.kernel.nrows() {
            return None;
        }
        let (out_h, _) = self.padding.window(h, self.kernel_size.0, self.strides.0)?;
        let (out_w, _) = self.padding.window(w, self.kernel_size.1, self.strides.1)?;
        Some(Shape::Spatial(out_h, out_w, self.filters()))
    }

    pub fn forward(&self, input: ArrayView3<f32>) -> Result<Array3<f32>> {
        let (h, w, c) = input.dim();
        let (kh, kw) = self.kernel_size;
        let (sh, sw) = self.strides;
        let (out_h, pad_top) = self.padding.window(h, kh, sh)
            .ok_or_else(|| Error::msg("conv2d - input smaller than kernel"))?;
        let (out_w, pad_left) = self.padding.window(w, kw, sw)
            .ok_or_else(|| Error::msg("conv2d - input smaller than kernel"))?;

        // im2col: one row per output pixel, columns ordered (dy, dx, channel)
        let mut patches = Array2::<f32>::zeros((out_h * out_w, kh * kw * c));
        for oy in 0..out_h {
            for ox in 0..out_w {
                let mut row = patches.row_mut(oy * out_w + ox);
                for dy in 0..kh {
                    let iy = (oy * sh + dy) as isize - pad_top as isize;
                    if iy < 0 || iy >= h as isize {
                        continue;
                    }
                    for dx in 0..kw {
                        let ix = (ox * sw + dx) as isize - pad_left as isize;
                        if ix < 0 || ix >= w as isize {
                            continue;
                        }
                        let col = (dy * kw + dx) * c;
                        row.slice_mut(s![col..col + c])
                            .assign(&input.slice(s![iy as usize, ix as usize, ..]));
                    }
                }
            }
        }

        let mut out = patches.dot(&self.kernel);
        if let Some(bias) = &self.bias {
            out += bias;
        }
        let out = self.activation.apply(out.into_dyn());
        Ok(out.into_shape_with_order((out_h, out_w, self.filters()))?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMode {
    Max,
    Average,
}

#[derive(Debug, Clone)]
pub struct Pooling2D {
    pool_size: (usize, usize),
    strides: (usize, usize),
    padding: Padding,
    mode: PoolMode,
}

impl Pooling2D {
    pub fn new(pool_size: (usize, usize), strides: (usize, usize), padding: Padding, mode: PoolMode) -> Self {
        Pooling2D {
            pool_size,
            strides,
            padding,
            mode,
        }
    }

    pub fn output_shape(&self, input: Shape) -> Option<Shape> {
        let Shape::Spatial(h, w, c) = input else {
            return None;
        };
        let (out_h, _) = self.padding.window(h, self.pool_size.0, self.strides.0)?;
        let (out_w, _) = self.padding.window(w, self.pool_size.1, self.strides.1)?;
        Some(Shape::Spatial(out_h, out_w, c))
    }

    pub fn forward(&self, input: ArrayView3<f32>) -> Result<Array3<f32>> {
        let (h, w, c) = input.dim();
        let (ph, pw) = self.pool_size;
        let (sh, sw) = self.strides;
        let (out_h, pad_top) = self.padding.window(h, ph, sh)
            .ok_or_else(|| Error::msg("pooling - input smaller than pool size"))?;
        let (out_w, pad_left) = self.padding.window(w, pw, sw)
            .ok_or_else(|| Error::msg("pooling - input smaller than pool size"))?;

        let mut out = Array3::<f32>::zeros((out_h, out_w, c));
        for oy in 0..out_h {
            let y0 = (oy * sh) as isize - pad_top as isize;
            let y_start = y0.max(0) as usize;
            let y_end = ((y0 + ph as isize).max(0) as usize).min(h);
            for ox in 0..out_w {
                let x0 = (ox * sw) as isize - pad_left as isize;
                let x_start = x0.max(0) as usize;
                let x_end = ((x0 + pw as isize).max(0) as usize).min(w);
                if y_start >= y_end || x_start >= x_end {
                    continue;
                }

                // padded cells never take part in max or mean
                let window = input.slice(s![y_start..y_end, x_start..x_end, ..]);
                for ch in 0..c {
                    let cells = window.index_axis(Axis(2), ch);
                    out[[oy, ox, ch]] = match self.mode {
                        PoolMode::Max => cells.fold(f32::NEG_INFINITY, |m, &v| m.max(v)),
                        PoolMode::Average => cells.mean().unwrap_or(0.0),
                    };
                }
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Clone)]
pub struct Dense {
    kernel: Array2<f32>,
    bias: Option<Array1<f32>>,
    activation: Activation,
}

impl Dense {
    pub fn new(kernel: Array2<f32>, bias: Option<Array1<f32>>, activation: Activation) -> Self {
        Dense {
            kernel,
            bias,
            activation,
        }
    }

    pub fn output_shape(&self, input: Shape) -> Option<Shape> {
        match input {
            Shape::Flat(n) if n == self.kernel.nrows() => Some(Shape::Flat(self.kernel.ncols())),
            _ => None,
        }
    }

    pub fn forward(&self, input: ArrayView1<f32>) -> Array1<f32> {
        let mut out = input.dot(&self.kernel);
        if let Some(bias) = &self.bias {
            out += bias;
        }
        let out = self.activation.apply(out.into_dyn());
        // activations are elementwise or lane-wise, the rank never changes
        out.into_dimensionality::<Ix1>().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct BatchNormalization {
    scale: Array1<f32>,
    offset: Array1<f32>,
}

impl BatchNormalization {
    pub fn new(
        gamma: Option<Array1<f32>>,
        beta: Option<Array1<f32>>,
        moving_mean: Array1<f32>,
        moving_variance: Array1<f32>,
        epsilon: f32,
    ) -> Self {
        let gamma = gamma.unwrap_or_else(|| Array1::ones(moving_mean.len()));
        let beta = beta.unwrap_or_else(|| Array1::zeros(moving_mean.len()));
        let scale = &gamma / &moving_variance.mapv(|v| (v + epsilon).sqrt());
        let offset = &beta - &(&moving_mean * &scale);
        BatchNormalization { scale, offset }
    }

    pub fn channels(&self) -> usize {
        self.scale.len()
    }

    pub fn forward(&self, mut input: ArrayD<f32>) -> Result<ArrayD<f32>> {
        if input.ndim() == 0 || input.shape()[input.ndim() - 1] != self.channels() {
            return Err(Error::msg("batch_normalization - channel count mismatch"));
        }
        let last = Axis(input.ndim() - 1);
        for mut lane in input.lanes_mut(last) {
            lane.zip_mut_with(&self.scale, |v, &s| *v *= s);
            lane += &self.offset;
        }
        Ok(input)
    }
}

#[derive(Debug, Clone)]
pub enum Layer {
    Conv2D(Conv2D),
    Pooling2D(Pooling2D),
    GlobalAveragePooling2D,
    BatchNormalization(BatchNormalization),
    Flatten,
    Dense(Dense),
    Activation(Activation),
}

impl Layer {
    pub fn output_shape(&self, input: Shape) -> Option<Shape> {
        match self {
            Layer::Conv2D(conv) => conv.output_shape(input),
            Layer::Pooling2D(pool) => pool.output_shape(input),
            Layer::GlobalAveragePooling2D => match input {
                Shape::Spatial(_, _, c) => Some(Shape::Flat(c)),
                Shape::Flat(_) => None,
            },
            Layer::BatchNormalization(bn) => {
                let channels = match input {
                    Shape::Spatial(_, _, c) => c,
                    Shape::Flat(n) => n,
                };
                (channels == bn.channels()).then_some(input)
            }
            Layer::Flatten => match input {
                Shape::Spatial(h, w, c) => Some(Shape::Flat(h * w * c)),
                Shape::Flat(n) => Some(Shape::Flat(n)),
            },
            Layer::Dense(dense) => dense.output_shape(input),
            Layer::Activation(_) => Some(input),
        }
    }

    pub fn forward(&self, input: ArrayD<f32>) -> Result<ArrayD<f32>> {
        match self {
            Layer::Conv2D(conv) => {
                let input = input.into_dimensionality::<Ix3>()?;
                Ok(conv.forward(input.view())?.into_dyn())
            }
            Layer::Pooling2D(pool) => {
                let input = input.into_dimensionality::<Ix3>()?;
                Ok(pool.forward(input.view())?.into_dyn())
            }
            Layer::GlobalAveragePooling2D => {
                let input = input.into_dimensionality::<Ix3>()?;
                let (h, w, c) = input.dim();
                let flat = input.into_shape_with_order((h * w, c))?;
                flat.mean_axis(Axis(0))
                    .map(|mean| mean.into_dyn())
                    .ok_or_else(|| Error::msg("global_average_pooling - empty input"))
            }
            Layer::BatchNormalization(bn) => bn.forward(input),
            Layer::Flatten => Ok(Array1::from_iter(input.iter().copied()).into_dyn()),
            Layer::Dense(dense) => {
                let input = input.into_dimensionality::<Ix1>()?;
                Ok(dense.forward(input.view()).into_dyn())
            }
            Layer::Activation(activation) => Ok(activation.apply(input)),
        }
    }
}
