use std::fs;
use std::path::Path;

use anyhow::{Error, Result};
use log::info;
use ndarray::{Array1, Array2, ArrayD, Ix1};
use crate::error::errors::ModelLoadError;
use crate::pipeline::keras::architecture::{Architecture, LayerDefinition, PoolingConfig};
use crate::pipeline::keras::layers::{BatchNormalization, Conv2D, Dense, Layer, PoolMode, Pooling2D, Shape};
use crate::pipeline::keras::weights::{LayerWeights, WeightStore};

/// Keras CNN materialized from a JSON architecture and HDF5 weights.
/// Immutable after construction, so one instance serves every caller.
#[derive(Debug, Clone)]
pub struct KerasModel {
    layers: Vec<Layer>,
    input_shape: (usize, usize, usize),
    output_size: usize,
}

impl KerasModel {
    pub fn load(architecture_path: &Path, weights_path: &Path) -> Result<Self, ModelLoadError> {
        for path in [architecture_path, weights_path] {
            if !path.exists() {
                return Err(ModelLoadError::MissingFile(path.to_path_buf()))
            }
        }

        let json = fs::read_to_string(architecture_path).map_err(|source| ModelLoadError::Io {
            path: architecture_path.to_path_buf(),
            source,
        })?;
        let architecture = Architecture::from_json(&json)?;

        let layer_names: Vec<&str> = architecture.layers.iter().map(|layer| layer.name.as_str()).collect();
        let weights = WeightStore::read_hdf5(weights_path, &layer_names)?;

        let model = Self::build(&architecture, &weights)?;
        info!(
            "loaded keras model from {} with {} layers, input {:?}, {} outputs",
            architecture_path.display(),
            model.layers.len(),
            model.input_shape,
            model.output_size,
        );
        Ok(model)
    }

    /// Assembles the layer stack, checking every tensor against the shape
    /// propagated from the input.
    pub fn build(architecture: &Architecture, weights: &WeightStore) -> Result<Self, ModelLoadError> {
        let input_shape = architecture.input_shape.unwrap_or((48, 48, 1));
        if input_shape.0 == 0 || input_shape.1 == 0 || input_shape.2 == 0 {
            return Err(ModelLoadError::UnsupportedArchitecture(format!(
                "input shape {input_shape:?} has an empty dimension"
            )))
        }
        let mut shape = Shape::Spatial(input_shape.0, input_shape.1, input_shape.2);
        let mut layers = Vec::with_capacity(architecture.layers.len());

        for entry in &architecture.layers {
            let name = entry.name.as_str();
            let layer = match &entry.definition {
                LayerDefinition::Input | LayerDefinition::Dropout => continue,
                LayerDefinition::Flatten => Layer::Flatten,
                LayerDefinition::GlobalAveragePooling2D => Layer::GlobalAveragePooling2D,
                LayerDefinition::Activation(activation) => Layer::Activation(*activation),
                LayerDefinition::MaxPooling2D(cfg) => Layer::Pooling2D(pooling(cfg, PoolMode::Max)),
                LayerDefinition::AveragePooling2D(cfg) => Layer::Pooling2D(pooling(cfg, PoolMode::Average)),
                LayerDefinition::Conv2D(cfg) => {
                    let Shape::Spatial(_, _, channels) = shape else {
                        return Err(ModelLoadError::mismatch(name, "convolution after flatten"))
                    };
                    let tensors = layer_weights(weights, name)?;
                    let (kh, kw) = cfg.kernel_size;
                    let kernel = tensor(tensors, name, "kernel", 0, &[kh, kw, channels, cfg.filters])?;
                    let kernel = to_matrix(kernel, name, kh * kw * channels, cfg.filters)?;
                    let bias = match cfg.use_bias {
                        true => Some(to_vector(tensor(tensors, name, "bias", 1, &[cfg.filters])?, name)?),
                        false => None,
                    };
                    Layer::Conv2D(Conv2D::new(kernel, bias, cfg.kernel_size, cfg.strides, cfg.padding, cfg.activation))
                }
                LayerDefinition::Dense(cfg) => {
                    let Shape::Flat(features) = shape else {
                        return Err(ModelLoadError::mismatch(name, "dense layer needs a flattened input"))
                    };
                    let tensors = layer_weights(weights, name)?;
                    let kernel = tensor(tensors, name, "kernel", 0, &[features, cfg.units])?;
                    let kernel = to_matrix(kernel, name, features, cfg.units)?;
                    let bias = match cfg.use_bias {
                        true => Some(to_vector(tensor(tensors, name, "bias", 1, &[cfg.units])?, name)?),
                        false => None,
                    };
                    Layer::Dense(Dense::new(kernel, bias, cfg.activation))
                }
                LayerDefinition::BatchNormalization(cfg) => {
                    let channels = match shape {
                        Shape::Spatial(_, _, c) => c,
                        Shape::Flat(n) => n,
                    };
                    let tensors = layer_weights(weights, name)?;
                    // Keras omits gamma/beta when scale/center are off, shifting positions
                    let mut position = 0;
                    let mut next = |role: &str, present: bool| -> Result<Option<Array1<f32>>, ModelLoadError> {
                        if !present {
                            return Ok(None);
                        }
                        let t = tensor(tensors, name, role, position, &[channels])?;
                        position += 1;
                        Ok(Some(to_vector(t, name)?))
                    };
                    let gamma = next("gamma", cfg.scale)?;
                    let beta = next("beta", cfg.center)?;
                    let mean = next("moving_mean", true)?;
                    let variance = next("moving_variance", true)?;
                    match (mean, variance) {
                        (Some(mean), Some(variance)) => Layer::BatchNormalization(
                            BatchNormalization::new(gamma, beta, mean, variance, cfg.epsilon),
                        ),
                        _ => return Err(ModelLoadError::mismatch(name, "missing moving statistics")),
                    }
                }
            };

            shape = layer.output_shape(shape).ok_or_else(|| {
                ModelLoadError::mismatch(name, format!("cannot be applied to input of shape {shape:?}"))
            })?;
            layers.push(layer);
        }

        let output_size = match shape {
            Shape::Flat(n) => n,
            Shape::Spatial(..) => {
                return Err(ModelLoadError::UnsupportedArchitecture(
                    "model output is not a vector".to_string(),
                ))
            }
        };

        Ok(KerasModel {
            layers,
            input_shape,
            output_size,
        })
    }

    pub fn input_shape(&self) -> (usize, usize, usize) {
        self.input_shape
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    /// Runs one sample of shape `input_shape` through the network.
    pub fn predict(&self, input: ArrayD<f32>) -> Result<Array1<f32>> {
        let (h, w, c) = self.input_shape;
        let mut x = input.into_shape_with_order(vec![h, w, c])
            .map_err(|e| Error::msg(format!("keras_model - input does not match {:?}: {e}", self.input_shape)))?;

        for layer in &self.layers {
            x = layer.forward(x)?;
        }

        let output = x.into_dimensionality::<Ix1>()?;
        Ok(output)
    }
}

fn pooling(cfg: &PoolingConfig, mode: PoolMode) -> Pooling2D {
    Pooling2D::new(cfg.pool_size, cfg.strides, cfg.padding, mode)
}

fn layer_weights<'a>(weights: &'a WeightStore, name: &str) -> Result<&'a LayerWeights, ModelLoadError> {
    weights
        .layer(name)
        .ok_or_else(|| ModelLoadError::mismatch(name, "no weights found"))
}

fn tensor<'a>(
    weights: &'a LayerWeights,
    name: &str,
    role: &str,
    position: usize,
    expected: &[usize],
) -> Result<&'a ArrayD<f32>, ModelLoadError> {
    let tensor = weights
        .get(role, position)
        .ok_or_else(|| ModelLoadError::mismatch(name, format!("missing {role} weights")))?;
    if tensor.shape() != expected {
        return Err(ModelLoadError::mismatch(
            name,
            format!("{role} has shape {:?}, architecture expects {:?}", tensor.shape(), expected),
        ))
    }
    Ok(tensor)
}

fn to_matrix(tensor: &ArrayD<f32>, name: &str, rows: usize, cols: usize) -> Result<Array2<f32>, ModelLoadError> {
    tensor
        .to_shape((rows, cols))
        .map(|view| view.into_owned())
        .map_err(|e| ModelLoadError::mismatch(name, e.to_string()))
}

fn to_vector(tensor: &ArrayD<f32>, name: &str) -> Result<Array1<f32>, ModelLoadError> {
    tensor
        .clone()
        .into_dimensionality::<Ix1>()
        .map_err(|e| ModelLoadError::mismatch(name, e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use ndarray::{Array, Array2};
    use super::*;

    const SMALL_MODEL: &str = r#"{"class_name": "Sequential", "config": {"name": "sequential", "layers": [
        {"class_name": "Conv2D", "config": {"name": "conv2d", "batch_input_shape": [null, 4, 4, 1],
            "filters": 2, "kernel_size": [3, 3], "padding": "same", "activation": "relu"}},
        {"class_name": "MaxPooling2D", "config": {"name": "max_pooling2d", "pool_size": [2, 2]}},
        {"class_name": "BatchNormalization", "config": {"name": "batch_normalization", "epsilon": 0.001}},
        {"class_name": "Dropout", "config": {"name": "dropout", "rate": 0.25}},
        {"class_name": "Flatten", "config": {"name": "flatten"}},
        {"class_name": "Dense", "config": {"name": "dense", "units": 7, "activation": "softmax"}}
    ]}}"#;

    fn small_weights() -> WeightStore {
        let mut store = WeightStore::new();
        store.insert("conv2d", LayerWeights::new(vec![
            ("kernel:0".to_string(), Array::from_elem(vec![3, 3, 1, 2], 0.1f32)),
            ("bias:0".to_string(), Array::from_elem(vec![2], 0.0f32)),
        ]));
        store.insert("batch_normalization", LayerWeights::new(vec![
            ("gamma:0".to_string(), Array::from_elem(vec![2], 1.0f32)),
            ("beta:0".to_string(), Array::from_elem(vec![2], 0.0f32)),
            ("moving_mean:0".to_string(), Array::from_elem(vec![2], 0.0f32)),
            ("moving_variance:0".to_string(), Array::from_elem(vec![2], 1.0f32)),
        ]));
        let kernel = Array::from_shape_fn(vec![8, 7], |idx| (idx[0] + idx[1]) as f32 * 0.01);
        store.insert("dense", LayerWeights::new(vec![
            ("kernel:0".to_string(), kernel),
            ("bias:0".to_string(), Array::from_elem(vec![7], 0.0f32)),
        ]));
        store
    }

    #[test]
    fn test_build_and_predict() {
        let architecture = Architecture::from_json(SMALL_MODEL).unwrap();
        let model = KerasModel::build(&architecture, &small_weights()).unwrap();

        assert_eq!(model.input_shape(), (4, 4, 1));
        assert_eq!(model.output_size(), 7);

        let probabilities = model.predict(Array::from_elem(vec![4, 4], 0.5f32)).unwrap();
        assert_eq!(probabilities.len(), 7);
        assert!((probabilities.sum() - 1.0).abs() < 1e-5);
        assert!(probabilities.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_rejects_kernel_shape_mismatch() {
        let architecture = Architecture::from_json(SMALL_MODEL).unwrap();
        let mut weights = small_weights();
        weights.insert("dense", LayerWeights::new(vec![
            ("kernel:0".to_string(), Array::from_elem(vec![9, 7], 0.0f32)),
            ("bias:0".to_string(), Array::from_elem(vec![7], 0.0f32)),
        ]));

        match KerasModel::build(&architecture, &weights) {
            Err(ModelLoadError::WeightMismatch { layer, .. }) => assert_eq!(layer, "dense"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_rejects_missing_layer_weights() {
        let architecture = Architecture::from_json(SMALL_MODEL).unwrap();
        let mut weights = small_weights();
        weights.insert("conv2d", LayerWeights::default());

        assert!(matches!(
            KerasModel::build(&architecture, &weights),
            Err(ModelLoadError::WeightMismatch { .. })
        ));
    }

    #[test]
    fn test_predict_rejects_wrong_input_size() {
        let architecture = Architecture::from_json(SMALL_MODEL).unwrap();
        let model = KerasModel::build(&architecture, &small_weights()).unwrap();
        assert!(model.predict(Array2::<f32>::zeros((5, 5)).into_dyn()).is_err());
    }

    #[test]
    fn test_rejects_empty_input_dimension() {
        let json = SMALL_MODEL.replace("[null, 4, 4, 1]", "[null, 0, 4, 1]");
        let architecture = Architecture::from_json(&json).unwrap();

        assert!(matches!(
            KerasModel::build(&architecture, &small_weights()),
            Err(ModelLoadError::UnsupportedArchitecture(_))
        ));
    }

    #[test]
    fn test_load_reports_missing_files() {
        let missing = PathBuf::from("does/not/exist.json");
        match KerasModel::load(&missing, &missing) {
            Err(ModelLoadError::MissingFile(path)) => assert_eq!(path, missing),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let architecture_path = dir.path().join("model.json");
        let weights_path = dir.path().join("weights.h5");

        std::fs::write(&architecture_path, r#"{"class_name": "Sequential", "config": {"layers": [
            {"class_name": "Flatten", "config": {"name": "flatten", "batch_input_shape": [null, 48, 48, 1]}},
            {"class_name": "Dense", "config": {"name": "dense", "units": 7, "activation": "softmax"}}
        ]}}"#).unwrap();
        {
            let file = hdf5::File::create(&weights_path).unwrap();
            let group = file.create_group("dense").unwrap().create_group("dense").unwrap();
            let kernel: Vec<f32> = (0..48 * 48 * 7).map(|i| if i % 7 == 3 { 0.01 } else { 0.0 }).collect();
            group.new_dataset::<f32>().shape([48 * 48, 7]).create("kernel:0").unwrap()
                .write_raw(&kernel[..]).unwrap();
            group.new_dataset::<f32>().shape([7]).create("bias:0").unwrap()
                .write_raw(&[0.0f32; 7][..]).unwrap();
        }

        let model = KerasModel::load(&architecture_path, &weights_path).unwrap();
        let probabilities = model.predict(Array::from_elem(vec![48, 48, 1], 1.0f32)).unwrap();

        let best = probabilities
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &p)| if p > best.1 { (i, p) } else { best });
        assert_eq!(best.0, 3);
    }
}
