use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use crate::error::errors::ModelLoadError;
use crate::pipeline::keras::layers::{Activation, Padding};

#[derive(Debug, Deserialize)]
struct ModelDescription {
    class_name: String,
    config: ModelConfig,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ModelConfig {
    Layers { layers: Vec<LayerSpec> },
    // Keras < 2.2.3 wrote Sequential configs as a bare list
    Legacy(Vec<LayerSpec>),
}

#[derive(Debug, Clone, Deserialize)]
struct LayerSpec {
    class_name: String,
    config: Value,
    #[serde(default)]
    inbound_nodes: Value,
}

/// Keras writes 2D sizes as `[h, w]`; older configs sometimes use a bare int.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum Pair {
    Single(usize),
    Both([usize; 2]),
}

impl Pair {
    fn dims(self) -> (usize, usize) {
        match self {
            Pair::Single(v) => (v, v),
            Pair::Both([h, w]) => (h, w),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Conv2DSpec {
    filters: usize,
    kernel_size: Pair,
    strides: Option<Pair>,
    #[serde(default)]
    padding: Padding,
    activation: Option<String>,
    #[serde(default = "enabled")]
    use_bias: bool,
    data_format: Option<String>,
    dilation_rate: Option<Pair>,
}

#[derive(Debug, Deserialize)]
struct PoolingSpec {
    pool_size: Option<Pair>,
    strides: Option<Pair>,
    #[serde(default)]
    padding: Padding,
    data_format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DenseSpec {
    units: usize,
    activation: Option<String>,
    #[serde(default = "enabled")]
    use_bias: bool,
}

#[derive(Debug, Deserialize)]
struct BatchNormalizationSpec {
    #[serde(default = "default_epsilon")]
    epsilon: f32,
    #[serde(default = "enabled")]
    center: bool,
    #[serde(default = "enabled")]
    scale: bool,
}

#[derive(Debug, Deserialize)]
struct ActivationSpec {
    activation: String,
}

fn enabled() -> bool {
    true
}

fn default_epsilon() -> f32 {
    1e-3
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conv2DConfig {
    pub filters: usize,
    pub kernel_size: (usize, usize),
    pub strides: (usize, usize),
    pub padding: Padding,
    pub activation: Activation,
    pub use_bias: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolingConfig {
    pub pool_size: (usize, usize),
    pub strides: (usize, usize),
    pub padding: Padding,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DenseConfig {
    pub units: usize,
    pub activation: Activation,
    pub use_bias: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchNormalizationConfig {
    pub epsilon: f32,
    pub center: bool,
    pub scale: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerDefinition {
    Input,
    Conv2D(Conv2DConfig),
    MaxPooling2D(PoolingConfig),
    AveragePooling2D(PoolingConfig),
    GlobalAveragePooling2D,
    BatchNormalization(BatchNormalizationConfig),
    Dropout,
    Flatten,
    Dense(DenseConfig),
    Activation(Activation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerEntry {
    pub name: String,
    pub definition: LayerDefinition,
}

/// Linear layer stack described by a Keras `model.to_json()` document.
#[derive(Debug, Clone, PartialEq)]
pub struct Architecture {
    pub input_shape: Option<(usize, usize, usize)>,
    pub layers: Vec<LayerEntry>,
}

impl Architecture {
    pub fn from_json(json: &str) -> Result<Self, ModelLoadError> {
        let description: ModelDescription = serde_json::from_str(json)?;

        match description.class_name.as_str() {
            "Sequential" | "Functional" | "Model" => {}
            other => {
                return Err(ModelLoadError::UnsupportedArchitecture(format!("model class {other}")))
            }
        }

        let specs = match description.config {
            ModelConfig::Layers { layers } => layers,
            ModelConfig::Legacy(layers) => layers,
        };

        let mut input_shape = None;
        let mut layers = Vec::with_capacity(specs.len());
        for (idx, spec) in specs.iter().enumerate() {
            if !spec.is_linear() {
                return Err(ModelLoadError::UnsupportedArchitecture(format!(
                    "layer {} has more than one input", spec.name(idx)
                )))
            }
            if input_shape.is_none() {
                input_shape = spec.declared_input_shape()?;
            }
            layers.push(LayerEntry {
                name: spec.name(idx),
                definition: spec.definition()?,
            });
        }

        if layers.iter().all(|layer| matches!(layer.definition, LayerDefinition::Input)) {
            return Err(ModelLoadError::UnsupportedArchitecture("model has no layers".to_string()))
        }

        Ok(Architecture { input_shape, layers })
    }
}

impl LayerSpec {
    fn name(&self, idx: usize) -> String {
        match self.config.get("name").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => format!("{}_{}", self.class_name.to_lowercase(), idx),
        }
    }

    fn parse<T: DeserializeOwned>(&self) -> Result<T, ModelLoadError> {
        Ok(serde_json::from_value(self.config.clone())?)
    }

    fn is_linear(&self) -> bool {
        // Keras 2 functional graphs: [[["prev_layer", 0, 0, {}], ...]]
        match &self.inbound_nodes {
            Value::Array(nodes) => nodes.iter().all(|node| match node {
                Value::Array(inputs) => inputs.len() <= 1,
                _ => true,
            }) && nodes.len() <= 1,
            _ => true,
        }
    }

    fn declared_input_shape(&self) -> Result<Option<(usize, usize, usize)>, ModelLoadError> {
        let shape = ["batch_input_shape", "batch_shape"]
            .iter()
            .find_map(|key| self.config.get(*key))
            .and_then(Value::as_array);

        let Some(shape) = shape else {
            return Ok(None);
        };

        let dims: Vec<Option<usize>> = shape.iter().map(|v| v.as_u64().map(|d| d as usize)).collect();
        match dims.as_slice() {
            [_, Some(h), Some(w), Some(c)] => Ok(Some((*h, *w, *c))),
            _ => Err(ModelLoadError::UnsupportedArchitecture(format!(
                "input shape {shape:?} is not (batch, height, width, channels)"
            ))),
        }
    }

    fn definition(&self) -> Result<LayerDefinition, ModelLoadError> {
        let definition = match self.class_name.as_str() {
            "InputLayer" => LayerDefinition::Input,
            "Dropout" | "SpatialDropout2D" | "GaussianNoise" => LayerDefinition::Dropout,
            "Flatten" => LayerDefinition::Flatten,
            "GlobalAveragePooling2D" => LayerDefinition::GlobalAveragePooling2D,
            "Conv2D" | "Convolution2D" => {
                let spec: Conv2DSpec = self.parse()?;
                check_channels_last(spec.data_format.as_deref())?;
                if let Some(dilation) = spec.dilation_rate {
                    if dilation.dims() != (1, 1) {
                        return Err(ModelLoadError::UnsupportedArchitecture("dilated convolution".to_string()))
                    }
                }
                LayerDefinition::Conv2D(Conv2DConfig {
                    filters: spec.filters,
                    kernel_size: spec.kernel_size.dims(),
                    strides: spec.strides.map(Pair::dims).unwrap_or((1, 1)),
                    padding: spec.padding,
                    activation: activation(spec.activation.as_deref())?,
                    use_bias: spec.use_bias,
                })
            }
            "MaxPooling2D" | "MaxPool2D" | "AveragePooling2D" | "AvgPool2D" => {
                let spec: PoolingSpec = self.parse()?;
                check_channels_last(spec.data_format.as_deref())?;
                let pool_size = spec.pool_size.map(Pair::dims).unwrap_or((2, 2));
                let config = PoolingConfig {
                    pool_size,
                    strides: spec.strides.map(Pair::dims).unwrap_or(pool_size),
                    padding: spec.padding,
                };
                if self.class_name.starts_with("Max") {
                    LayerDefinition::MaxPooling2D(config)
                } else {
                    LayerDefinition::AveragePooling2D(config)
                }
            }
            "Dense" => {
                let spec: DenseSpec = self.parse()?;
                LayerDefinition::Dense(DenseConfig {
                    units: spec.units,
                    activation: activation(spec.activation.as_deref())?,
                    use_bias: spec.use_bias,
                })
            }
            "BatchNormalization" => {
                let spec: BatchNormalizationSpec = self.parse()?;
                LayerDefinition::BatchNormalization(BatchNormalizationConfig {
                    epsilon: spec.epsilon,
                    center: spec.center,
                    scale: spec.scale,
                })
            }
            "Activation" => {
                let spec: ActivationSpec = self.parse()?;
                LayerDefinition::Activation(activation(Some(&spec.activation))?)
            }
            other => {
                return Err(ModelLoadError::UnsupportedArchitecture(format!("layer type {other}")))
            }
        };
        Ok(definition)
    }
}

fn activation(name: Option<&str>) -> Result<Activation, ModelLoadError> {
    let name = name.unwrap_or("linear");
    Activation::from_name(name)
        .ok_or_else(|| ModelLoadError::UnsupportedArchitecture(format!("activation {name}")))
}

fn check_channels_last(data_format: Option<&str>) -> Result<(), ModelLoadError> {
    match data_format {
        None | Some("channels_last") => Ok(()),
        Some(other) => Err(ModelLoadError::UnsupportedArchitecture(format!("data format {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEQUENTIAL: &str = r#"{
        "class_name": "Sequential",
        "config": {
            "name": "sequential",
            "layers": [
                {"class_name": "Conv2D", "config": {"name": "conv2d", "batch_input_shape": [null, 48, 48, 1],
                    "filters": 8, "kernel_size": [3, 3], "strides": [1, 1], "padding": "valid",
                    "activation": "relu", "use_bias": true, "dtype": "float32"}},
                {"class_name": "MaxPooling2D", "config": {"name": "max_pooling2d", "pool_size": [2, 2],
                    "padding": "valid", "strides": [2, 2]}},
                {"class_name": "Dropout", "config": {"name": "dropout", "rate": 0.4}},
                {"class_name": "Flatten", "config": {"name": "flatten"}},
                {"class_name": "Dense", "config": {"name": "dense", "units": 7, "activation": "softmax"}}
            ]
        },
        "keras_version": "2.15.0",
        "backend": "tensorflow"
    }"#;

    #[test]
    fn test_parse_sequential() {
        let architecture = Architecture::from_json(SEQUENTIAL).unwrap();

        assert_eq!(architecture.input_shape, Some((48, 48, 1)));
        assert_eq!(architecture.layers.len(), 5);
        assert_eq!(architecture.layers[0].name, "conv2d");
        assert_eq!(
            architecture.layers[0].definition,
            LayerDefinition::Conv2D(Conv2DConfig {
                filters: 8,
                kernel_size: (3, 3),
                strides: (1, 1),
                padding: Padding::Valid,
                activation: Activation::Relu,
                use_bias: true,
            })
        );
        assert_eq!(architecture.layers[2].definition, LayerDefinition::Dropout);
        assert_eq!(
            architecture.layers[4].definition,
            LayerDefinition::Dense(DenseConfig { units: 7, activation: Activation::Softmax, use_bias: true })
        );
    }

    #[test]
    fn test_parse_keras3_input_layer() {
        let json = r#"{
            "module": "keras", "class_name": "Sequential",
            "config": {"name": "sequential", "layers": [
                {"module": "keras.layers", "class_name": "InputLayer",
                 "config": {"batch_shape": [null, 48, 48, 1], "dtype": "float32", "name": "input_layer"}},
                {"module": "keras.layers", "class_name": "MaxPooling2D",
                 "config": {"name": "pool", "pool_size": 3, "padding": "same"}},
                {"module": "keras.layers", "class_name": "GlobalAveragePooling2D", "config": {"name": "gap"}}
            ]}
        }"#;

        let architecture = Architecture::from_json(json).unwrap();
        assert_eq!(architecture.input_shape, Some((48, 48, 1)));
        assert_eq!(
            architecture.layers[1].definition,
            LayerDefinition::MaxPooling2D(PoolingConfig { pool_size: (3, 3), strides: (3, 3), padding: Padding::Same })
        );
    }

    #[test]
    fn test_parse_legacy_list_config() {
        let json = r#"{"class_name": "Sequential", "config": [
            {"class_name": "Flatten", "config": {"name": "flatten_1", "batch_input_shape": [null, 48, 48, 1]}},
            {"class_name": "Dense", "config": {"name": "dense_1", "units": 7}}
        ]}"#;

        let architecture = Architecture::from_json(json).unwrap();
        assert_eq!(architecture.layers.len(), 2);
        assert_eq!(
            architecture.layers[1].definition,
            LayerDefinition::Dense(DenseConfig { units: 7, activation: Activation::Linear, use_bias: true })
        );
    }

    #[test]
    fn test_rejects_unknown_layer() {
        let json = r#"{"class_name": "Sequential", "config": {"layers": [
            {"class_name": "LSTM", "config": {"name": "lstm", "units": 4}}
        ]}}"#;

        match Architecture::from_json(json) {
            Err(ModelLoadError::UnsupportedArchitecture(message)) => assert!(message.contains("LSTM")),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_rejects_unknown_activation() {
        let json = r#"{"class_name": "Sequential", "config": {"layers": [
            {"class_name": "Dense", "config": {"name": "dense", "units": 4, "activation": "swish"}}
        ]}}"#;

        assert!(matches!(Architecture::from_json(json), Err(ModelLoadError::UnsupportedArchitecture(_))));
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(Architecture::from_json("{not json"), Err(ModelLoadError::Json(_))));
    }

    #[test]
    fn test_rejects_merge_layers() {
        let json = r#"{"class_name": "Functional", "config": {"layers": [
            {"class_name": "Dense", "config": {"name": "dense", "units": 4},
             "inbound_nodes": [[["a", 0, 0, {}], ["b", 0, 0, {}]]]}
        ]}}"#;

        assert!(matches!(Architecture::from_json(json), Err(ModelLoadError::UnsupportedArchitecture(_))));
    }
}
