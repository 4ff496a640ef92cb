use std::collections::HashMap;
use std::path::Path;

use log::debug;
use ndarray::{ArrayD, IxDyn};
use crate::error::errors::ModelLoadError;

/// Tensors stored for one layer, in file order.
#[derive(Debug, Clone, Default)]
pub struct LayerWeights {
    tensors: Vec<(String, ArrayD<f32>)>,
}

impl LayerWeights {
    pub fn new(tensors: Vec<(String, ArrayD<f32>)>) -> Self {
        LayerWeights { tensors }
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Looks a tensor up by its Keras weight name (`kernel:0`, `gamma`, ...),
    /// falling back to its position for files that only number their
    /// variables (`vars/0`, `vars/1`, ...).
    pub fn get(&self, role: &str, position: usize) -> Option<&ArrayD<f32>> {
        let named = self.tensors.iter().find(|(name, _)| {
            let leaf = name.rsplit('/').next().unwrap_or(name);
            leaf == role || leaf.starts_with(&format!("{role}:"))
        });
        match named {
            Some((_, tensor)) => Some(tensor),
            None if self.is_numbered() => self.tensors.get(position).map(|(_, tensor)| tensor),
            None => None,
        }
    }

    fn is_numbered(&self) -> bool {
        self.tensors.iter().all(|(name, _)| {
            name.rsplit('/').next().map(|leaf| leaf.parse::<usize>().is_ok()).unwrap_or(false)
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct WeightStore {
    layers: HashMap<String, LayerWeights>,
}

impl WeightStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, layer: &str, weights: LayerWeights) {
        self.layers.insert(layer.to_string(), weights);
    }

    pub fn layer(&self, layer: &str) -> Option<&LayerWeights> {
        self.layers.get(layer).filter(|weights| !weights.is_empty())
    }

    /// Reads the weights of `layer_names` from a Keras HDF5 file.
    ///
    /// Handles `save_weights` files (`/<layer>/<layer>/kernel:0`), full model
    /// files (`/model_weights/<layer>/...`) and Keras 3 weight files
    /// (`/layers/<layer>/vars/0`). Layers with no group are skipped; missing
    /// tensors are reported when the model is assembled.
    pub fn read_hdf5(path: &Path, layer_names: &[&str]) -> Result<Self, ModelLoadError> {
        let corrupt = |source: hdf5::Error| ModelLoadError::CorruptWeights {
            path: path.to_path_buf(),
            source,
        };

        let file = hdf5::File::open(path).map_err(corrupt)?;
        let mut store = WeightStore::new();

        for layer in layer_names {
            let group_path = ["model_weights/", "", "layers/"]
                .iter()
                .map(|prefix| format!("{prefix}{layer}"))
                .find(|candidate| file.link_exists(candidate));

            let Some(group_path) = group_path else {
                continue;
            };

            let group = file.group(&group_path).map_err(corrupt)?;
            let mut tensors = Vec::new();
            collect_datasets(&group, &mut tensors).map_err(|e| match e {
                CollectError::Hdf5(source) => corrupt(source),
                CollectError::Shape(reason) => ModelLoadError::mismatch(layer, reason),
            })?;
            tensors.sort_by(|a, b| numbered_order(&a.0, &b.0));

            debug!("read {} tensors for layer {} from {}", tensors.len(), layer, group_path);
            store.insert(layer, LayerWeights::new(tensors));
        }

        Ok(store)
    }
}

enum CollectError {
    Hdf5(hdf5::Error),
    Shape(String),
}

impl From<hdf5::Error> for CollectError {
    fn from(e: hdf5::Error) -> Self {
        CollectError::Hdf5(e)
    }
}

fn collect_datasets(group: &hdf5::Group, out: &mut Vec<(String, ArrayD<f32>)>) -> Result<(), CollectError> {
    for dataset in group.datasets()? {
        let shape = dataset.shape();
        let data = dataset.read_raw::<f32>()?;
        let tensor = ArrayD::from_shape_vec(IxDyn(&shape), data)
            .map_err(|e| CollectError::Shape(format!("dataset {}: {e}", dataset.name())))?;
        out.push((dataset.name(), tensor));
    }
    for child in group.groups()? {
        collect_datasets(&child, out)?;
    }
    Ok(())
}

/// Orders `vars/2` before `vars/10`; other names sort lexically.
fn numbered_order(a: &str, b: &str) -> std::cmp::Ordering {
    let leaf_number = |name: &str| name.rsplit('/').next().and_then(|leaf| leaf.parse::<usize>().ok());
    match (leaf_number(a), leaf_number(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}
