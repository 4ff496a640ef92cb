use std::path::Path;
use std::sync::Mutex;

use anyhow::{Error, Result};
use opencv::core::{Mat, Rect, Size, Vector};
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;
use crate::error::errors::ModelLoadError;

/// Finds face rectangles in a single-channel image.
pub trait FaceLocator: Send + Sync {
    fn locate(&self, gray: &Mat) -> Result<Vec<Rect>>;
}

/// Haar cascade face detector.
///
/// `detect_multi_scale` needs `&mut self`, so concurrent callers are
/// serialized on the mutex.
pub struct HaarCascadeDetection {
    classifier: Mutex<CascadeClassifier>,
    scale_factor: f64,
    min_neighbors: i32,
    min_size: (i32, i32),
}

impl HaarCascadeDetection {
    pub fn new(
        cascade_path: &Path,
        scale_factor: f64,
        min_neighbors: i32,
        min_size: (i32, i32),
    ) -> Result<Self, ModelLoadError> {
        if !cascade_path.exists() {
            return Err(ModelLoadError::MissingFile(cascade_path.to_path_buf()))
        }

        let path = cascade_path.to_string_lossy();
        let classifier = match CascadeClassifier::new(&path) {
            Ok(classifier) => classifier,
            Err(e) => return Err(ModelLoadError::Cascade(e.to_string())),
        };

        match classifier.empty() {
            Ok(false) => {}
            Ok(true) => return Err(ModelLoadError::Cascade(format!("cascade {path} is empty"))),
            Err(e) => return Err(ModelLoadError::Cascade(e.to_string())),
        }

        Ok(HaarCascadeDetection {
            classifier: Mutex::new(classifier),
            scale_factor,
            min_neighbors,
            min_size,
        })
    }
}

impl FaceLocator for HaarCascadeDetection {
    fn locate(&self, gray: &Mat) -> Result<Vec<Rect>> {
        let mut faces = Vector::<Rect>::new();

        let mut classifier = self.classifier
            .lock()
            .map_err(|_| Error::msg("face_detection - cascade lock poisoned"))?;

        match classifier.detect_multi_scale(
            gray,
            &mut faces,
            self.scale_factor,
            self.min_neighbors,
            0,
            Size::new(self.min_size.0, self.min_size.1),
            Size::new(0, 0),
        ) {
            Ok(_) => {}
            Err(e) => return Err(Error::from(e)),
        };

        Ok(faces.to_vec())
    }
}
