use std::path::Path;
use std::sync::Arc;

use anyhow::Error;
use log::debug;
use opencv::core::Mat;
use opencv::prelude::*;
use serde::{Deserialize, Serialize};
use crate::config::settings::Model;
use crate::error::errors::ModelLoadError;
use crate::pipeline::keras::model::KerasModel;
use crate::pipeline::model_config::config::{Emotion, EmotionRecognitionConfig, FaceDetectionConfig};
use crate::pipeline::module::emotion_recognition::{EmotionClassifier, EmotionRecognition};
use crate::pipeline::module::face_detection::{FaceLocator, HaarCascadeDetection};
use crate::pipeline::utils::image::{crop, to_grayscale};
use crate::pipeline::utils::utils::clamp_rect;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageSize {
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmotionDetection {
    pub emotion: Emotion,
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

/// Face locator plus emotion classifier, loaded once at startup and shared
/// read-only by every request.
#[derive(Clone)]
pub struct EmotionPipeline {
    face_detection: Arc<dyn FaceLocator>,
    emotion_recognition: EmotionRecognition,
}

impl EmotionPipeline {
    pub fn load(model: &Model) -> Result<Self, ModelLoadError> {

        // Init model config
        let face_detection_cfg = FaceDetectionConfig::new();
        let emotion_recognition_cfg = EmotionRecognitionConfig::new();

        // Emotion recognition model
        let classifier = KerasModel::load(Path::new(&model.architecture_path), Path::new(&model.weights_path))?;
        check_classifier_shape(&classifier, &emotion_recognition_cfg)?;

        // Face detection model
        let face_detection = HaarCascadeDetection::new(
            Path::new(&model.cascade_path),
            face_detection_cfg.scale_factor,
            face_detection_cfg.min_neighbors,
            face_detection_cfg.min_size,
        )?;

        Ok(Self::from_parts(Arc::new(face_detection), Arc::new(classifier)))
    }

    pub fn from_parts(face_detection: Arc<dyn FaceLocator>, classifier: Arc<dyn EmotionClassifier>) -> Self {
        let emotion_recognition_cfg = EmotionRecognitionConfig::new();

        EmotionPipeline {
            face_detection,
            emotion_recognition: EmotionRecognition::new(
                classifier,
                emotion_recognition_cfg.image_size,
                emotion_recognition_cfg.pixel_scale,
                emotion_recognition_cfg.num_classes,
            ),
        }
    }

    /// Locates and classifies every face in a BGR image.
    ///
    /// `Ok(vec![])` means no face was found; `Err` means detection or
    /// classification failed and nothing can be said about the image.
    pub fn detect(&self, image: &Mat) -> Result<Vec<EmotionDetection>, Error> {
        let gray = to_grayscale(image)?;
        let (width, height) = (gray.cols(), gray.rows());

        let faces = self.face_detection.locate(&gray)?;
        debug!("located {} faces in {}x{} image", faces.len(), width, height);

        let mut detections = Vec::with_capacity(faces.len());
        for face in faces {
            let Some(rect) = clamp_rect(face, width, height) else {
                continue;
            };

            let face_image = crop(&gray, rect)?;
            let (emotion, confidence) = self.emotion_recognition.call(&face_image)?;

            detections.push(EmotionDetection {
                emotion,
                confidence,
                bounding_box: BoundingBox {
                    x: rect.x,
                    y: rect.y,
                    width: rect.width,
                    height: rect.height,
                },
            });
        }

        Ok(detections)
    }
}

/// The classifier must take single-channel face crops of the configured size
/// and score every emotion label.
fn check_classifier_shape(classifier: &KerasModel, cfg: &EmotionRecognitionConfig) -> Result<(), ModelLoadError> {
    let expected_input = (cfg.image_size.1 as usize, cfg.image_size.0 as usize, 1);
    if classifier.input_shape() != expected_input {
        return Err(ModelLoadError::UnsupportedArchitecture(format!(
            "model input {:?} does not match face crops of {:?}",
            classifier.input_shape(),
            expected_input
        )))
    }
    if classifier.output_size() != cfg.num_classes {
        return Err(ModelLoadError::UnsupportedArchitecture(format!(
            "model predicts {} classes, expected {}",
            classifier.output_size(),
            cfg.num_classes
        )))
    }
    Ok(())
}

pub fn image_size(image: &Mat) -> ImageSize {
    ImageSize {
        width: image.cols(),
        height: image.rows(),
    }
}
