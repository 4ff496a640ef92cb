use std::sync::Arc;

use anyhow::{Error, Result};
use ndarray::{Array1, Array2, ArrayView2};
use opencv::core::{Mat, Size};
use opencv::imgproc::{resize, INTER_LINEAR};
use opencv::prelude::*;
use crate::pipeline::keras::model::KerasModel;
use crate::pipeline::model_config::config::{match_emotion, Emotion};
use crate::pipeline::utils::utils::argmax;

/// Produces class probabilities for a normalized grayscale face crop.
pub trait EmotionClassifier: Send + Sync {
    fn classify(&self, face: ArrayView2<f32>) -> Result<Array1<f32>>;
}

impl EmotionClassifier for KerasModel {
    fn classify(&self, face: ArrayView2<f32>) -> Result<Array1<f32>> {
        self.predict(face.to_owned().into_dyn())
    }
}

#[derive(Clone)]
pub struct EmotionRecognition {
    classifier: Arc<dyn EmotionClassifier>,
    image_size: (i32, i32),
    pixel_scale: f32,
    num_classes: usize,
}

impl EmotionRecognition {
    pub fn new(
        classifier: Arc<dyn EmotionClassifier>,
        image_size: (i32, i32),
        pixel_scale: f32,
        num_classes: usize,
    ) -> Self {
        EmotionRecognition {
            classifier,
            image_size,
            pixel_scale,
            num_classes,
        }
    }

    fn _preprocess(&self, face: &Mat) -> Result<Array2<f32>, Error> {
        let mut resized = Mat::default();
        match resize(face, &mut resized, Size::new(self.image_size.0, self.image_size.1), 0.0, 0.0, INTER_LINEAR) {
            Ok(_) => {}
            Err(e) => return Err(Error::from(e)),
        };

        let pixels = match resized.data_bytes() {
            Ok(pixels) => pixels,
            Err(e) => return Err(Error::from(e)),
        };

        let rows = self.image_size.1 as usize;
        let cols = self.image_size.0 as usize;
        if pixels.len() != rows * cols {
            return Err(Error::msg(format!(
                "emotion_recognition - expected a single-channel crop, got {} bytes",
                pixels.len()
            )))
        }

        let normalized: Vec<f32> = pixels.iter().map(|&p| p as f32 * self.pixel_scale).collect();
        Ok(Array2::from_shape_vec((rows, cols), normalized)?)
    }

    /// Classifies one grayscale face crop of any size, returning the most
    /// likely emotion and its probability.
    pub fn call(&self, face: &Mat) -> Result<(Emotion, f32), Error> {
        let input = self._preprocess(face)?;

        let probabilities = self.classifier.classify(input.view())?;
        if probabilities.len() != self.num_classes {
            return Err(Error::msg(format!(
                "emotion_recognition - classifier returned {} scores, expected {}",
                probabilities.len(),
                self.num_classes
            )))
        }

        let (idx, confidence) = argmax(probabilities.view())
            .ok_or_else(|| Error::msg("emotion_recognition - empty prediction"))?;
        let emotion = match_emotion(idx)
            .ok_or_else(|| Error::msg(format!("emotion_recognition - unknown class {idx}")))?;

        Ok((emotion, confidence.clamp(0.0, 1.0)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use ndarray::arr1;
    use opencv::core::{Scalar, CV_8UC1};
    use super::*;

    struct RecordingClassifier {
        seen: Mutex<Vec<Array2<f32>>>,
        scores: Array1<f32>,
    }

    impl EmotionClassifier for RecordingClassifier {
        fn classify(&self, face: ArrayView2<f32>) -> Result<Array1<f32>> {
            self.seen.lock().unwrap().push(face.to_owned());
            Ok(self.scores.clone())
        }
    }

    fn recognition(scores: Array1<f32>) -> (EmotionRecognition, Arc<RecordingClassifier>) {
        let classifier = Arc::new(RecordingClassifier { seen: Mutex::new(vec![]), scores });
        let recognition = EmotionRecognition::new(classifier.clone(), (48, 48), 1.0 / 255.0, 7);
        (recognition, classifier)
    }

    #[test]
    fn test_call_resizes_and_normalizes() {
        let (recognition, classifier) = recognition(arr1(&[0.05, 0.05, 0.05, 0.7, 0.05, 0.05, 0.05]));
        let face = Mat::new_rows_cols_with_default(100, 80, CV_8UC1, Scalar::all(255.0)).unwrap();

        let (emotion, confidence) = recognition.call(&face).unwrap();
        assert_eq!(emotion, Emotion::Happy);
        assert!((confidence - 0.7).abs() < 1e-6);

        let seen = classifier.seen.lock().unwrap();
        assert_eq!(seen[0].dim(), (48, 48));
        assert!(seen[0].iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_call_rejects_wrong_class_count() {
        let (recognition, _) = recognition(arr1(&[0.5, 0.5]));
        let face = Mat::new_rows_cols_with_default(48, 48, CV_8UC1, Scalar::all(0.0)).unwrap();
        assert!(recognition.call(&face).is_err());
    }
}
