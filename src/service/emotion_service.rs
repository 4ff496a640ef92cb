use std::sync::Arc;
use log::{error, warn};
use opentelemetry::global;
use opentelemetry::trace::{Span, Tracer};
use opentelemetry::KeyValue;
use crate::error::errors::Error;
use crate::models::emotion_model::{EmotionDetectionInput, EmotionDetectionResultOutput};
use crate::pipeline::emotion_pipeline::emotion_pipeline::{image_size, EmotionPipeline};
use crate::pipeline::utils::image::byte_data_to_opencv;
use crate::tracer::tracer::TRACER_NAME;

#[derive(Clone)]
pub struct EmotionService {
    emotion_pipeline: Arc<EmotionPipeline>,
    mask_detection_errors: bool,
}

impl EmotionService {
    pub fn new(emotion_pipeline: &Arc<EmotionPipeline>, mask_detection_errors: bool) -> Self {
        EmotionService {
            emotion_pipeline: Arc::clone(emotion_pipeline),
            mask_detection_errors,
        }
    }

    /// Decodes the upload and runs detection on a blocking worker.
    ///
    /// Undecodable bytes are a client error. A pipeline fault is logged and,
    /// unless masking is disabled, answered like an image without faces.
    pub async fn detect_emotions(&self, input: EmotionDetectionInput) -> Result<EmotionDetectionResultOutput, Error> {
        let tracer = global::tracer(TRACER_NAME);
        let mut span = tracer.start("detect_emotions");
        span.set_attribute(KeyValue::new("upload.bytes", input.im_bytes.len() as i64));

        let pipeline = Arc::clone(&self.emotion_pipeline);
        let job = tokio::task::spawn_blocking(move || {
            let image = match byte_data_to_opencv(&input.im_bytes) {
                Ok(image) => image,
                Err(e) => {
                    warn!("failed to decode uploaded image: {e}");
                    return Err(Error::InvalidImage)
                }
            };
            drop(input.im_bytes);

            Ok((image_size(&image), pipeline.detect(&image)))
        });

        let (image_size, detections) = match job.await {
            Ok(result) => result?,
            Err(e) => {
                error!("emotion detection worker failed: {e}");
                span.end();
                return Err(Error::Server)
            }
        };

        let results = match detections {
            Ok(results) => results,
            Err(e) if self.mask_detection_errors => {
                error!("detection error: {e:?}");
                span.set_attribute(KeyValue::new("detection.masked_error", true));
                Vec::new()
            }
            Err(e) => {
                error!("detection error: {e:?}");
                span.end();
                return Err(Error::Server)
            }
        };

        span.set_attribute(KeyValue::new("detection.faces", results.len() as i64));
        span.end();

        Ok(EmotionDetectionResultOutput {
            success: true,
            results,
            image_size,
        })
    }
}
