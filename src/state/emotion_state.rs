use std::sync::Arc;
use crate::pipeline::emotion_pipeline::emotion_pipeline::EmotionPipeline;
use crate::service::emotion_service::EmotionService;

#[derive(Clone)]
pub struct EmotionState {
    pub emotion_service: EmotionService,
}

impl EmotionState {
    pub fn new(pipeline: &Arc<EmotionPipeline>, mask_detection_errors: bool) -> Self {
        Self {
            emotion_service: EmotionService::new(pipeline, mask_detection_errors),
        }
    }
}
