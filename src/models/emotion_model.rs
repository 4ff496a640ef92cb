use bytes::Bytes;
use serde::{Deserialize, Serialize};
use crate::pipeline::emotion_pipeline::emotion_pipeline::{EmotionDetection, ImageSize};

/// Upload limit for `/detect`, checked before the image is decoded.
pub const MAX_UPLOAD_SIZE: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionDetectionResultOutput {
    pub success: bool,
    pub results: Vec<EmotionDetection>,
    pub image_size: ImageSize,
}

#[derive(Clone)]
pub struct EmotionDetectionInput {
    pub im_bytes: Bytes,
}
