use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Angry = 0,
    Disgust = 1,
    Fear = 2,
    Happy = 3,
    Neutral = 4,
    Sad = 5,
    Surprise = 6,
}

pub const EMOTION_LABELS: [Emotion; 7] = [
    Emotion::Angry,
    Emotion::Disgust,
    Emotion::Fear,
    Emotion::Happy,
    Emotion::Neutral,
    Emotion::Sad,
    Emotion::Surprise,
];

pub fn match_emotion(idx: usize) -> Option<Emotion> {
    EMOTION_LABELS.get(idx).copied()
}

impl Emotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Angry => "angry",
            Emotion::Disgust => "disgust",
            Emotion::Fear => "fear",
            Emotion::Happy => "happy",
            Emotion::Neutral => "neutral",
            Emotion::Sad => "sad",
            Emotion::Surprise => "surprise",
        }
    }
}

#[derive(Debug)]
pub struct FaceDetectionConfig {
    pub scale_factor: f64,
    pub min_neighbors: i32,
    pub min_size: (i32, i32),
}

impl FaceDetectionConfig {
    pub fn new() -> Self {
        FaceDetectionConfig {
            scale_factor: 1.3,
            min_neighbors: 5,
            min_size: (0, 0),
        }
    }
}

#[derive(Debug)]
pub struct EmotionRecognitionConfig {
    pub image_size: (i32, i32),
    pub pixel_scale: f32,
    pub num_classes: usize,
}

impl EmotionRecognitionConfig {
    pub fn new() -> Self {
        EmotionRecognitionConfig {
            image_size: (48, 48),
            pixel_scale: 1.0 / 255.0,
            num_classes: EMOTION_LABELS.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_emotion() {
        assert_eq!(match_emotion(0), Some(Emotion::Angry));
        assert_eq!(match_emotion(4), Some(Emotion::Neutral));
        assert_eq!(match_emotion(6), Some(Emotion::Surprise));
        assert_eq!(match_emotion(7), None);
    }

    #[test]
    fn test_emotion_serializes_lowercase() {
        for emotion in EMOTION_LABELS {
            let json = serde_json::to_string(&emotion).unwrap();
            assert_eq!(json, format!("\"{}\"", emotion.as_str()));
        }
    }
}
