pub mod emotion_recognition;
pub mod face_detection;
