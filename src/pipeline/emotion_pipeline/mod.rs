#[allow(clippy::module_inception)]
pub mod emotion_pipeline;
