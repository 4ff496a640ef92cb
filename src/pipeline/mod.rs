pub mod emotion_pipeline;
pub mod keras;
pub mod model_config;
pub mod module;
pub mod utils;
