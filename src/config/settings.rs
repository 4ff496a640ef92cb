use config::{Config, ConfigError, Environment, File, FileFormat};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::fmt;
use crate::config::parameter;

pub static SETTINGS: Lazy<Settings> = Lazy::new(|| Settings::new().expect("Failed to setup settings"));

#[allow(dead_code)]
#[derive(Debug, Clone, Deserialize)]
pub struct App {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub http_port: u16,
    pub cors_origin: String,
    pub request_timeout: Option<u64>,
    pub max_request_size: Option<usize>,
    #[serde(default = "default_mask_detection_errors")]
    pub mask_detection_errors: bool,
}

fn default_mask_detection_errors() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct Model {
    pub architecture_path: String,
    pub weights_path: String,
    pub cascade_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Camera {
    pub device_index: i32,
    pub window_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Logger {
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tracer {
    pub uri: String,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub environment: Option<String>,
    pub server: Server,
    pub logger: Option<Logger>,
    pub model: Model,
    pub camera: Camera,
    pub tracer: Option<Tracer>,
    pub app: App,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = parameter::get("RUN_MODE").unwrap_or_else(|| "development".into());

        let mut builder = Config::builder()
            .add_source(File::with_name("conf/config.toml").format(FileFormat::Toml))
            .add_source(File::with_name("conf/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(File::with_name("conf/local").required(false))
            .add_source(Environment::default().separator("__"));

        if let Some(port) = parameter::get("PORT") {
            builder = builder.set_override("server.http_port", port)?;
        }

        builder.build()?.try_deserialize()
    }
}

impl Server {
    pub fn max_request_size(&self) -> usize {
        self.max_request_size.unwrap_or(16 * 1024 * 1024)
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "http://localhost:{}", &self.http_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let settings = match Settings::new() {
            Ok(settings) => settings,
            Err(e) => {
                println!("{:?}", e);
                return;
            }
        };

        assert_eq!(settings.model.architecture_path, "models/emotion_detector.json");
        assert!(settings.server.mask_detection_errors);
        assert_eq!(settings.server.to_string(), format!("http://localhost:{}", settings.server.http_port));
    }

    #[test]
    fn test_port_overrides_http_port() {
        std::env::set_var("PORT", "5123");
        let settings = Settings::new();
        std::env::remove_var("PORT");

        match settings {
            Ok(settings) => assert_eq!(settings.server.http_port, 5123),
            Err(e) => println!("{:?}", e),
        }
    }

    #[test]
    fn test_default_max_request_size() {
        let server = Server {
            http_port: 5001,
            cors_origin: "http://localhost:3000".to_string(),
            request_timeout: None,
            max_request_size: None,
            mask_detection_errors: true,
        };
        assert_eq!(server.max_request_size(), 16 * 1024 * 1024);
    }
}
