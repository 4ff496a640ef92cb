use dotenv::dotenv;
use log::debug;

/// Loads a `.env` file from the working directory when one exists.
/// Values already set in the environment win.
pub fn init() {
    match dotenv() {
        Ok(path) => debug!("loaded environment from {}", path.display()),
        Err(_) => {}
    }
}

pub fn get(parameter: &str) -> Option<String> {
    std::env::var(parameter).ok()
}
