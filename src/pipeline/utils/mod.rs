pub mod draw;
pub mod image;
#[allow(clippy::module_inception)]
pub mod utils;
