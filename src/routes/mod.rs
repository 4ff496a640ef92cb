pub mod detect;
pub mod root;
