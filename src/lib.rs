pub mod config;
pub mod error;
pub mod handler;
pub mod logger;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod response;
pub mod routes;
pub mod service;
pub mod state;
pub mod tracer;
