pub mod app;
pub mod cli;
pub mod config;
pub mod console;
pub mod emitter;
pub mod error;
pub mod group;
pub mod mqtt;
pub mod probe;
pub mod sample;
pub mod session;
pub mod sink;
