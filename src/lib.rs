pub mod commands;
pub mod config;
pub mod error;
pub mod fs;
pub mod lock;
pub mod logging;
pub mod monitor;
pub mod process;
pub mod processor;
pub mod service;
pub mod signals;
pub mod watcher;
