pub mod backup;
mod command;
pub mod config;
pub mod constants;
pub mod dependencies;
pub mod error;
pub mod fs_utils;
pub mod inspector;
pub mod installer;
pub mod lock;
pub mod service;
pub mod upgrade;

pub use error::*;
