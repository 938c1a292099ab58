#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod balance;
pub mod chain;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod generator;
pub mod progress;
pub mod provider;
pub mod session;
pub mod strategy;
pub mod token;

pub use error::{Error, Result};
