pub mod accumulate;
pub mod config;
pub mod error;
pub mod generator;
pub mod io;
pub mod model;
pub mod paths;
pub mod pipeline;
pub mod prediction;
pub mod schedule;
pub mod store;
pub mod training;
pub mod types;
pub mod validation;
pub mod window;

pub use error::{Result, TwinError};
