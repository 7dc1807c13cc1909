pub mod algorithm;
pub mod calibration;
pub mod config;
pub mod demangle;
pub mod dump;
pub mod error;
pub mod input;
pub mod labels;
pub mod render;
pub mod resolver;
pub mod signature;
pub mod stop_words;
pub mod store;
pub mod validate;

pub use error::{Error, Result};
