//! Built-in engine implementations

pub mod echo;

pub use echo::{EchoEngine, split_tokens};
