pub mod annotation;
#[cfg(feature = "config")]
pub mod config;
#[cfg(feature = "logging")]
pub mod logging;
pub mod names;
pub mod utils;

pub use annotation::{Annotation, AssertionDescriptor, AssertionParam, MetaBinding, Uid};
