//! Conversions between the shapes a source returns and the rows a sink stores.

mod matrix;

pub use matrix::{TransformError, to_samples};
