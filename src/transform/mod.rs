// src/transform/mod.rs

//! Pluggable source-to-source transformation.
//!
//! The pipeline talks to a [`Transformer`] instead of a concrete compiler.
//! Production uses [`CommandTransformer`] when a transform command is
//! configured and [`PassthroughTransformer`] otherwise; tests provide their
//! own implementation that records which files were handed over.

use std::fmt::Debug;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use crate::errors::Result;
use crate::types::SourceMapMode;

pub mod command;
pub mod passthrough;

pub use command::CommandTransformer;
pub use passthrough::PassthroughTransformer;

/// Options passed along with every file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOptions {
    /// Project root the transformer should resolve configuration against.
    pub root: PathBuf,
    pub source_maps: SourceMapMode,
}

/// Result of transforming one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transformed {
    pub code: Vec<u8>,
    /// Positional mapping data, if the transformer produced any.
    pub map: Option<Vec<u8>>,
}

impl Transformed {
    pub fn code(code: impl Into<Vec<u8>>) -> Self {
        Self {
            code: code.into(),
            map: None,
        }
    }

    pub fn with_map(mut self, map: impl Into<Vec<u8>>) -> Self {
        self.map = Some(map.into());
        self
    }
}

/// Trait abstracting the actual transformation.
///
/// Implementations must be safe to call concurrently: the task queue runs up
/// to its concurrency ceiling of transforms at once. A returned error fails
/// only this file.
pub trait Transformer: Send + Sync + Debug {
    fn transform<'a>(
        &'a self,
        path: &'a Path,
        contents: Vec<u8>,
        options: &'a TransformOptions,
    ) -> Pin<Box<dyn Future<Output = Result<Transformed>> + Send + 'a>>;
}
