// src/transform/passthrough.rs

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use crate::errors::Result;

use super::{TransformOptions, Transformed, Transformer};

/// Copies file contents verbatim. Used when no transform command is set,
/// which turns the mirror into an incremental, filtered copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTransformer;

impl Transformer for PassthroughTransformer {
    fn transform<'a>(
        &'a self,
        _path: &'a Path,
        contents: Vec<u8>,
        _options: &'a TransformOptions,
    ) -> Pin<Box<dyn Future<Output = Result<Transformed>> + Send + 'a>> {
        Box::pin(async move { Ok(Transformed::code(contents)) })
    }
}
