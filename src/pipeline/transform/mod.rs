//! Message transformations.
//!
//! Each transformer rewrites the capture's backing store in place. A rewrite
//! writes a temporary file in the capture directory and renames it over the
//! original, so a reader never observes a half-written message.

pub mod leet;
pub mod rotation;

use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use thiserror::Error;

use crate::pipeline::capture::ParsedCapture;
use crate::pipeline::flags::Feature;

pub use leet::Leetifier;
pub use rotation::Rotation;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("capture I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("capture path has no parent directory")]
    NoDirectory,
}

/// A rewrite applied to captured messages while its feature flag is on.
pub trait Transformer: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn feature(&self) -> Feature;

    /// Rewrite the backing store of `capture`. Blocking.
    fn transform(&self, capture: &ParsedCapture) -> Result<(), TransformError>;
}

/// The built-in transformers in application order.
pub fn builtin() -> Vec<Box<dyn Transformer>> {
    vec![Box::new(Leetifier), Box::new(Rotation)]
}

/// Atomically replace the content of `path` with `lines`.
pub fn rewrite_lines(path: &Path, lines: &[Vec<u8>]) -> Result<(), TransformError> {
    let directory = path.parent().ok_or(TransformError::NoDirectory)?;
    let mut staged = NamedTempFile::new_in(directory)?;
    {
        let mut writer = io::BufWriter::new(staged.as_file_mut());
        for line in lines {
            writer.write_all(line)?;
        }
        writer.flush()?;
    }
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}
