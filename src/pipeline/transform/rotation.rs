//! Upside-down rotation of embedded images.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::ImageFormat;

use crate::net::framing::trim_terminator;
use crate::pipeline::capture::ParsedCapture;
use crate::pipeline::flags::Feature;
use crate::pipeline::transform::{rewrite_lines, TransformError, Transformer};

/// Base64 line width used when re-wrapping payloads.
const WRAP: usize = 76;

#[derive(Debug, Clone, Copy, Default)]
pub struct Rotation;

impl Transformer for Rotation {
    fn name(&self) -> &'static str {
        "rotation"
    }

    fn feature(&self) -> Feature {
        Feature::Rotation
    }

    fn transform(&self, capture: &ParsedCapture) -> Result<(), TransformError> {
        let images = &capture.outline().images;
        if images.is_empty() {
            return Ok(());
        }

        let mut lines = capture.read_lines()?;
        let mut rotated = 0usize;
        // Last range first so earlier indices stay valid while splicing.
        for range in images.iter().rev() {
            if range.end > lines.len() {
                continue;
            }
            match rotate_payload(&lines[range.clone()]) {
                Ok(replacement) => {
                    lines.splice(range.clone(), replacement);
                    rotated += 1;
                }
                Err(reason) => {
                    tracing::warn!(capture_id = capture.id(), lines = ?range, reason = %reason, "Skipping image");
                }
            }
        }

        tracing::debug!(capture_id = capture.id(), rotated, "Rotated images");
        if rotated == 0 {
            return Ok(());
        }
        rewrite_lines(capture.path(), &lines)
    }
}

/// Decode, rotate by 180 degrees and re-encode one base64 image payload.
fn rotate_payload(lines: &[Vec<u8>]) -> Result<Vec<Vec<u8>>, String> {
    let joined: Vec<u8> = lines
        .iter()
        .flat_map(|line| trim_terminator(line).iter().copied())
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let raw = STANDARD.decode(&joined).map_err(|e| e.to_string())?;

    let format = image::guess_format(&raw).map_err(|e| e.to_string())?;
    if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
        return Err(format!("unsupported format {:?}", format));
    }
    let decoded = image::load_from_memory_with_format(&raw, format).map_err(|e| e.to_string())?;

    let mut encoded = Cursor::new(Vec::new());
    decoded
        .rotate180()
        .write_to(&mut encoded, format)
        .map_err(|e| e.to_string())?;

    Ok(wrap(&STANDARD.encode(encoded.into_inner())))
}

fn wrap(encoded: &str) -> Vec<Vec<u8>> {
    encoded
        .as_bytes()
        .chunks(WRAP)
        .map(|chunk| {
            let mut line = chunk.to_vec();
            line.extend_from_slice(b"\r\n");
            line
        })
        .collect()
}
