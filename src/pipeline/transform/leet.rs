//! Leet-speak rewrite of the text and HTML bodies.

use crate::net::framing::trim_terminator;
use crate::pipeline::capture::ParsedCapture;
use crate::pipeline::flags::Feature;
use crate::pipeline::transform::{rewrite_lines, TransformError, Transformer};

#[derive(Debug, Clone, Copy, Default)]
pub struct Leetifier;

impl Transformer for Leetifier {
    fn name(&self) -> &'static str {
        "leet"
    }

    fn feature(&self) -> Feature {
        Feature::Leet
    }

    fn transform(&self, capture: &ParsedCapture) -> Result<(), TransformError> {
        let outline = capture.outline();
        let ranges: Vec<_> = outline.body.iter().chain(outline.html.iter()).cloned().collect();
        if ranges.is_empty() {
            return Ok(());
        }

        let mut lines = capture.read_lines()?;
        let mut changed = 0usize;
        for range in ranges {
            // Tags may wrap, so markup state runs across the lines of a part.
            let mut in_tag = false;
            for line in lines.iter_mut().take(range.end).skip(range.start) {
                let content = trim_terminator(line).len();
                changed += leet(&mut line[..content], outline.quoted_printable, &mut in_tag);
            }
        }

        tracing::debug!(capture_id = capture.id(), changed, "Leetified capture");
        rewrite_lines(capture.path(), &lines)
    }
}

/// Rewrite one line in place, returning the number of substituted bytes.
///
/// Markup between `<` and `>` is left alone, as are the two hex digits of a
/// quoted-printable escape. `in_tag` carries an unclosed tag over to the
/// next line.
pub fn leet(line: &mut [u8], quoted_printable: bool, in_tag: &mut bool) -> usize {
    let mut changed = 0;
    let mut i = 0;
    while i < line.len() {
        match line[i] {
            b'<' => *in_tag = true,
            b'>' => *in_tag = false,
            b'=' if quoted_printable => {
                let escape = line.get(i + 1..i + 3);
                if escape.is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit)) {
                    i += 2;
                }
            }
            b if !*in_tag => {
                let replacement = match b.to_ascii_lowercase() {
                    b'a' => b'4',
                    b'e' => b'3',
                    b'i' => b'1',
                    b'o' => b'0',
                    b'c' => b'<',
                    _ => b,
                };
                if replacement != b {
                    line[i] = replacement;
                    changed += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    changed
}
