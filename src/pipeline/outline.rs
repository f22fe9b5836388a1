//! Structure parser for captured messages.
//!
//! Produces line offsets into the capture (line 0 is the `+OK` status line)
//! so transforms can rewrite parts without holding a MIME tree in memory.
//!
//! # Rules
//! - Headers end at the first blank line; folded lines continue the previous header
//! - `multipart/*` entities are split on `--<boundary>` delimiter lines, recursively
//! - A top-level entity without a `Content-Type` is `text/plain`
//! - Only the first `text/plain` and first `text/html` parts are recorded

use std::collections::BTreeSet;
use std::ops::Range;

use crate::net::framing::{is_positive, is_terminator, trim_terminator};

/// Nested multipart levels followed before giving up on a branch.
const MAX_DEPTH: usize = 16;

/// Offsets and header metadata of one captured message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailOutline {
    pub from: Option<String>,
    pub subject: Option<String>,
    /// Top-level header block, CRLF separated.
    pub header: String,
    pub content_types: BTreeSet<String>,
    pub dispositions: BTreeSet<String>,
    pub quoted_printable: bool,
    pub body: Option<Range<usize>>,
    pub html: Option<Range<usize>>,
    pub images: Vec<Range<usize>>,
}

impl MailOutline {
    /// Parse captured lines. Never fails: unrecognised structure yields empty ranges.
    pub fn parse(lines: &[Vec<u8>]) -> Self {
        let text: Vec<String> = lines
            .iter()
            .map(|line| String::from_utf8_lossy(trim_terminator(line)).into_owned())
            .collect();

        let start = match lines.first() {
            Some(first) if is_positive(first) => 1,
            _ => 0,
        };
        let end = match lines.last() {
            Some(last) if lines.len() > start && is_terminator(last) => lines.len() - 1,
            _ => lines.len(),
        };

        let mut outline = MailOutline::default();
        let mut parser = Parser {
            lines: &text,
            outline: &mut outline,
        };
        parser.entity(start..end, 0);
        outline
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_none() && self.html.is_none() && self.images.is_empty()
    }
}

/// Headers of one MIME entity that drive part classification.
#[derive(Debug, Default)]
struct EntityHeaders {
    content_type: Option<String>,
    transfer_encoding: Option<String>,
}

impl EntityHeaders {
    fn media_type(&self) -> String {
        self.content_type
            .as_deref()
            .and_then(|value| value.split(';').next())
            .map(|media| media.trim().to_ascii_lowercase())
            .filter(|media| !media.is_empty())
            .unwrap_or_else(|| "text/plain".to_string())
    }

    fn boundary(&self) -> Option<String> {
        self.content_type.as_deref().and_then(parameter_boundary)
    }

    fn is_quoted_printable(&self) -> bool {
        self.transfer_encoding
            .as_deref()
            .is_some_and(|cte| cte.trim().eq_ignore_ascii_case("quoted-printable"))
    }
}

struct Parser<'a> {
    lines: &'a [String],
    outline: &'a mut MailOutline,
}

impl Parser<'_> {
    fn entity(&mut self, range: Range<usize>, depth: usize) {
        if depth > MAX_DEPTH || range.is_empty() {
            return;
        }

        let (headers, body_start) = self.headers(range.clone(), depth == 0);
        let body = body_start..range.end;
        let media = headers.media_type();

        if media.starts_with("multipart/") {
            match headers.boundary() {
                Some(boundary) => {
                    for part in self.split_parts(body, &boundary) {
                        self.entity(part, depth + 1);
                    }
                }
                None => tracing::debug!(media = %media, "Multipart entity without boundary"),
            }
        } else if media == "text/plain" {
            if self.outline.body.is_none() {
                self.outline.body = Some(body);
                self.outline.quoted_printable |= headers.is_quoted_printable();
            }
        } else if media == "text/html" {
            if self.outline.html.is_none() {
                self.outline.html = Some(body);
                self.outline.quoted_printable |= headers.is_quoted_printable();
            }
        } else if media.starts_with("image/") {
            let payload = self.trim_blank_tail(body);
            if !payload.is_empty() {
                self.outline.images.push(payload);
            }
        }
    }

    /// Read a header block. Returns the collected headers and the index of the first body line.
    fn headers(&mut self, range: Range<usize>, top_level: bool) -> (EntityHeaders, usize) {
        let mut unfolded: Vec<String> = Vec::new();
        let mut body_start = range.end;

        for i in range {
            let line = &self.lines[i];
            if line.is_empty() {
                body_start = i + 1;
                break;
            }
            if top_level {
                self.outline.header.push_str(line);
                self.outline.header.push_str("\r\n");
            }
            match (line.starts_with([' ', '\t']), unfolded.last_mut()) {
                (true, Some(previous)) => {
                    previous.push(' ');
                    previous.push_str(line.trim());
                }
                _ => unfolded.push(line.clone()),
            }
        }

        let mut headers = EntityHeaders::default();
        for header in unfolded {
            let Some((name, value)) = header.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match name.trim().to_ascii_lowercase().as_str() {
                "from" if self.outline.from.is_none() => self.outline.from = Some(value.to_string()),
                "subject" if top_level && self.outline.subject.is_none() => {
                    self.outline.subject = Some(value.to_string())
                }
                "content-type" => {
                    self.outline.content_types.insert(value.to_string());
                    headers.content_type.get_or_insert_with(|| value.to_string());
                }
                "content-disposition" => {
                    if let Some(kind) = value.split(';').next() {
                        self.outline.dispositions.insert(kind.trim().to_string());
                    }
                }
                "content-transfer-encoding" => {
                    headers.transfer_encoding.get_or_insert_with(|| value.to_string());
                }
                _ => {}
            }
        }

        (headers, body_start)
    }

    /// Split a multipart body into the line ranges between delimiter lines.
    fn split_parts(&self, body: Range<usize>, boundary: &str) -> Vec<Range<usize>> {
        let delimiter = format!("--{}", boundary);
        let close = format!("--{}--", boundary);

        let mut parts = Vec::new();
        let mut current: Option<usize> = None;
        for i in body {
            let line = self.lines[i].trim_end();
            if line == close {
                if let Some(start) = current.take() {
                    parts.push(start..i);
                }
                break;
            }
            if line == delimiter {
                if let Some(start) = current {
                    parts.push(start..i);
                }
                current = Some(i + 1);
            }
        }
        parts
    }

    fn trim_blank_tail(&self, mut range: Range<usize>) -> Range<usize> {
        while range.end > range.start && self.lines[range.end - 1].trim().is_empty() {
            range.end -= 1;
        }
        range
    }
}

/// Extract the `boundary` parameter of a Content-Type value.
fn parameter_boundary(value: &str) -> Option<String> {
    let lower = value.to_ascii_lowercase();
    let at = lower.find("boundary=")? + "boundary=".len();
    let raw = value[at..].trim_start();
    let boundary = match raw.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next()?,
        None => raw.split([';', ' ', '\t']).next()?,
    };
    (!boundary.is_empty()).then(|| boundary.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<Vec<u8>> {
        text.split_inclusive('\n').map(|l| l.as_bytes().to_vec()).collect()
    }

    #[test]
    fn plain_message_without_content_type() {
        let capture = lines("+OK 40 octets\r\nFrom: alice@example.com\r\nSubject: hi\r\n\r\nline one\r\nline two\r\n.\r\n");
        let outline = MailOutline::parse(&capture);

        assert_eq!(outline.from.as_deref(), Some("alice@example.com"));
        assert_eq!(outline.subject.as_deref(), Some("hi"));
        assert_eq!(outline.body, Some(4..6));
        assert!(outline.html.is_none());
        assert!(outline.images.is_empty());
        assert_eq!(outline.header, "From: alice@example.com\r\nSubject: hi\r\n");
    }

    #[test]
    fn multipart_alternative_with_image() {
        let capture = lines(concat!(
            "+OK\r\n",
            "From: bob@example.com\r\n",
            "Content-Type: multipart/mixed;\r\n",
            "\tboundary=\"outer\"\r\n",
            "\r\n",
            "preamble\r\n",
            "--outer\r\n",
            "Content-Type: multipart/alternative; boundary=inner\r\n",
            "\r\n",
            "--inner\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "Content-Transfer-Encoding: quoted-printable\r\n",
            "\r\n",
            "hello =3D world\r\n",
            "--inner\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>hello</p>\r\n",
            "--inner--\r\n",
            "--outer\r\n",
            "Content-Type: image/png; name=\"a.png\"\r\n",
            "Content-Disposition: attachment; filename=\"a.png\"\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "iVBORw0KGgo=\r\n",
            "\r\n",
            "--outer--\r\n",
            ".\r\n",
        ));
        let outline = MailOutline::parse(&capture);

        assert_eq!(outline.body, Some(13..14));
        assert_eq!(outline.html, Some(17..18));
        assert_eq!(outline.images, vec![24..25]);
        assert!(outline.quoted_printable);
        assert!(outline.dispositions.contains("attachment"));
        assert!(outline.content_types.contains("text/html"));
        assert!(outline.content_types.iter().any(|ct| ct.starts_with("multipart/mixed")));
    }

    #[test]
    fn multipart_without_boundary_has_no_parts() {
        let capture = lines("+OK\r\nContent-Type: multipart/mixed\r\n\r\nbody\r\n.\r\n");
        let outline = MailOutline::parse(&capture);
        assert!(outline.is_empty());
    }

    #[test]
    fn headers_only_message() {
        let capture = lines("+OK\r\nFrom: x\r\n.\r\n");
        let outline = MailOutline::parse(&capture);
        assert_eq!(outline.body, Some(2..2));
    }

    #[test]
    fn boundary_parameter_forms() {
        assert_eq!(parameter_boundary("multipart/mixed; boundary=\"a b\"").as_deref(), Some("a b"));
        assert_eq!(parameter_boundary("multipart/mixed; BOUNDARY=xyz; x=1").as_deref(), Some("xyz"));
        assert_eq!(parameter_boundary("multipart/mixed"), None);
        assert_eq!(parameter_boundary("multipart/mixed; boundary=\"\""), None);
    }
}
