//! MIME message structure and multipart handling.

use crate::content_type::ContentType;
use crate::encoding::{decode_base64, decode_quoted_printable};
use crate::error::{Error, Result};
use crate::header::Headers;
use std::fmt;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit, // Default (includes "7bit")
        }
    }

    /// Decodes raw body bytes carrying this encoding into UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding or UTF-8 conversion fails.
    pub fn decode(self, data: &[u8]) -> Result<String> {
        match self {
            Self::Base64 => {
                let text = String::from_utf8_lossy(data);
                let decoded = decode_base64(&text)?;
                String::from_utf8(decoded).map_err(Into::into)
            }
            Self::QuotedPrintable => decode_quoted_printable(&String::from_utf8_lossy(data)),
            _ => String::from_utf8(data.to_vec()).map_err(Into::into),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// Entity body: leaf content or nested multipart children.
#[derive(Debug, Clone)]
pub enum Body {
    /// Leaf content (raw bytes, still transfer-encoded).
    Text(Vec<u8>),
    /// Multipart container with child parts.
    Multipart(Vec<Part>),
}

/// MIME message part.
#[derive(Debug, Clone)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Part body.
    pub body: Body,
}

impl Part {
    /// Creates a new part.
    #[must_use]
    pub const fn new(headers: Headers, body: Body) -> Self {
        Self { headers, body }
    }

    /// Gets the content type, defaulting to text/plain.
    ///
    /// # Errors
    ///
    /// Returns an error if the content type header is invalid.
    pub fn content_type(&self) -> Result<ContentType> {
        content_type_of(&self.headers)
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        transfer_encoding_of(&self.headers)
    }

    /// Checks whether this part is marked as an attachment.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        self.headers
            .get("content-disposition")
            .is_some_and(|d| d.trim().to_lowercase().starts_with("attachment"))
    }

    /// Gets the decoded body as text.
    ///
    /// # Errors
    ///
    /// Returns an error for multipart containers or if decoding fails.
    pub fn decoded_text(&self) -> Result<String> {
        let Body::Text(data) = &self.body else {
            return Err(Error::InvalidMultipart(
                "Cannot decode a multipart container as text".to_string(),
            ));
        };
        self.transfer_encoding().decode(data)
    }
}

/// MIME message.
#[derive(Debug, Clone)]
pub struct Message {
    /// Message headers.
    pub headers: Headers,
    /// Message body.
    pub body: Body,
}

impl Message {
    /// Parses a raw RFC 822 / MIME document.
    ///
    /// Multipart bodies are split recursively on their boundary; the
    /// preamble and epilogue around the delimiters are discarded.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed headers, a multipart content type
    /// without a boundary, or a multipart body without any parts.
    pub fn parse(raw: &str) -> Result<Self> {
        let (headers, body) = parse_entity(raw)?;
        Ok(Self { headers, body })
    }

    /// Gets the content type, defaulting to text/plain.
    ///
    /// # Errors
    ///
    /// Returns an error if the content type header is invalid.
    pub fn content_type(&self) -> Result<ContentType> {
        content_type_of(&self.headers)
    }

    /// Gets the transfer encoding of a single-part body.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        transfer_encoding_of(&self.headers)
    }

    /// Gets the decoded body as text for single-part messages.
    ///
    /// # Errors
    ///
    /// Returns an error for multipart messages or if decoding fails.
    pub fn decoded_text(&self) -> Result<String> {
        let Body::Text(data) = &self.body else {
            return Err(Error::InvalidMultipart(
                "Use parts for multipart messages".to_string(),
            ));
        };
        self.transfer_encoding().decode(data)
    }

    /// Serializes the message: headers in stored order, blank separator,
    /// body with `--boundary` delimiters for multipart containers.
    ///
    /// # Errors
    ///
    /// Returns an error if a multipart container lacks a boundary.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(self.headers.to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
        write_body(&mut out, &self.headers, &self.body)?;
        Ok(out)
    }
}

fn content_type_of(headers: &Headers) -> Result<ContentType> {
    headers
        .get("content-type")
        .map_or_else(|| Ok(ContentType::text_plain()), ContentType::parse)
}

fn transfer_encoding_of(headers: &Headers) -> TransferEncoding {
    headers
        .get("content-transfer-encoding")
        .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
}

/// Splits raw text into the header block and the body.
fn split_entity(raw: &str) -> (&str, &str) {
    let crlf = raw.find("\r\n\r\n");
    let lf = raw.find("\n\n");

    match (crlf, lf) {
        (Some(c), Some(l)) if c < l => (&raw[..c], &raw[c + 4..]),
        (Some(c), None) => (&raw[..c], &raw[c + 4..]),
        (_, Some(l)) => (&raw[..l], &raw[l + 2..]),
        (None, None) => (raw, ""),
    }
}

fn parse_entity(raw: &str) -> Result<(Headers, Body)> {
    let (header_text, body_text) = split_entity(raw);
    let headers = Headers::parse(header_text)?;
    let body = parse_body(&headers, body_text)?;
    Ok((headers, body))
}

fn parse_body(headers: &Headers, body: &str) -> Result<Body> {
    let ct = content_type_of(headers)?;
    if !ct.is_multipart() {
        return Ok(Body::Text(body.as_bytes().to_vec()));
    }

    let boundary = ct.boundary().ok_or(Error::MissingBoundary)?;
    let mut parts = Vec::new();
    for raw_part in split_multipart(body, boundary)? {
        let (part_headers, part_body) = parse_entity(&raw_part)?;
        parts.push(Part::new(part_headers, part_body));
    }
    Ok(Body::Multipart(parts))
}

/// Splits a multipart body into raw part texts on its boundary lines.
fn split_multipart(body: &str, boundary: &str) -> Result<Vec<String>> {
    let delimiter = format!("--{boundary}");
    let terminator = format!("--{boundary}--");

    let mut raw_parts = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in body.lines() {
        let marker = line.trim_end();
        if marker == terminator {
            if let Some(lines) = current.take() {
                raw_parts.push(lines.join("\r\n"));
            }
            break;
        } else if marker == delimiter {
            if let Some(lines) = current.take() {
                raw_parts.push(lines.join("\r\n"));
            }
            current = Some(Vec::new());
        } else if let Some(lines) = current.as_mut() {
            lines.push(line);
        }
        // Lines before the first delimiter are preamble.
    }

    // Tolerate a missing terminator line.
    if let Some(lines) = current {
        raw_parts.push(lines.join("\r\n"));
    }

    if raw_parts.is_empty() {
        return Err(Error::InvalidMultipart(format!(
            "No parts delimited by boundary {boundary}"
        )));
    }

    Ok(raw_parts)
}

fn write_body(out: &mut Vec<u8>, headers: &Headers, body: &Body) -> Result<()> {
    match body {
        Body::Text(data) => {
            out.extend_from_slice(data);
            if !data.ends_with(b"\n") {
                out.extend_from_slice(b"\r\n");
            }
        }
        Body::Multipart(parts) => {
            let ct = content_type_of(headers)?;
            let boundary = ct.boundary().ok_or(Error::MissingBoundary)?.to_string();

            for part in parts {
                out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
                out.extend_from_slice(part.headers.to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                write_body(out, &part.headers, &part.body)?;
            }
            out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        }
    }
    Ok(())
}
