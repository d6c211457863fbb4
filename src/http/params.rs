//! Turns the query string and form bodies into a flat parameter mapping.
//!
//! URL-encoded input is decoded leniently: malformed escapes are kept as-is
//! and nothing in a query string or url-encoded body can fail. Multipart
//! bodies are decoded strictly, since a broken multipart body cannot be
//! guessed at.

use std::collections::HashMap;

use bytes::Bytes;
use percent_encoding::percent_decode;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("multipart/form-data requires a boundary parameter")]
    MissingBoundary,
    #[error("malformed multipart body: {0}")]
    MalformedMultipart(&'static str),
    #[error("multipart part has no field name")]
    MissingFieldName,
}

/// Decoded request parameters.
///
/// Values are raw bytes so that binary payloads survive percent-decoding.
/// Inserting a name that already exists replaces its value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: HashMap<String, Bytes>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.values.get(name).map(|v| v.as_ref())
    }

    /// Value of `name` if it is valid UTF-8.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| std::str::from_utf8(v).ok())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Bytes>) {
        self.values.insert(name.into(), value.into());
    }

    /// Overlays `other` on top of `self`; names in `other` win.
    pub fn merge(&mut self, other: Params) {
        self.values.extend(other.values);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }
}

/// How a request body is encoded, judged from its `Content-Type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyEncoding {
    UrlEncoded,
    Multipart { boundary: String },
    Other,
}

impl BodyEncoding {
    pub fn classify(content_type: Option<&str>) -> Result<Self, DecodeError> {
        let Some(content_type) = content_type else {
            return Ok(BodyEncoding::Other);
        };

        let mut segments = split_params(content_type).into_iter();
        let media_type = segments.next().unwrap_or_default();

        if media_type.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
            return Ok(BodyEncoding::UrlEncoded);
        }

        if media_type.eq_ignore_ascii_case("multipart/form-data") {
            let boundary = segments
                .filter_map(|p| {
                    let (key, value) = p.split_once('=')?;
                    key.trim()
                        .eq_ignore_ascii_case("boundary")
                        .then(|| dequote(value.trim()))
                })
                .next()
                .filter(|b| !b.is_empty())
                .ok_or(DecodeError::MissingBoundary)?;

            return Ok(BodyEncoding::Multipart { boundary });
        }

        Ok(BodyEncoding::Other)
    }
}

/// Builds the parameter mapping for one request.
///
/// Query parameters come first; parameters decoded from a form body then
/// overwrite query parameters of the same name. Bodies of any other content
/// type are ignored.
pub fn materialize(
    query: Option<&str>,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<Params, DecodeError> {
    let mut params = query
        .map(|q| parse_query(q.as_bytes()))
        .unwrap_or_default();

    match BodyEncoding::classify(content_type)? {
        BodyEncoding::UrlEncoded => params.merge(parse_query(body)),
        BodyEncoding::Multipart { boundary } => params.merge(parse_form_data(body, &boundary)?),
        BodyEncoding::Other => {}
    }

    Ok(params)
}

/// Decodes `application/x-www-form-urlencoded` data. Pairs are separated by
/// `&` or `;`; a pair without `=` gets an empty value.
pub fn parse_query(input: &[u8]) -> Params {
    let mut params = Params::new();

    for pair in input.split(|b| *b == b'&' || *b == b';') {
        if pair.is_empty() {
            continue;
        }

        let (key, value) = match pair.iter().position(|b| *b == b'=') {
            Some(pos) => (&pair[..pos], &pair[pos + 1..]),
            None => (pair, &[][..]),
        };

        let key = unescape_form(key);
        params.insert(String::from_utf8_lossy(&key).into_owned(), unescape_form(value));
    }

    params
}

fn unescape_form(input: &[u8]) -> Vec<u8> {
    let plus_decoded: Vec<u8> = input
        .iter()
        .map(|b| if *b == b'+' { b' ' } else { *b })
        .collect();
    percent_decode(&plus_decoded).collect()
}

/// Removes surrounding double quotes and backslash escapes from a header
/// parameter value. Unquoted values are returned unchanged.
pub fn dequote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Decodes a `multipart/form-data` body. Each part's content becomes the
/// value of the field named by its `Content-Disposition` header.
pub fn parse_form_data(body: &[u8], boundary: &str) -> Result<Params, DecodeError> {
    if boundary.is_empty() {
        return Err(DecodeError::MissingBoundary);
    }

    let delimiter = format!("--{boundary}");
    let separator = format!("\r\n--{boundary}");
    let mut params = Params::new();

    let start = find(body, delimiter.as_bytes())
        .ok_or(DecodeError::MalformedMultipart("missing opening boundary"))?;
    let mut rest = &body[start + delimiter.len()..];

    loop {
        if rest.starts_with(b"--") {
            break;
        }

        rest = rest
            .strip_prefix(b"\r\n")
            .or_else(|| rest.strip_prefix(b"\n"))
            .ok_or(DecodeError::MalformedMultipart("boundary not followed by a line break"))?;

        let end = find(rest, separator.as_bytes())
            .ok_or(DecodeError::MalformedMultipart("unterminated part"))?;

        let (name, content) = parse_part(&rest[..end])?;
        params.insert(name, Bytes::copy_from_slice(content));

        rest = &rest[end + separator.len()..];
    }

    Ok(params)
}

fn parse_part(part: &[u8]) -> Result<(String, &[u8]), DecodeError> {
    let (head, content) = if part.starts_with(b"\r\n") {
        (&[][..], &part[2..])
    } else {
        let end = find(part, b"\r\n\r\n")
            .ok_or(DecodeError::MalformedMultipart("part headers not terminated"))?;
        (&part[..end], &part[end + 4..])
    };

    let head = std::str::from_utf8(head)
        .map_err(|_| DecodeError::MalformedMultipart("part headers are not valid UTF-8"))?;

    let name = head
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("Content-Disposition"))
        .and_then(|(_, value)| {
            split_params(value).into_iter().skip(1).find_map(|p| {
                let (key, value) = p.split_once('=')?;
                key.trim()
                    .eq_ignore_ascii_case("name")
                    .then(|| dequote(value.trim()))
            })
        })
        .ok_or(DecodeError::MissingFieldName)?;

    Ok((name, content))
}

/// Splits a header value on `;`, ignoring separators inside quotes.
fn split_params(value: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                out.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(value[start..].trim());
    out
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
