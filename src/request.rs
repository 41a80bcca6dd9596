//! Request data model: what a caller asks the oracle to fetch.

use crate::error::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// HTTP method of a notarized fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET.
    #[default]
    Get,
    /// POST.
    Post,
    /// PUT.
    Put,
    /// PATCH.
    Patch,
    /// DELETE.
    Delete,
    /// HEAD.
    Head,
}

impl HttpMethod {
    /// Canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            other => Err(Error::InvalidRequest(format!(
                "unsupported method {other:?}"
            ))),
        }
    }
}

/// A single HTTP header. Order of headers is significant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Header {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
}

impl Header {
    /// Create a header.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl FromStr for Header {
    type Err = Error;

    /// Parse `name:value`.
    fn from_str(s: &str) -> Result<Self> {
        let (name, value) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidRequest(format!("header {s:?} is not name:value")))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidRequest("empty header name".to_string()));
        }
        Ok(Self::new(name, value.trim()))
    }
}

/// A redaction applied to the notarized response before release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Redaction {
    /// Mask response body bytes `[start, end)`.
    BodyRange {
        /// First masked byte.
        start: usize,
        /// One past the last masked byte.
        end: usize,
    },
    /// Withhold a response header (matched case-insensitively).
    ResponseHeader {
        /// Header name.
        name: String,
    },
}

impl Redaction {
    /// Parse the caller-facing redaction string.
    ///
    /// Items are comma separated; an empty string means no redaction.
    ///
    /// ```text
    /// res:body:<start>-<end>
    /// res:header:<name>
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for unknown selectors or empty ranges.
    pub fn parse_list(input: &str) -> Result<Vec<Self>> {
        input
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::parse)
            .collect()
    }

    /// Render a list back to the caller-facing string form.
    #[must_use]
    pub fn format_list(redactions: &[Self]) -> String {
        redactions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl FromStr for Redaction {
    type Err = Error;

    fn from_str(item: &str) -> Result<Self> {
        let invalid = || Error::InvalidRequest(format!("invalid redaction selector {item:?}"));

        if let Some(range) = item.strip_prefix("res:body:") {
            let (start, end) = range.split_once('-').ok_or_else(invalid)?;
            let start: usize = start.trim().parse().map_err(|_| invalid())?;
            let end: usize = end.trim().parse().map_err(|_| invalid())?;
            if start >= end {
                return Err(Error::InvalidRequest(format!(
                    "empty redaction range {start}-{end}"
                )));
            }
            Ok(Self::BodyRange { start, end })
        } else if let Some(name) = item.strip_prefix("res:header:") {
            let name = name.trim();
            if name.is_empty() {
                return Err(invalid());
            }
            Ok(Self::ResponseHeader {
                name: name.to_string(),
            })
        } else {
            Err(invalid())
        }
    }
}

impl fmt::Display for Redaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BodyRange { start, end } => write!(f, "res:body:{start}-{end}"),
            Self::ResponseHeader { name } => write!(f, "res:header:{name}"),
        }
    }
}

/// A logical "fetch this URL and prove it" request.
///
/// Immutable once submitted. Two specs are equal iff every field is
/// byte-equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchSpec {
    /// Target URL.
    pub url: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Response redactions.
    #[serde(default)]
    pub redaction: Vec<Redaction>,
    /// Ordered request headers.
    #[serde(default)]
    pub headers: Vec<Header>,
    /// Request body.
    #[serde(default)]
    pub body: Bytes,
}

impl FetchSpec {
    /// A GET with no redactions, headers or body.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            redaction: Vec::new(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Build a spec from the caller-facing string arguments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the method or redaction string
    /// cannot be parsed.
    pub fn from_parts(
        url: &str,
        method: &str,
        redaction: &str,
        headers: Vec<Header>,
        body: impl Into<Bytes>,
    ) -> Result<Self> {
        Ok(Self {
            url: url.to_string(),
            method: method.parse()?,
            redaction: Redaction::parse_list(redaction)?,
            headers,
            body: body.into(),
        })
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    /// Add a redaction.
    #[must_use]
    pub fn with_redaction(mut self, redaction: Redaction) -> Self {
        self.redaction.push(redaction);
        self
    }

    /// Validate the spec before it is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for an empty or non-HTTP(S) URL or
    /// an empty body range.
    pub fn validate(&self) -> Result<()> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(Error::InvalidRequest("url must not be empty".to_string()));
        }
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(Error::InvalidRequest(format!(
                "url {url:?} must use http or https"
            )));
        }
        for redaction in &self.redaction {
            if let Redaction::BodyRange { start, end } = redaction {
                if start >= end {
                    return Err(Error::InvalidRequest(format!(
                        "empty redaction range {start}-{end}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Identifier of a submitted request, unique per orchestrator.
///
/// Text form is `<seq>_<tag>` where `tag` is five hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId {
    seq: u64,
    tag: String,
}

/// Number of hex characters in a request id tag.
pub const REQUEST_TAG_LEN: usize = 5;

impl RequestId {
    pub(crate) fn new(seq: u64, tag: String) -> Self {
        Self { seq, tag }
    }

    /// Allocation sequence number.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Hex tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.seq, self.tag)
    }
}

impl FromStr for RequestId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let not_found = || Error::NotFound(s.to_string());
        let (seq, tag) = s.split_once('_').ok_or_else(not_found)?;
        let seq = seq.parse().map_err(|_| not_found())?;
        if tag.len() != REQUEST_TAG_LEN || !tag.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(not_found());
        }
        Ok(Self::new(seq, tag.to_ascii_lowercase()))
    }
}

impl Serialize for RequestId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
