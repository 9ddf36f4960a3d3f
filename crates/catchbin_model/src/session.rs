//! Capture sessions and their configured response.

use crate::error::{ModelError, ModelResult};
use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// Lowest status code a session may answer with.
pub const MIN_STATUS_CODE: u16 = 100;
/// Highest status code a session may answer with.
pub const MAX_STATUS_CODE: u16 = 599;
/// Status code used when none is configured.
pub const DEFAULT_STATUS_CODE: u16 = 200;
/// Maximum response delay in seconds.
pub const MAX_DELAY_SECONDS: u32 = 10;
/// Maximum configured response body size in bytes (1 MiB).
pub const MAX_RESPONSE_BODY_SIZE: usize = 1024 * 1024;

/// A single HTTP header.
///
/// Names are compared case-insensitively by convention, but duplicates are
/// kept as given and order is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Header {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
}

impl Header {
    /// Creates a new header.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Returns true if the name is a valid HTTP token (RFC 9110 `tchar`).
    pub fn has_valid_name(&self) -> bool {
        !self.name.is_empty()
            && self.name.bytes().all(|b| {
                b.is_ascii_alphanumeric()
                    || matches!(
                        b,
                        b'!' | b'#'
                            | b'$'
                            | b'%'
                            | b'&'
                            | b'\''
                            | b'*'
                            | b'+'
                            | b'-'
                            | b'.'
                            | b'^'
                            | b'_'
                            | b'`'
                            | b'|'
                            | b'~'
                    )
            })
    }
}

/// A capture endpoint with a configured HTTP response.
///
/// `id` and `created_at` are assigned by the server. Sessions are never
/// partially updated; a newer copy replaces the stored one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Server-assigned id.
    pub id: String,
    /// Status code returned to captured callers.
    pub status_code: u16,
    /// Headers returned to captured callers.
    pub headers: Vec<Header>,
    /// Delay before responding, in seconds.
    pub delay_seconds: u32,
    /// Body returned to captured callers.
    pub response_body: Vec<u8>,
    /// Server creation time.
    pub created_at: Timestamp,
}

impl Session {
    /// Looks up the first header with the given name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// Options for creating a session.
///
/// Every field is optional. [`SessionOptions::normalize`] fills defaults,
/// clamps the status code and delay into range, and rejects input the
/// server would refuse anyway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Status code, defaults to 200.
    pub status_code: Option<u16>,
    /// Response headers, defaults to none.
    pub headers: Option<Vec<Header>>,
    /// Delay in seconds, defaults to 0.
    pub delay_seconds: Option<u32>,
    /// Response body, defaults to empty.
    pub response_body: Option<Vec<u8>>,
}

impl SessionOptions {
    /// Creates empty options (all defaults).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status code.
    pub fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    /// Appends a response header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(Vec::new)
            .push(Header::new(name, value));
        self
    }

    /// Sets the response delay in seconds.
    pub fn with_delay_seconds(mut self, delay: u32) -> Self {
        self.delay_seconds = Some(delay);
        self
    }

    /// Sets the response body.
    pub fn with_response_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.response_body = Some(body.into());
        self
    }

    /// Returns the options with defaults filled in and values clamped.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidHeaderName`] for a header whose name is
    /// not an HTTP token, and [`ModelError::BodyTooLarge`] when the body
    /// exceeds [`MAX_RESPONSE_BODY_SIZE`].
    pub fn normalize(&self) -> ModelResult<SessionOptions> {
        let headers = self.headers.clone().unwrap_or_default();
        if let Some(bad) = headers.iter().find(|h| !h.has_valid_name()) {
            return Err(ModelError::InvalidHeaderName {
                name: bad.name.clone(),
            });
        }

        let body = self.response_body.clone().unwrap_or_default();
        if body.len() > MAX_RESPONSE_BODY_SIZE {
            return Err(ModelError::BodyTooLarge {
                size: body.len(),
                max: MAX_RESPONSE_BODY_SIZE,
            });
        }

        let status_code = self
            .status_code
            .unwrap_or(DEFAULT_STATUS_CODE)
            .clamp(MIN_STATUS_CODE, MAX_STATUS_CODE);
        let delay_seconds = self.delay_seconds.unwrap_or(0).min(MAX_DELAY_SECONDS);

        Ok(SessionOptions {
            status_code: Some(status_code),
            headers: Some(headers),
            delay_seconds: Some(delay_seconds),
            response_body: Some(body),
        })
    }

    /// Builds a session from normalized options plus server-assigned fields.
    ///
    /// Used by in-process authorities; real servers return the full session.
    pub fn into_session(self, id: impl Into<String>, created_at: Timestamp) -> Session {
        Session {
            id: id.into(),
            status_code: self.status_code.unwrap_or(DEFAULT_STATUS_CODE),
            headers: self.headers.unwrap_or_default(),
            delay_seconds: self.delay_seconds.unwrap_or(0),
            response_body: self.response_body.unwrap_or_default(),
            created_at,
        }
    }
}
