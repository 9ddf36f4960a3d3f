//! JSON wire format of the remote API.
//!
//! Bodies travel base64-encoded. Field names are camelCase.

use crate::error::{RemoteError, RemoteResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use catchbin_model::{Header, Payload, PushEvent, Request, Session, SessionOptions, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionOptionsWire {
    pub status_code: u16,
    pub headers: Vec<Header>,
    pub delay: u32,
    pub response_body: String,
}

impl SessionOptionsWire {
    /// Fills defaults and clamps before encoding.
    pub fn from_options(options: &SessionOptions) -> RemoteResult<Self> {
        let normalized = options
            .normalize()
            .map_err(|e| RemoteError::rejected("create session", e.to_string()))?;
        Ok(Self {
            status_code: normalized.status_code.unwrap_or_default(),
            headers: normalized.headers.unwrap_or_default(),
            delay: normalized.delay_seconds.unwrap_or_default(),
            response_body: STANDARD.encode(normalized.response_body.unwrap_or_default()),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionWire {
    pub id: String,
    pub status_code: u16,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub delay: u32,
    #[serde(default)]
    pub response_body: String,
    pub created_at: Timestamp,
}

impl SessionWire {
    #[cfg(test)]
    pub fn from_session(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            status_code: session.status_code,
            headers: session.headers.clone(),
            delay: session.delay_seconds,
            response_body: STANDARD.encode(&session.response_body),
            created_at: session.created_at,
        }
    }

    pub fn into_session(self) -> RemoteResult<Session> {
        Ok(Session {
            response_body: decode_body(&self.response_body)?,
            id: self.id,
            status_code: self.status_code,
            headers: self.headers,
            delay_seconds: self.delay,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RequestWire {
    pub id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub ip: String,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl RequestWire {
    #[cfg(test)]
    pub fn from_request(request: &Request) -> Self {
        Self {
            id: request.id.clone(),
            session_id: request.session_id.clone(),
            ip: request.client_address.clone(),
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            timestamp: request.captured_at,
            body: request.payload.bytes().map(|b| STANDARD.encode(b)),
        }
    }

    /// Converts to a [`Request`]. An empty `sessionId` is filled in from
    /// the session the request was fetched for.
    pub fn into_request(self, session_id: &str) -> RemoteResult<Request> {
        let payload = match self.body {
            Some(body) => Payload::Resolved(decode_body(&body)?),
            None => Payload::Pending,
        };
        let session_id = if self.session_id.is_empty() {
            session_id.to_string()
        } else {
            self.session_id
        };
        Ok(Request {
            id: self.id,
            session_id,
            client_address: self.ip,
            method: self.method,
            url: self.url,
            headers: self.headers,
            captured_at: self.timestamp,
            payload,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SuccessWire {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ExistsQueryWire {
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RequestRefWire {
    pub id: String,
}

/// One push channel message.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub(crate) enum PushFrame {
    Create { request: RequestWire },
    Delete { request: RequestRefWire },
    Clear,
}

/// Parses a push channel text frame into an event.
///
/// Create events never carry a payload, even if the frame includes one.
pub(crate) fn parse_push_frame(text: &str, session_id: &str) -> RemoteResult<PushEvent> {
    let frame: PushFrame = serde_json::from_str(text)
        .map_err(|e| RemoteError::Protocol(format!("invalid push frame: {}", e)))?;
    Ok(match frame {
        PushFrame::Create { request } => {
            PushEvent::Create(request.into_request(session_id)?.without_payload())
        }
        PushFrame::Delete { request } => PushEvent::Delete {
            request_id: request.id,
        },
        PushFrame::Clear => PushEvent::Clear,
    })
}

fn decode_body(encoded: &str) -> RemoteResult<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|e| RemoteError::Protocol(format!("invalid base64 body: {}", e)))
}
