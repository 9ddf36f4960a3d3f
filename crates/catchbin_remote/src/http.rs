//! HTTP remote client.
//!
//! [`HttpRemote`] speaks the catchbin JSON API. The actual HTTP client and
//! socket library are abstracted via [`HttpClient`] and [`SocketConnector`]
//! so any implementation (reqwest, hyper, tungstenite, ...) can be plugged in.

use crate::client::{PushCloser, PushSubscription, RemoteClient};
use crate::config::RemoteConfig;
use crate::error::{RemoteError, RemoteResult};
use crate::wire::{
    parse_push_frame, ExistsQueryWire, RequestWire, SessionOptionsWire, SessionWire, SuccessWire,
};
use async_trait::async_trait;
use catchbin_model::{sort_newest_first, Request, Session, SessionOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// HTTP method used by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Method name as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// An outgoing HTTP request. Bodies are JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// JSON body, if any.
    pub body: Option<Vec<u8>>,
}

/// A received HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Errors are transport-level failures (connection refused, reset, DNS);
/// any response the server produced is returned as an [`HttpResponse`].
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Sends a request and returns the response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// An open text-frame socket.
pub struct SocketStream {
    /// Incoming text frames; an `Err` reports a socket failure.
    pub frames: mpsc::Receiver<Result<String, String>>,
    /// Closes the socket.
    pub closer: PushCloser,
}

/// Socket connector abstraction for push channels.
#[async_trait]
pub trait SocketConnector: Send + Sync + 'static {
    /// Opens a socket to the given URL.
    async fn connect(&self, url: &str) -> Result<SocketStream, String>;
}

/// What a call is about, for error mapping and logging.
#[derive(Clone, Copy)]
struct Call<'a> {
    operation: &'static str,
    kind: &'static str,
    id: &'a str,
    idempotent: bool,
}

/// Remote client over the catchbin HTTP API.
pub struct HttpRemote<C: HttpClient, W: SocketConnector> {
    config: RemoteConfig,
    client: C,
    sockets: W,
}

impl<C: HttpClient, W: SocketConnector> HttpRemote<C, W> {
    /// Creates a new HTTP remote.
    pub fn new(config: RemoteConfig, client: C, sockets: W) -> Self {
        Self {
            config,
            client,
            sockets,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.base_url, path)
    }

    async fn send_once(&self, call: Call<'_>, request: HttpRequest) -> RemoteResult<Vec<u8>> {
        let response = match tokio::time::timeout(self.config.timeout, self.client.send(request))
            .await
        {
            Err(_) => {
                return Err(RemoteError::transport_retryable(format!(
                    "{} timed out",
                    call.operation
                )))
            }
            Ok(Err(message)) => return Err(RemoteError::transport_retryable(message)),
            Ok(Ok(response)) => response,
        };

        match response.status {
            _ if response.is_success() => Ok(response.body),
            404 => Err(RemoteError::NotFound {
                kind: call.kind,
                id: call.id.to_string(),
            }),
            429 | 500..=599 => Err(RemoteError::transport_retryable(format!(
                "{} returned status {}",
                call.operation, response.status
            ))),
            status => Err(RemoteError::rejected(
                call.operation,
                format!("status {}", status),
            )),
        }
    }

    /// Sends a request, retrying idempotent calls on retryable errors.
    async fn execute(&self, call: Call<'_>, request: HttpRequest) -> RemoteResult<Vec<u8>> {
        let retry = &self.config.retry;
        let max_attempts = if call.idempotent {
            retry.max_attempts
        } else {
            1
        };

        let mut attempt = 0;
        loop {
            let delay = retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.send_once(call, request.clone()).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    warn!(
                        operation = call.operation,
                        attempt = attempt + 1,
                        error = %e,
                        "remote call failed, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, call: Call<'_>, path: &str) -> RemoteResult<T> {
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: self.url(path),
            body: None,
        };
        let body = self.execute(call, request).await?;
        decode(call.operation, &body)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        call: Call<'_>,
        path: &str,
        payload: &B,
    ) -> RemoteResult<T> {
        let request = HttpRequest {
            method: HttpMethod::Post,
            url: self.url(path),
            body: Some(encode(payload)?),
        };
        let body = self.execute(call, request).await?;
        decode(call.operation, &body)
    }

    async fn delete(&self, call: Call<'_>, path: &str) -> RemoteResult<bool> {
        let request = HttpRequest {
            method: HttpMethod::Delete,
            url: self.url(path),
            body: None,
        };
        let body = self.execute(call, request).await?;
        let result: SuccessWire = decode(call.operation, &body)?;
        Ok(result.success)
    }
}

#[async_trait]
impl<C: HttpClient, W: SocketConnector> RemoteClient for HttpRemote<C, W> {
    async fn create_session(&self, options: &SessionOptions) -> RemoteResult<Session> {
        let call = Call {
            operation: "create session",
            kind: "session",
            id: "",
            idempotent: false,
        };
        let wire = SessionOptionsWire::from_options(options)?;
        let session: SessionWire = self.post_json(call, "/session", &wire).await?;
        session.into_session()
    }

    async fn get_session(&self, session_id: &str) -> RemoteResult<Session> {
        let call = Call {
            operation: "get session",
            kind: "session",
            id: session_id,
            idempotent: true,
        };
        let session: SessionWire = self
            .get_json(call, &format!("/session/{}", session_id))
            .await?;
        session.into_session()
    }

    async fn delete_session(&self, session_id: &str) -> RemoteResult<bool> {
        let call = Call {
            operation: "delete session",
            kind: "session",
            id: session_id,
            idempotent: false,
        };
        self.delete(call, &format!("/session/{}", session_id)).await
    }

    async fn check_sessions_exist(
        &self,
        session_ids: &[String],
    ) -> RemoteResult<HashMap<String, bool>> {
        if session_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let call = Call {
            operation: "check sessions exist",
            kind: "session",
            id: "",
            idempotent: true,
        };
        let query = ExistsQueryWire {
            ids: session_ids.to_vec(),
        };
        let mut exists: HashMap<String, bool> =
            self.post_json(call, "/session/exists", &query).await?;
        // Ids the server left out are treated as existing.
        for id in session_ids {
            exists.entry(id.clone()).or_insert(true);
        }
        Ok(exists)
    }

    async fn get_session_requests(&self, session_id: &str) -> RemoteResult<Vec<Request>> {
        let call = Call {
            operation: "list requests",
            kind: "session",
            id: session_id,
            idempotent: true,
        };
        let wires: Vec<RequestWire> = self
            .get_json(call, &format!("/session/{}/requests", session_id))
            .await?;
        let mut requests = wires
            .into_iter()
            .map(|w| w.into_request(session_id))
            .collect::<RemoteResult<Vec<_>>>()?;
        sort_newest_first(&mut requests);
        Ok(requests)
    }

    async fn get_session_request(
        &self,
        session_id: &str,
        request_id: &str,
    ) -> RemoteResult<Request> {
        let call = Call {
            operation: "get request",
            kind: "request",
            id: request_id,
            idempotent: true,
        };
        let wire: RequestWire = self
            .get_json(
                call,
                &format!("/session/{}/requests/{}", session_id, request_id),
            )
            .await?;
        wire.into_request(session_id)
    }

    async fn delete_session_request(
        &self,
        session_id: &str,
        request_id: &str,
    ) -> RemoteResult<bool> {
        let call = Call {
            operation: "delete request",
            kind: "request",
            id: request_id,
            idempotent: false,
        };
        self.delete(
            call,
            &format!("/session/{}/requests/{}", session_id, request_id),
        )
        .await
    }

    async fn delete_all_session_requests(&self, session_id: &str) -> RemoteResult<bool> {
        let call = Call {
            operation: "delete all requests",
            kind: "session",
            id: session_id,
            idempotent: false,
        };
        self.delete(call, &format!("/session/{}/requests", session_id))
            .await
    }

    async fn subscribe_to_session_requests(
        &self,
        session_id: &str,
    ) -> RemoteResult<PushSubscription> {
        let url = format!(
            "{}/api/session/{}/requests/subscribe",
            self.config.socket_base(),
            session_id
        );
        let SocketStream {
            mut frames,
            closer: socket_closer,
        } = self
            .sockets
            .connect(&url)
            .await
            .map_err(RemoteError::transport_retryable)?;

        let (tx, rx) = mpsc::channel(self.config.push_buffer.max(1));
        let channel_session = session_id.to_string();
        let forward = tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                let item = match frame {
                    Ok(text) => parse_push_frame(&text, &channel_session),
                    Err(message) => {
                        let _ = tx.send(Err(RemoteError::transport_retryable(message))).await;
                        break;
                    }
                };
                if tx.send(item).await.is_err() {
                    break;
                }
            }
            debug!(session_id = %channel_session, "push socket ended");
        });

        debug!(session_id, "push socket opened");
        let closer = PushCloser::new(move || {
            forward.abort();
            socket_closer.close();
        });
        Ok(PushSubscription::new(session_id, rx, closer))
    }
}

fn encode<T: Serialize>(value: &T) -> RemoteResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| RemoteError::Protocol(e.to_string()))
}

fn decode<T: DeserializeOwned>(operation: &str, body: &[u8]) -> RemoteResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| RemoteError::Protocol(format!("{}: invalid response: {}", operation, e)))
}
