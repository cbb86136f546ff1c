//! The local IPC surface.
//!
//! One request per connection over a Unix socket, length-delimited JSON
//! frames (4-byte big-endian length prefix). The server streams
//! diagnostic frames while a privileged operation runs and finishes with
//! exactly one success or error frame. The connection doubles as the
//! cancellation scope: if the peer hangs up mid-operation, the operation
//! is cancelled and its resources torn down.

use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use realmjoin_core::{DiagnosticEvent, DiscoverOptions, RealmDescriptor, RealmError};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use zeroize::Zeroizing;

use crate::authz::{self, MethodGate, Peer};
use crate::credentials::AdminCredentials;
use crate::service::ServiceState;

/// Maximum frame size (16 MB).
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Read a length-delimited frame from an async reader.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Bytes> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {} bytes", len),
        ));
    }

    let mut buf = BytesMut::with_capacity(len);
    buf.resize(len, 0);
    reader.read_exact(&mut buf).await?;

    Ok(buf.freeze())
}

/// Write a length-delimited frame to an async writer.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame too large: {} bytes", data.len()),
        ));
    }

    let len = data.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;

    Ok(())
}

mod cache_bytes {
    //! Credential cache bytes travel base64-encoded inside JSON.

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(&text).map_err(serde::de::Error::custom)
    }
}

/// A client request. Exactly one per connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum Request {
    Discover {
        input: String,
        #[serde(default)]
        options: DiscoverOptions,
    },
    EnrollWithPassword {
        realm: String,
        principal: String,
        password: String,
    },
    EnrollWithCredentialCache {
        realm: String,
        #[serde(with = "cache_bytes")]
        cache: Vec<u8>,
    },
    UnenrollWithPassword {
        realm: String,
        principal: String,
        password: String,
    },
    UnenrollWithCredentialCache {
        realm: String,
        #[serde(with = "cache_bytes")]
        cache: Vec<u8>,
    },
}

impl Request {
    pub fn method_name(&self) -> &'static str {
        match self {
            Request::Discover { .. } => "Discover",
            Request::EnrollWithPassword { .. } => "EnrollWithPassword",
            Request::EnrollWithCredentialCache { .. } => "EnrollWithCredentialCache",
            Request::UnenrollWithPassword { .. } => "UnenrollWithPassword",
            Request::UnenrollWithCredentialCache { .. } => "UnenrollWithCredentialCache",
        }
    }
}

/// One discovery result: the realm's descriptor plus its ranking weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedRealm {
    pub descriptor: RealmDescriptor,
    pub relevance: i32,
}

/// A server-to-client frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "kebab-case")]
pub enum ServerFrame {
    /// Streamed while an operation runs.
    Diagnostic { event: DiagnosticEvent },
    /// Terminal: the operation succeeded.
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        realms: Option<Vec<RankedRealm>>,
    },
    /// Terminal: the operation failed.
    Error { error: RealmError },
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, frame: &ServerFrame) -> anyhow::Result<()> {
    let data = serde_json::to_vec(frame)?;
    write_frame(writer, &data).await?;
    Ok(())
}

/// Serve one connection to completion.
pub async fn handle_connection(
    stream: UnixStream,
    state: Arc<ServiceState>,
) -> anyhow::Result<()> {
    let cred = stream.peer_cred()?;
    let peer = Peer { uid: cred.uid() };
    tracing::debug!(uid = peer.uid, "Accepted connection");

    let (mut reader, mut writer) = stream.into_split();

    let frame = read_frame(&mut reader).await?;

    // The gate is consulted on the raw method tag, before the request is
    // decoded: an unknown method is an authorization failure, not a
    // parse error.
    let value: serde_json::Value = match serde_json::from_slice(&frame) {
        Ok(value) => value,
        Err(err) => {
            let error = RealmError::InvalidArgument(format!("Malformed request: {}", err));
            send(&mut writer, &ServerFrame::Error { error }).await?;
            return Ok(());
        }
    };
    let method = value
        .get("method")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();

    match authz::gate_for_method(&method) {
        MethodGate::Allowed => {}
        MethodGate::RequiresAction(action) => {
            if !state.policy.check(&peer, action) {
                send(
                    &mut writer,
                    &ServerFrame::Error {
                        error: RealmError::not_authorized(),
                    },
                )
                .await?;
                return Ok(());
            }
        }
        MethodGate::Denied => {
            tracing::warn!(method = %method, "Rejected unknown method");
            send(
                &mut writer,
                &ServerFrame::Error {
                    error: RealmError::not_authorized(),
                },
            )
            .await?;
            return Ok(());
        }
    }

    let request: Request = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(err) => {
            let error = RealmError::InvalidArgument(format!("Malformed request: {}", err));
            send(&mut writer, &ServerFrame::Error { error }).await?;
            return Ok(());
        }
    };

    match request {
        Request::Discover { input, options } => {
            tracing::info!(input = %input, "Discovering realms");
            let found = state.engine.discover(&input, &options).await;
            let realms = found
                .into_iter()
                .map(|candidate| RankedRealm {
                    descriptor: candidate.realm.descriptor(),
                    relevance: candidate.relevance,
                })
                .collect();
            send(
                &mut writer,
                &ServerFrame::Success {
                    realms: Some(realms),
                },
            )
            .await
        }
        other => run_realm_operation(other, reader, &mut writer, state).await,
    }
}

enum RealmMethod {
    Enroll,
    Unenroll,
}

fn split_request(request: Request) -> (RealmMethod, String, AdminCredentials) {
    match request {
        Request::EnrollWithPassword {
            realm,
            principal,
            password,
        } => (
            RealmMethod::Enroll,
            realm,
            AdminCredentials::Password {
                principal,
                password: Zeroizing::new(password),
            },
        ),
        Request::EnrollWithCredentialCache { realm, cache } => (
            RealmMethod::Enroll,
            realm,
            AdminCredentials::CredentialCache(cache),
        ),
        Request::UnenrollWithPassword {
            realm,
            principal,
            password,
        } => (
            RealmMethod::Unenroll,
            realm,
            AdminCredentials::Password {
                principal,
                password: Zeroizing::new(password),
            },
        ),
        Request::UnenrollWithCredentialCache { realm, cache } => (
            RealmMethod::Unenroll,
            realm,
            AdminCredentials::CredentialCache(cache),
        ),
        Request::Discover { .. } => unreachable!("discovery handled separately"),
    }
}

/// Run an enroll or unenroll to completion on behalf of one connection,
/// streaming diagnostics as they happen and cancelling the operation if
/// the peer disconnects first.
async fn run_realm_operation<W: AsyncWrite + Unpin>(
    request: Request,
    mut reader: tokio::net::unix::OwnedReadHalf,
    writer: &mut W,
    state: Arc<ServiceState>,
) -> anyhow::Result<()> {
    let (method, realm_name, credentials) = split_request(request);

    let Some(realm) = state.engine.lookup_realm(&realm_name) else {
        let error = RealmError::InvalidArgument(format!("No such realm: {}", realm_name));
        return send(writer, &ServerFrame::Error { error }).await;
    };

    let (caller, mut diag_rx, cancel_tx) = crate::caller::CallerHandle::new();

    // The protocol is one request per connection, so any further bytes or
    // EOF from the peer means it is gone. Either way, cancel.
    let hangup_watch = tokio::spawn(async move {
        let mut buf = [0u8; 1];
        let _ = reader.read(&mut buf).await;
        let _ = cancel_tx.send(true);
    });

    let operation = tokio::spawn(async move {
        match method {
            RealmMethod::Enroll => realm.enroll(credentials, caller).await,
            RealmMethod::Unenroll => realm.unenroll(credentials, caller).await,
        }
    });

    // Forward diagnostics until the operation finishes, then drain the
    // stragglers. The channel closes once the operation task drops its
    // last caller handle.
    let mut operation = Some(operation);
    let mut outcome = None;
    loop {
        match operation.as_mut() {
            Some(handle) => {
                tokio::select! {
                    joined = handle => {
                        outcome = Some(joined?);
                        operation = None;
                    }
                    event = diag_rx.recv() => {
                        if let Some(event) = event {
                            send(writer, &ServerFrame::Diagnostic { event }).await?;
                        }
                    }
                }
            }
            None => match diag_rx.recv().await {
                Some(event) => send(writer, &ServerFrame::Diagnostic { event }).await?,
                None => break,
            },
        }
    }

    hangup_watch.abort();

    match outcome {
        Some(Ok(())) => send(writer, &ServerFrame::Success { realms: None }).await,
        Some(Err(error)) => send(writer, &ServerFrame::Error { error }).await,
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use std::io::Cursor;

    #[tokio::test]
    async fn frame_roundtrip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello realm").await.unwrap();

        let mut cursor = Cursor::new(buf);
        let frame = read_frame(&mut cursor).await.unwrap();
        assert_eq!(&frame[..], b"hello realm");
    }

    #[tokio::test]
    async fn oversized_header_is_rejected() {
        let huge = (MAX_FRAME_SIZE + 1) as u32;
        let mut cursor = Cursor::new(huge.to_be_bytes().to_vec());

        let result = read_frame(&mut cursor).await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn requests_are_tagged_by_method() {
        let request: Request = serde_json::from_str(
            r#"{"method": "Discover", "input": "corp.example.com"}"#,
        )
        .unwrap();
        assert_eq!(request.method_name(), "Discover");
        assert!(matches!(request, Request::Discover { options, .. } if options.software.is_none()));
    }

    #[test]
    fn cache_bytes_travel_base64() {
        let request = Request::EnrollWithCredentialCache {
            realm: "corp.example.com".into(),
            cache: b"ticket".to_vec(),
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(&base64::engine::general_purpose::STANDARD.encode(b"ticket")));

        let back: Request = serde_json::from_str(&json).unwrap();
        match back {
            Request::EnrollWithCredentialCache { cache, .. } => {
                assert_eq!(cache, b"ticket".to_vec())
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn terminal_frames_carry_wire_codes() {
        let frame = ServerFrame::Error {
            error: RealmError::busy(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["frame"], "error");
        assert_eq!(json["error"]["domain"], "busy");
        assert_eq!(json["error"]["message"], "Already running another action");
    }
}
