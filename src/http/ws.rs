//! WebSocket upload session.
//!
//! Each inbound frame is a JSON envelope with a `subject`. Clients ask for PUT
//! URLs with `get-signed-url` and report completed uploads with
//! `finished-image-upload`; handled frames are echoed back.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::http::AppState;
use crate::storage::{CloudStorageObject, SignedBucketUrl};

pub const SUBJECT_GET_SIGNED_URL: &str = "get-signed-url";
pub const SUBJECT_FINISHED_UPLOAD: &str = "finished-image-upload";

/// Sent when a signed URL could not be produced; the session ends after it
pub const UPLOAD_FAILED: &str = r#"{"error": "upload failed"}"#;

/// Only verb clients may use with URLs from the upload session
const WS_SIGNED_METHOD: &str = "PUT";

#[derive(Debug, Deserialize)]
struct Envelope {
    subject: String,
}

#[derive(Debug, Serialize)]
pub struct SignedUrlReply {
    #[serde(flatten)]
    pub signed: SignedBucketUrl,
    #[serde(rename = "url-signing-status")]
    pub url_signing_status: String,
}

/// What the session loop should do after one inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Text frames to send, in order
    pub replies: Vec<String>,
    /// Send the inbound frame back after the replies
    pub echo: bool,
    /// End the session once replies are sent
    pub close: bool,
}

impl Outcome {
    fn close_with(replies: Vec<String>) -> Self {
        Self {
            replies,
            echo: false,
            close: true,
        }
    }

    fn echo_with(replies: Vec<String>) -> Self {
        Self {
            replies,
            echo: true,
            close: false,
        }
    }
}

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| session(socket, state))
}

async fn session(mut socket: WebSocket, state: AppState) {
    debug!("WebSocket session opened");

    while let Some(frame) = socket.recv().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!("streamed messages could not be read: {}", e);
                return;
            }
        };

        let payload: Vec<u8> = match &frame {
            Message::Text(text) => text.as_bytes().to_vec(),
            Message::Binary(data) => data.clone(),
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        let outcome = handle_message(&state, &payload).await;

        for reply in outcome.replies {
            if let Err(e) = socket.send(Message::Text(reply)).await {
                warn!("reply could not be streamed to client: {}", e);
                return;
            }
        }
        if outcome.close {
            return;
        }
        if outcome.echo {
            if let Err(e) = socket.send(frame).await {
                warn!("echo could not be streamed to client: {}", e);
                return;
            }
        }
    }

    debug!("WebSocket session closed");
}

/// Decide the response to one inbound frame
pub async fn handle_message(state: &AppState, payload: &[u8]) -> Outcome {
    let envelope: Envelope = match serde_json::from_slice(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("invalid request on upload session: {}", e);
            return Outcome::close_with(Vec::new());
        }
    };

    match envelope.subject.as_str() {
        SUBJECT_GET_SIGNED_URL => {
            let object: CloudStorageObject = match serde_json::from_slice(payload) {
                Ok(object) => object,
                Err(e) => {
                    warn!("invalid signed URL request: {}", e);
                    return Outcome::close_with(vec![UPLOAD_FAILED.to_string()]);
                }
            };

            let signed = match state
                .storage
                .generate_presigned_bucket_url(&state.bucket, &object, WS_SIGNED_METHOD)
                .await
            {
                Ok(signed) => signed,
                Err(e) => {
                    state
                        .reporter
                        .report("GET", "/ws", &format!("signed URL could not be generated: {}", e));
                    return Outcome::close_with(vec![UPLOAD_FAILED.to_string()]);
                }
            };

            let reply = SignedUrlReply {
                signed,
                url_signing_status: "success".to_string(),
            };
            match serde_json::to_string(&reply) {
                Ok(reply) => Outcome::echo_with(vec![reply]),
                Err(e) => {
                    warn!("signed URL could not be sent: {}", e);
                    Outcome::close_with(vec![UPLOAD_FAILED.to_string()])
                }
            }
        }
        SUBJECT_FINISHED_UPLOAD => {
            info!("Client finished uploading {}", String::from_utf8_lossy(payload));
            Outcome::echo_with(Vec::new())
        }
        other => {
            info!("Ending upload session on unknown subject {:?}", other);
            Outcome::close_with(Vec::new())
        }
    }
}
