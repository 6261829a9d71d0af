// Inter-context transport
//
// Each context owns an inbox. Other contexts hold a cloneable `ChannelTransport`
// to it and exchange serialized frames only, never shared values. Every inbound
// frame is handled on its own task, so replies may come back in any order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::protocol::{
    deserialize_message, encode_frame, serialize_message, ActionMessage, ActionResponse,
    MAX_REQUEST_FRAME_SIZE, MAX_RESPONSE_FRAME_SIZE,
};

/// `send(message) -> response` towards another context
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: ActionMessage) -> Result<ActionResponse, TransportError>;
}

/// Uniform async message handler run by a context for each inbound message
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: ActionMessage) -> ActionResponse;
}

struct Frame {
    bytes: Vec<u8>,
    reply: oneshot::Sender<Vec<u8>>,
}

/// Sending half of a context's inbox
#[derive(Clone)]
pub struct ChannelTransport {
    context: &'static str,
    tx: mpsc::Sender<Frame>,
    timeout: Option<Duration>,
}

/// Receiving half, consumed by `serve`
pub struct Inbox {
    context: &'static str,
    rx: mpsc::Receiver<Frame>,
}

/// Create the inbox of a named context
pub fn channel(context: &'static str, capacity: usize) -> (ChannelTransport, Inbox) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ChannelTransport {
            context,
            tx,
            timeout: None,
        },
        Inbox { context, rx },
    )
}

impl ChannelTransport {
    /// Bound each round trip; an unresponsive context becomes `TransportError::Timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Name of the context this transport delivers to
    pub fn context(&self) -> &'static str {
        self.context
    }

    async fn round_trip(&self, message: ActionMessage) -> Result<ActionResponse, TransportError> {
        let bytes = encode_frame(&message, MAX_REQUEST_FRAME_SIZE)?;
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(Frame {
                bytes,
                reply: reply_tx,
            })
            .await
            .map_err(|_| TransportError::Closed(self.context))?;

        let reply = reply_rx
            .await
            .map_err(|_| TransportError::NoResponse(self.context))?;

        Ok(deserialize_message(&reply)?)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, message: ActionMessage) -> Result<ActionResponse, TransportError> {
        debug!(to = self.context, action = %message.action, "send");
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.round_trip(message))
                .await
                .map_err(|_| TransportError::Timeout {
                    context: self.context,
                    elapsed: limit,
                })?,
            None => self.round_trip(message).await,
        }
    }
}

impl Inbox {
    pub fn context(&self) -> &'static str {
        self.context
    }

    /// Run `handler` for every inbound frame until all senders are dropped
    pub fn serve<H>(self, handler: Arc<H>) -> JoinHandle<()>
    where
        H: MessageHandler + ?Sized,
    {
        let Inbox { context, mut rx } = self;
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let response = handle_frame(context, handler.as_ref(), &frame.bytes).await;
                    let bytes = encode_reply(context, &response);
                    if frame.reply.send(bytes).is_err() {
                        debug!(context, "requester went away before the reply");
                    }
                });
            }
            debug!(context, "inbox closed");
        })
    }
}

/// Encode a reply under the response frame limit, degrading to an error reply
fn encode_reply(context: &'static str, response: &ActionResponse) -> Vec<u8> {
    match encode_frame(response, MAX_RESPONSE_FRAME_SIZE) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(context, "failed to encode response: {}", e);
            let fallback = ActionResponse::failure(format!("Response rejected: {}", e));
            serialize_message(&fallback).unwrap_or_else(|_| {
                b"{\"success\":false,\"error\":\"response encoding failed\"}\n".to_vec()
            })
        }
    }
}

async fn handle_frame<H>(context: &'static str, handler: &H, bytes: &[u8]) -> ActionResponse
where
    H: MessageHandler + ?Sized,
{
    match deserialize_message::<ActionMessage>(bytes) {
        Ok(message) => {
            debug!(context, action = %message.action, "handle");
            handler.handle(message).await
        }
        Err(e) => ActionResponse::failure(format!("Failed to parse message: {}", e)),
    }
}
