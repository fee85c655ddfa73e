//! Server-sent events body over an update stream receiver

use crate::services::update_stream::StreamMessage;
use bytes::Bytes;
use hyper::body::{Body, Frame};
use serde_json::json;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Streaming response body; ends after a completion or error message.
/// Dropping it (client gone) closes the receiver, which stops the poller.
pub struct SseBody {
    rx: mpsc::Receiver<StreamMessage>,
    done: bool,
}

impl SseBody {
    pub fn new(rx: mpsc::Receiver<StreamMessage>) -> Self {
        Self { rx, done: false }
    }
}

/// Encode one message as an SSE frame; `None` for messages that only end the stream
pub fn encode(message: &StreamMessage) -> Option<Bytes> {
    match message {
        StreamMessage::Update(snapshot) => {
            let data = serde_json::to_string(snapshot).ok()?;
            Some(Bytes::from(format!("event: update\ndata: {data}\n\n")))
        }
        StreamMessage::Error(reason) => {
            let data = json!({ "error": reason });
            Some(Bytes::from(format!("event: error\ndata: {data}\n\n")))
        }
        StreamMessage::Completed(_) => None,
    }
}

impl Body for SseBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        if self.done {
            return Poll::Ready(None);
        }
        loop {
            match self.rx.poll_recv(cx) {
                Poll::Ready(Some(message)) => {
                    if matches!(message, StreamMessage::Completed(_) | StreamMessage::Error(_)) {
                        self.done = true;
                    }
                    match encode(&message) {
                        Some(bytes) => return Poll::Ready(Some(Ok(Frame::data(bytes)))),
                        None if self.done => return Poll::Ready(None),
                        None => continue,
                    }
                }
                Poll::Ready(None) => {
                    self.done = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.done
    }
}
