//! Request-scoped rendezvous channel for resource call chunks.
//!
//! `send` completes only once the receiving side has taken the chunk, so a
//! plugin can never run ahead of the client. Misuse (send or close after
//! close) is an ordinary error.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::backend::CallResourceResponseSender;
use crate::error::{PluginError, PluginResult};
use crate::models::CallResourceResponse;

type Delivery = (CallResourceResponse, oneshot::Sender<()>);

/// Single-producer, single-consumer stream of resource response chunks
/// bound to a cancellation token.
#[derive(Debug)]
pub struct CallResourceStream {
    sender: Mutex<Option<mpsc::Sender<Delivery>>>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<Delivery>>,
    token: CancellationToken,
}

impl CallResourceStream {
    /// Create a stream that gives up once `token` is cancelled.
    #[must_use]
    pub fn new(token: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            sender: Mutex::new(Some(tx)),
            receiver: tokio::sync::Mutex::new(rx),
            token,
        }
    }

    /// Hand `response` to the receiver and wait until it has been taken.
    ///
    /// # Errors
    ///
    /// [`PluginError::StreamClosed`] if the stream was closed,
    /// [`PluginError::Cancelled`] if the token fires first.
    pub async fn send(&self, response: CallResourceResponse) -> PluginResult<()> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(PluginError::StreamClosed("send to"))?;

        let (ack_tx, ack_rx) = oneshot::channel();
        tokio::select! {
            biased;
            () = self.token.cancelled() => return Err(PluginError::Cancelled),
            sent = sender.send((response, ack_tx)) => {
                sent.map_err(|_| PluginError::StreamClosed("send to"))?;
            }
        }
        drop(sender);

        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(PluginError::Cancelled),
            taken = ack_rx => taken.map_err(|_| PluginError::StreamClosed("send to")),
        }
    }

    /// Next chunk, or `None` once the stream is closed and drained.
    ///
    /// # Errors
    ///
    /// [`PluginError::Cancelled`] if the token fires first.
    pub async fn recv(&self) -> PluginResult<Option<CallResourceResponse>> {
        let mut receiver = self.receiver.lock().await;
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(PluginError::Cancelled),
            delivery = receiver.recv() => Ok(delivery.map(|(response, ack)| {
                let _ = ack.send(());
                response
            })),
        }
    }

    /// Close the stream. Pending and later `recv` calls see the end of the
    /// stream once in-flight sends are drained.
    ///
    /// # Errors
    ///
    /// [`PluginError::StreamClosed`] if already closed.
    pub fn close(&self) -> PluginResult<()> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(drop)
            .ok_or(PluginError::StreamClosed("close"))
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

#[async_trait]
impl CallResourceResponseSender for CallResourceStream {
    async fn send(&self, response: CallResourceResponse) -> PluginResult<()> {
        CallResourceStream::send(self, response).await
    }
}
