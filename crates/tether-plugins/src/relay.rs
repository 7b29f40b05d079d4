//! Resource stream relay: turns the chunks of a resource call into one
//! outgoing HTTP response.

use std::io;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, SET_COOKIE};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::error::{PluginError, PluginResult};
use crate::handle::PluginHandle;
use crate::models::CallResourceRequest;
use crate::stream::CallResourceStream;

/// Destination of a relayed resource response.
///
/// Mirrors an HTTP response writer: headers are collected until the status
/// is written, and writing body bytes before a status implies `200 OK`.
#[async_trait]
pub trait ResponseWriter: Send {
    /// Headers that will be sent with the status.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Commit the status and the collected headers.
    fn write_status(&mut self, status: StatusCode);

    /// Write body bytes.
    async fn write_body(&mut self, body: &[u8]) -> io::Result<()>;

    /// Push buffered output to the client.
    async fn flush(&mut self) -> io::Result<()>;

    /// Whether the status line has been sent.
    fn is_committed(&self) -> bool;
}

/// How a relay ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The stream ended normally after this many chunks.
    Completed(usize),
    /// Receiving failed after this many chunks had been written.
    Truncated(usize),
}

/// Drain `stream` into `writer` until the stream ends.
///
/// Status and headers are committed at most once, from the first chunk, and
/// only if that chunk carries headers. `Set-Cookie` is never forwarded and
/// `Content-Type` defaults to `application/json`.
///
/// # Errors
///
/// [`PluginError::EmptyResourceResponse`] if the stream ends before any
/// chunk arrived; a wrapped receive error if receiving fails before any
/// chunk arrived. A receive failure after that is logged, the stream is
/// closed and [`RelayOutcome::Truncated`] is returned.
pub async fn flush_stream(
    handle: &PluginHandle,
    stream: &CallResourceStream,
    writer: &mut dyn ResponseWriter,
) -> PluginResult<RelayOutcome> {
    let mut processed: usize = 0;

    loop {
        let chunk = match stream.recv().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) if processed == 0 => return Err(PluginError::EmptyResourceResponse),
            Ok(None) => return Ok(RelayOutcome::Completed(processed)),
            Err(e) if processed == 0 => {
                return Err(e.wrap("failed to receive response from resource call"));
            },
            Err(e) => {
                handle.logger().in_scope(|| {
                    error!(error = %e, "failed to receive response from resource call");
                });
                let _ = stream.close();
                return Ok(RelayOutcome::Truncated(processed));
            },
        };

        if processed == 0
            && let Some(headers) = &chunk.headers
        {
            commit_head(writer, headers, chunk.status.unwrap_or(StatusCode::OK));
        }

        if let Err(e) = writer.write_body(&chunk.body).await {
            handle.logger().in_scope(|| {
                error!(error = %e, "failed to write resource response");
            });
        }
        let _ = writer.flush().await;
        processed = processed.saturating_add(1);
    }
}

fn commit_head(writer: &mut dyn ResponseWriter, headers: &HeaderMap, status: StatusCode) {
    let out = writer.headers_mut();
    if !headers.contains_key(CONTENT_TYPE) {
        out.append(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    for (name, value) in headers {
        if name == SET_COOKIE {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    writer.write_status(status);
}

/// Run `handle`'s resource call against a fresh stream while relaying the
/// stream into `writer`.
///
/// Both halves run on the current task and are joined before returning; the
/// stream is closed and its token cancelled on every path. A plugin error
/// takes precedence over the relay's error, except once the response was
/// partially written, in which case the call is reported as successful.
///
/// # Errors
///
/// The plugin's error, or the relay's error from [`flush_stream`].
pub async fn relay_call_resource(
    handle: &PluginHandle,
    token: &CancellationToken,
    request: CallResourceRequest,
    writer: &mut dyn ResponseWriter,
) -> PluginResult<()> {
    let token = token.child_token();
    let stream = CallResourceStream::new(token.clone());

    let produce = async {
        let result = tokio::select! {
            biased;
            () = token.cancelled() => Err(PluginError::Cancelled),
            result = handle.call_resource(request, &stream) => result,
        };
        if let Err(e) = stream.close() {
            handle.logger().in_scope(|| warn!(error = %e, "failed to close stream"));
        }
        result
    };

    let consume = async {
        let outcome = flush_stream(handle, &stream, writer).await;
        token.cancel();
        outcome
    };

    let (called, relayed) = tokio::join!(produce, consume);
    match (called, relayed) {
        (_, Ok(RelayOutcome::Truncated(_))) => Ok(()),
        (Err(e), _) => Err(e),
        (Ok(()), relayed) => relayed.map(|_| ()),
    }
}
