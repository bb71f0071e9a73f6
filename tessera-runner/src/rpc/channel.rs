// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::framing::{decode_line, encode_frame};
use crate::{config::RpcTimeout, errors::RpcError};
use futures::future::BoxFuture;
use serde_json::Value;
use smol_str::SmolStr;
use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};
use tessera_metadata::{RpcErrorPayload, RpcMessage, RpcRequest, RpcResponse, RunId, WireError};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    sync::{mpsc, oneshot, watch},
};
use tracing::{debug, trace, warn};

/// Handles messages arriving on an [`RpcChannel`].
pub trait RpcHandler: Send + Sync + 'static {
    /// Handles a request. The returned value is sent back as the response.
    ///
    /// `channel` is the channel the request arrived on, for sending notifications while the
    /// request is being handled.
    fn handle_request(
        &self,
        channel: &RpcChannel,
        run_id: RunId,
        method: &str,
        args: Value,
    ) -> BoxFuture<'static, Result<Value, RpcErrorPayload>>;

    /// Handles a notification.
    ///
    /// Notifications are handled on the reader task in arrival order, before any later response
    /// is delivered.
    fn handle_notification(&self, run_id: RunId, method: &str, args: Value);

    /// Handles a line of output that was not part of a frame.
    fn handle_stray_output(&self, line: &str) {
        debug!(line, "ignoring stray output on rpc channel");
    }
}

/// A bidirectional request/response channel over a byte stream.
///
/// Both ends of a connection are symmetric: either side may make calls and send notifications.
/// Every message is tagged with a [`RunId`]. Once [`set_run`](Self::set_run) has been called,
/// messages tagged with any other run are dropped on arrival: stale requests are never executed,
/// and stale responses fail the pending call with [`RpcError::Superseded`].
///
/// Cloning the channel produces another handle to the same connection.
#[derive(Clone)]
pub struct RpcChannel {
    inner: Arc<Inner>,
}

struct Inner {
    outgoing: mpsc::UnboundedSender<String>,
    pending: Mutex<HashMap<u64, PendingCall>>,
    next_id: AtomicU64,
    current_run: Mutex<Option<RunId>>,
    timeout: RpcTimeout,
    closed: watch::Sender<bool>,
}

struct PendingCall {
    method: SmolStr,
    sender: oneshot::Sender<Result<Value, RpcError>>,
}

impl RpcChannel {
    /// Starts a channel over `reader` and `writer`, dispatching incoming messages to `handler`.
    ///
    /// `timeout` applies to calls made with [`call`](Self::call).
    ///
    /// Must be called from within a Tokio runtime: the reader and writer run as separate tasks.
    pub fn spawn<R, W>(
        reader: R,
        writer: W,
        handler: Arc<dyn RpcHandler>,
        timeout: RpcTimeout,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        let channel = Self {
            inner: Arc::new(Inner {
                outgoing,
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                current_run: Mutex::new(None),
                timeout,
                closed,
            }),
        };

        tokio::spawn(write_loop(writer, outgoing_rx));
        tokio::spawn(read_loop(reader, channel.clone(), handler));
        channel
    }

    /// Returns the timeout applied by [`call`](Self::call).
    pub fn timeout(&self) -> RpcTimeout {
        self.inner.timeout
    }

    /// Sets the current run. Messages tagged with a different run are dropped on arrival.
    ///
    /// With `None`, messages from every run are accepted.
    pub fn set_run(&self, run_id: Option<RunId>) {
        *lock(&self.inner.current_run) = run_id;
    }

    /// Returns the current run, if one is set.
    pub fn current_run(&self) -> Option<RunId> {
        *lock(&self.inner.current_run)
    }

    /// Calls `method` on the remote end, with the channel's default timeout.
    pub async fn call(&self, run_id: RunId, method: &str, args: Value) -> Result<Value, RpcError> {
        self.call_with_timeout(run_id, method, args, self.inner.timeout)
            .await
    }

    /// Calls `method` on the remote end with an explicit timeout.
    pub async fn call_with_timeout(
        &self,
        run_id: RunId,
        method: &str,
        args: Value,
        timeout: RpcTimeout,
    ) -> Result<Value, RpcError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        lock(&self.inner.pending).insert(
            id,
            PendingCall {
                method: method.into(),
                sender,
            },
        );

        let message = RpcMessage::Request(RpcRequest {
            id: Some(id),
            run_id,
            method: method.into(),
            args,
        });
        // Checked after registering the call: closing marks the channel closed before draining
        // the pending map, so a call is either drained or sees the flag.
        let sent = if self.is_closed() {
            Err(RpcError::Closed {
                method: method.to_owned(),
            })
        } else {
            self.send(method, &message)
        };
        if let Err(error) = sent {
            lock(&self.inner.pending).remove(&id);
            return Err(error);
        }
        trace!(id, method, "rpc call sent");

        let response = match timeout.as_duration() {
            Some(limit) => match tokio::time::timeout(limit, receiver).await {
                Ok(response) => response,
                Err(_) => {
                    lock(&self.inner.pending).remove(&id);
                    return Err(RpcError::Timeout {
                        method: method.to_owned(),
                        timeout: limit,
                    });
                }
            },
            None => receiver.await,
        };

        // The sender is only dropped without a value if the pending map was drained, which
        // happens when the channel closes.
        response.unwrap_or_else(|_| {
            Err(RpcError::Closed {
                method: method.to_owned(),
            })
        })
    }

    /// Sends a notification. Notifications have no response.
    ///
    /// Notifications and responses share a single outgoing queue, so a notification sent while
    /// handling a request is always delivered before that request's response.
    pub fn notify(&self, run_id: RunId, method: &str, args: Value) -> Result<(), RpcError> {
        let message = RpcMessage::Request(RpcRequest {
            id: None,
            run_id,
            method: method.into(),
            args,
        });
        self.send(method, &message)
    }

    /// Returns true once the remote end has closed the connection.
    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Waits for the remote end to close the connection.
    pub async fn closed(&self) {
        let mut receiver = self.inner.closed.subscribe();
        // The sender lives in `self`, so this cannot fail.
        let _ = receiver.wait_for(|closed| *closed).await;
    }

    fn send(&self, method: &str, message: &RpcMessage) -> Result<(), RpcError> {
        let line = encode_frame(message).map_err(|error| RpcError::Wire {
            method: method.to_owned(),
            error: WireError::Serialize(error),
        })?;
        self.inner
            .outgoing
            .send(line)
            .map_err(|_| RpcError::Closed {
                method: method.to_owned(),
            })
    }

    fn accepts(&self, run_id: RunId) -> bool {
        match *lock(&self.inner.current_run) {
            Some(current) => current == run_id,
            None => true,
        }
    }

    /// Resolves the pending call that `response` answers.
    ///
    /// A response carrying a superseded run ID is not delivered as a result: the call resolves
    /// with [`RpcError::Superseded`] so that it never stays pending.
    fn complete(&self, response: RpcResponse) {
        let Some(pending) = lock(&self.inner.pending).remove(&response.id) else {
            // The call already timed out.
            debug!(id = response.id, "dropping response to unknown call");
            return;
        };

        let method = pending.method.to_string();
        let result = if !self.accepts(response.run_id) {
            debug!(id = response.id, method, run_id = %response.run_id, "dropping stale response");
            Err(RpcError::Superseded { method })
        } else if let Some(payload) = response.error {
            Err(RpcError::Remote { method, payload })
        } else {
            Ok(response.result.unwrap_or(Value::Null))
        };
        // The caller may have gone away.
        let _ = pending.sender.send(result);
    }

    fn close(&self) {
        self.inner.closed.send_replace(true);
        let pending: Vec<_> = lock(&self.inner.pending).drain().collect();
        for (_, call) in pending {
            let _ = call.sender.send(Err(RpcError::Closed {
                method: call.method.to_string(),
            }));
        }
    }
}

impl fmt::Debug for RpcChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcChannel")
            .field("timeout", &self.inner.timeout)
            .field("current_run", &self.current_run())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

async fn write_loop<W>(mut writer: W, mut outgoing: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = outgoing.recv().await {
        let res = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;
        if let Err(error) = res {
            debug!(%error, "rpc writer closed");
            return;
        }
    }
}

async fn read_loop<R>(reader: R, channel: RpcChannel, handler: Arc<dyn RpcHandler>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(error) => {
                warn!(%error, "error reading from rpc channel");
                break;
            }
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        let decoded = decode_line(line);
        if !decoded.stray.is_empty() {
            handler.handle_stray_output(decoded.stray);
        }

        match decoded.frame {
            Some(Ok(message)) => dispatch(&channel, &handler, message),
            Some(Err(error)) => warn!(%error, "ignoring malformed rpc frame"),
            None => {}
        }
    }

    debug!("rpc channel closed by remote end");
    channel.close();
}

fn dispatch(channel: &RpcChannel, handler: &Arc<dyn RpcHandler>, message: RpcMessage) {
    match message {
        RpcMessage::Response(response) => channel.complete(response),
        RpcMessage::Request(request) => {
            if !channel.accepts(request.run_id) {
                debug!(
                    method = %request.method,
                    run_id = %request.run_id,
                    "dropping request from stale run"
                );
                return;
            }

            let Some(id) = request.id else {
                handler.handle_notification(request.run_id, &request.method, request.args);
                return;
            };

            let run_id = request.run_id;
            let method = request.method;
            let fut = handler.handle_request(channel, run_id, &method, request.args);
            let channel = channel.clone();
            tokio::spawn(async move {
                let response = match fut.await {
                    Ok(result) => RpcResponse {
                        id,
                        run_id,
                        result: Some(result),
                        error: None,
                    },
                    Err(payload) => RpcResponse {
                        id,
                        run_id,
                        result: None,
                        error: Some(payload),
                    },
                };
                if let Err(error) = channel.send(&method, &RpcMessage::Response(response)) {
                    debug!(%error, "unable to send rpc response");
                }
            });
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
