use crate::frame::{query_frame, Frame, PING, PONG};
use futures::{SinkExt, StreamExt};
use gleaner_config::ListenerConfig;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

const OUTGOING_CAPACITY: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("invalid listener request: {0}")]
    Request(String),
    #[error("connect to {url} timed out after {timeout:?}")]
    ConnectTimeout { url: String, timeout: Duration },
    #[error("connect to {url} failed: {message}")]
    Connect { url: String, message: String },
    #[error("subscription is closed")]
    Closed,
}

/// Why [`Subscription::monitor`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEnd {
    Elapsed,
    PeerClosed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSummary {
    pub frames: usize,
    pub ended: MonitorEnd,
}

/// A live websocket subscription with a single consumer.
///
/// One spawned task owns the socket: it answers keepalive pings, writes
/// outgoing frames and forwards every other text frame into a bounded queue.
/// Cancelling the token (or dropping the subscription) stops the task.
pub struct Subscription {
    url: String,
    query_event: String,
    outgoing: mpsc::Sender<String>,
    incoming: mpsc::Receiver<String>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Connect, send the opening frames and start the I/O task.
    ///
    /// `{device_id}` inside an opening frame is replaced by a random
    /// `web:<digits>` identifier.
    pub async fn connect(config: &ListenerConfig) -> Result<Self, StreamError> {
        let mut request = config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| StreamError::Request(e.to_string()))?;
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| StreamError::Request(format!("header {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| StreamError::Request(format!("header {name}: {e}")))?;
            request.headers_mut().insert(name, value);
        }

        let timeout = Duration::from_millis(config.connect_timeout_ms);
        tracing::info!(url = %config.url, timeout_ms = config.connect_timeout_ms, "listener.connect");
        let (socket, _response) = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request))
            .await
            .map_err(|_| StreamError::ConnectTimeout {
                url: config.url.clone(),
                timeout,
            })?
            .map_err(|e| StreamError::Connect {
                url: config.url.clone(),
                message: e.to_string(),
            })?;

        let (mut write, mut read) = socket.split();
        let device_id = format!("web:{}", rand::thread_rng().gen_range(1_000_000_000u64..10_000_000_000));
        for frame in &config.opening_frames {
            let frame = frame.replace("{device_id}", &device_id);
            write
                .send(Message::Text(frame))
                .await
                .map_err(|e| StreamError::Connect {
                    url: config.url.clone(),
                    message: e.to_string(),
                })?;
        }

        let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTGOING_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<String>(config.queue_capacity.max(1));
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let url = config.url.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    Some(frame) = out_rx.recv() => {
                        if let Err(e) = write.send(Message::Text(frame)).await {
                            tracing::warn!(url = %url, error = %e, "listener.send_failed");
                            break;
                        }
                    }
                    next = read.next() => match next {
                        Some(Ok(Message::Text(text))) if text == PING => {
                            if write.send(Message::Text(PONG.to_string())).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Text(text))) => {
                            // Blocks when the consumer lags; the queue is the backpressure.
                            if in_tx.send(text).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(url = %url, frame = ?frame, "listener.peer_closed");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(url = %url, error = %e, "listener.read_failed");
                            break;
                        }
                        None => break,
                    },
                }
            }
            tracing::debug!(url = %url, "listener.task_stopped");
        });

        Ok(Self {
            url: config.url.clone(),
            query_event: config.query_event.clone(),
            outgoing: out_tx,
            incoming: in_rx,
            cancel,
            task: Some(task),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn send(&self, frame: impl Into<String>) -> Result<(), StreamError> {
        self.outgoing
            .send(frame.into())
            .await
            .map_err(|_| StreamError::Closed)
    }

    /// Send a query event with a fresh six-digit session id.
    pub async fn send_query(&self, query: &str) -> Result<(), StreamError> {
        let session_id = rand::thread_rng().gen_range(100_000u32..1_000_000).to_string();
        tracing::info!(url = %self.url, %query, "listener.query");
        self.send(query_frame(&self.query_event, query, &session_id)).await
    }

    /// Next text frame, `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.incoming.recv().await
    }

    /// Feed parsed frames to `handler` until `duration` elapses, the peer
    /// closes, or the subscription is cancelled.
    pub async fn monitor<F, Fut>(&mut self, duration: Duration, mut handler: F) -> MonitorSummary
    where
        F: FnMut(Frame) -> Fut,
        Fut: Future<Output = ()>,
    {
        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);
        let mut frames = 0usize;
        let ended = loop {
            tokio::select! {
                _ = &mut deadline => break MonitorEnd::Elapsed,
                _ = self.cancel.cancelled() => break MonitorEnd::Cancelled,
                next = self.incoming.recv() => match next {
                    Some(text) => {
                        frames += 1;
                        handler(Frame::parse(&text)).await;
                    }
                    None => break MonitorEnd::PeerClosed,
                },
            }
        };
        tracing::info!(url = %self.url, frames, ended = ?ended, "listener.monitor_finished");
        MonitorSummary { frames, ended }
    }

    /// Stop the I/O task and wait for it to finish.
    pub async fn close(mut self) {
        self.cancel.cancel();
        // Wakes the task if it is parked on a full queue.
        self.incoming.close();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::debug!(url = %self.url, error = %e, "listener.task_join_failed");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
