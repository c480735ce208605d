//! WebSocket transport over tokio-tungstenite
//!
//! Each connect spawns a socket task on the supplied runtime handle. The task
//! reports through the [`TransportSink`] and takes outbound frames from an
//! unbounded channel, so the synchronous [`SocketTransport`] calls never block.

use futures::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::mailbox::TransportSink;
use crate::transport::{opcode, DataFrame, SocketTransport};

enum Outbound {
    Text(String),
    Close,
}

pub struct WebSocketTransport {
    handle: Handle,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    task: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            outbound: None,
            task: None,
        }
    }

    /// Transport bound to the runtime of the calling task
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl SocketTransport for WebSocketTransport {
    fn connect(&mut self, url: &str, sink: TransportSink) -> Result<(), TransportError> {
        self.close();
        let (tx, rx) = mpsc::unbounded_channel();
        self.outbound = Some(tx);
        self.task = Some(self.handle.spawn(run_socket(url.to_string(), sink, rx)));
        Ok(())
    }

    fn send_text(&mut self, frame: &str) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::NotConnected)?;
        outbound
            .send(Outbound::Text(frame.to_string()))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(Outbound::Close);
        }
        // The task exits on its own once it has sent the close frame
        self.task = None;
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_socket(url: String, sink: TransportSink, mut outbound: mpsc::UnboundedReceiver<Outbound>) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            sink.on_error(e.to_string());
            sink.on_disconnected();
            return;
        }
    };
    sink.on_connected();
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        sink.on_error(e.to_string());
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => sink.on_data(DataFrame::text(&text)),
                Some(Ok(Message::Binary(data))) => {
                    sink.on_data(DataFrame::complete(opcode::BINARY, &data))
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = write.send(Message::Pong(data)).await {
                        debug!(error = %e, "Pong send failed");
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let mut payload = Vec::new();
                    if let Some(frame) = frame {
                        payload.extend_from_slice(&u16::from(frame.code).to_be_bytes());
                        payload.extend_from_slice(frame.reason.as_bytes());
                    }
                    sink.on_data(DataFrame::complete(opcode::CLOSE, &payload));
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket read failed");
                    sink.on_error(e.to_string());
                    break;
                }
                None => break,
            },
        }
    }
    sink.on_disconnected();
}
