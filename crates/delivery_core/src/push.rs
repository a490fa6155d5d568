use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{stream::SplitSink, SinkExt, StreamExt};
use shared::protocol::{PushCommand, RawPushEvent};
use tokio::{
    net::TcpStream,
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

/// Group membership on the realtime channel. Events themselves arrive on the
/// receiver handed out when the channel is created.
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn join_group(&self, group: &str) -> Result<()>;
    async fn leave_group(&self, group: &str) -> Result<()>;
}

pub struct MissingPushChannel;

#[async_trait]
impl PushChannel for MissingPushChannel {
    async fn join_group(&self, _group: &str) -> Result<()> {
        Err(anyhow!("push channel is unavailable"))
    }

    async fn leave_group(&self, _group: &str) -> Result<()> {
        Err(anyhow!("push channel is unavailable"))
    }
}

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

pub struct WsPushChannel {
    writer: Mutex<WsWriter>,
    reader: JoinHandle<()>,
}

impl WsPushChannel {
    /// Connects to `url` and starts forwarding decoded frames to the returned
    /// receiver. Frames that do not decode are dropped with a warning.
    pub async fn connect(
        url: &str,
        buffer: usize,
    ) -> Result<(Arc<Self>, mpsc::Receiver<RawPushEvent>)> {
        let (ws_stream, _) = connect_async(url)
            .await
            .with_context(|| format!("failed to connect push channel: {url}"))?;
        let (writer, mut ws_reader) = ws_stream.split();
        let (tx, rx) = mpsc::channel(buffer.max(1));

        let reader = tokio::spawn(async move {
            while let Some(frame) = ws_reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<RawPushEvent>(&text) {
                        Ok(event) => {
                            if tx.send(event).await.is_err() {
                                debug!("push: receiver dropped, stopping reader");
                                break;
                            }
                        }
                        Err(err) => warn!(error = %err, "push: dropping undecodable frame"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "push: socket error");
                        break;
                    }
                }
            }
            info!("push: reader stopped");
        });

        info!(url, "push: connected");
        Ok((
            Arc::new(Self {
                writer: Mutex::new(writer),
                reader,
            }),
            rx,
        ))
    }

    async fn send_command(&self, command: &PushCommand) -> Result<()> {
        let frame = serde_json::to_string(command).context("failed to encode push command")?;
        self.writer
            .lock()
            .await
            .send(Message::Text(frame))
            .await
            .context("failed to write push command")
    }
}

impl Drop for WsPushChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl PushChannel for WsPushChannel {
    async fn join_group(&self, group: &str) -> Result<()> {
        self.send_command(&PushCommand::Join {
            group: group.to_string(),
        })
        .await
    }

    async fn leave_group(&self, group: &str) -> Result<()> {
        self.send_command(&PushCommand::Leave {
            group: group.to_string(),
        })
        .await
    }
}

#[cfg(test)]
#[path = "tests/push_tests.rs"]
mod tests;
