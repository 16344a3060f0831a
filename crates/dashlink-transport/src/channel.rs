use async_trait::async_trait;
use dashlink_core::{BridgeError, ChannelConnector, MessageStream, Result};
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use url::Url;

/// Opens engine streams over tokio-tungstenite; yields text payloads only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl ChannelConnector for TungsteniteConnector {
    async fn open(&self, url: &Url) -> Result<MessageStream> {
        let (ws_stream, _) = connect_async(url.as_str()).await.map_err(|err| {
            BridgeError::backend(format!("failed to connect to websocket {url}: {err}"))
        })?;
        tracing::debug!(%url, "engine stream connected");
        let frames = ws_stream.filter_map(|item| async move {
            match item {
                Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                Ok(Message::Binary(bytes)) => Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
                Ok(_) => None,
                Err(err) => Some(Err(BridgeError::backend(format!("engine stream: {err}")))),
            }
        });
        Ok(frames.boxed())
    }
}
