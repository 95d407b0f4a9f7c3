use crate::AppState;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use events::BroadcastEvent;
use fanout::{Error as FanoutError, ViewerConnection};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use log::*;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Write half of a viewer's websocket.
struct WsViewer {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait]
impl ViewerConnection for WsViewer {
    async fn send(&self, event: &BroadcastEvent) -> Result<(), FanoutError> {
        self.sink
            .lock()
            .await
            .send(frame(event))
            .await
            .map_err(FanoutError::write_failed)
    }

    async fn close(&self) {
        if let Err(e) = self.sink.lock().await.close().await {
            debug!("Error while closing viewer websocket: {e}");
        }
    }
}

/// JSON payloads go out as text frames; anything else as binary.
fn frame(event: &BroadcastEvent) -> Message {
    match String::from_utf8(event.as_bytes().to_vec()) {
        Ok(text) => Message::Text(text),
        Err(e) => Message::Binary(e.into_bytes()),
    }
}

/// Upgrades the request to a websocket and registers it as a live viewer.
pub(crate) async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_viewer(socket, app_state))
}

async fn handle_viewer(socket: WebSocket, app_state: AppState) {
    let (sink, mut stream) = socket.split();
    let viewer = Arc::new(WsViewer {
        sink: Mutex::new(sink),
    });
    let connection_id = app_state.fanout.register_connection(viewer.clone());

    // Inbound frames are raw triggers for the broadcast loop.
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => app_state.fanout.submit(BroadcastEvent::new(text)),
            Ok(Message::Binary(bytes)) => app_state.fanout.submit(BroadcastEvent::new(bytes)),
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                debug!("Viewer {} read failed: {e}", connection_id.as_str());
                break;
            }
        }
    }

    app_state.fanout.unregister_connection(&connection_id);
    viewer.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_payloads_become_text_frames() {
        let event = BroadcastEvent::new(br#"{"id":1}"#.to_vec());

        assert_eq!(frame(&event), Message::Text(r#"{"id":1}"#.to_string()));
    }

    #[test]
    fn other_payloads_become_binary_frames() {
        let event = BroadcastEvent::new(vec![0xff, 0xfe]);

        assert_eq!(frame(&event), Message::Binary(vec![0xff, 0xfe]));
    }
}
