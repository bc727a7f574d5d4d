use futures::StreamExt;
use tokio::sync::mpsc;

use super::models::WireMessage;
use crate::gateway::types::GatewayError;
use crate::models::Message;

/// Incremental server-sent-events decoder. Feed it raw bytes, get back the
/// `data:` payloads of every event completed so far.
#[derive(Debug, Default)]
pub struct SseDecoder {
    byte_buf: Vec<u8>,
    buffer: String,
}

impl SseDecoder {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.byte_buf.extend_from_slice(bytes);

        // Decode as much valid UTF-8 as possible; keep a split code point for the next chunk.
        let valid_up_to = match std::str::from_utf8(&self.byte_buf) {
            Ok(_) => self.byte_buf.len(),
            Err(e) => e.valid_up_to(),
        };
        if valid_up_to > 0 {
            self.buffer
                .push_str(&String::from_utf8_lossy(&self.byte_buf[..valid_up_to]));
            self.byte_buf.drain(..valid_up_to);
        }
        // Normalise the whole buffer so a CRLF split across chunks still pairs up.
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut payloads = Vec::new();
        while let Some(event_end) = self.buffer.find("\n\n") {
            let event_text = self.buffer[..event_end].to_string();
            self.buffer.drain(..event_end + 2);

            let mut data = String::new();
            for line in event_text.lines() {
                if let Some(payload) = line.strip_prefix("data:") {
                    if !data.is_empty() {
                        data.push('\n');
                    }
                    data.push_str(payload.strip_prefix(' ').unwrap_or(payload));
                }
            }

            if !data.is_empty() {
                payloads.push(data);
            }
        }
        payloads
    }
}

pub fn decode_push_payload(data: &str) -> Result<Message, GatewayError> {
    let wire: WireMessage = serde_json::from_str(data)
        .map_err(|e| GatewayError::InvalidResponse(format!("Bad push payload: {}", e)))?;
    wire.into_message(None)
}

/// Pump an event-stream response into `tx` until the body ends or the receiver goes away.
pub async fn forward_sse_stream(
    response: reqwest::Response,
    tx: mpsc::Sender<Result<Message, GatewayError>>,
) {
    let mut stream = response.bytes_stream();
    let mut decoder = SseDecoder::default();

    while let Some(chunk_result) = stream.next().await {
        let bytes = match chunk_result {
            Ok(b) => b,
            Err(e) => {
                let _ = tx
                    .send(Err(GatewayError::Channel(format!("Stream error: {}", e))))
                    .await;
                return;
            }
        };

        for data in decoder.feed(&bytes) {
            // A malformed event is reported but does not end the subscription.
            if tx.send(decode_push_payload(&data)).await.is_err() {
                return; // receiver dropped
            }
        }
    }

    tracing::info!("Push event stream closed by server");
}
