//! Server-Sent-Events framing for the FAST/AGENT adapters' OpenAI-compatible
//! streaming wire format: `data: {...}\n\n` frames terminated by `data: [DONE]`.

use serde::Deserialize;

/// One parsed delta from an SSE chunk's `choices[0].delta.content`.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Delta(String),
    Done,
}

#[derive(Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<ChunkUsage>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Clone, Copy)]
pub struct ChunkUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Incrementally parses raw SSE byte chunks into [`SseEvent`]s plus the
/// trailing usage block some providers emit on the final chunk.
#[derive(Default)]
pub struct SseParser {
    buffer: String,
    pub last_usage: Option<ChunkUsage>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from the HTTP response body; returns any complete
    /// events found so far.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find("\n\n") {
            let frame = self.buffer[..pos].to_string();
            self.buffer.drain(..pos + 2);
            if let Some(event) = self.parse_frame(&frame) {
                events.push(event);
            }
        }
        events
    }

    fn parse_frame(&mut self, frame: &str) -> Option<SseEvent> {
        for line in frame.lines() {
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                return Some(SseEvent::Done);
            }
            match serde_json::from_str::<ChatCompletionChunk>(data) {
                Ok(parsed) => {
                    if let Some(usage) = parsed.usage {
                        self.last_usage = Some(usage);
                    }
                    let content = parsed
                        .choices
                        .first()
                        .and_then(|c| c.delta.content.clone())
                        .unwrap_or_default();
                    if !content.is_empty() {
                        return Some(SseEvent::Delta(content));
                    }
                }
                Err(_) => continue,
            }
        }
        None
    }
}
