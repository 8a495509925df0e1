//! Incremental decoder for the server-sent events wire format.
//!
//! Fed raw byte chunks as they arrive from the transport; dispatches an
//! event for every blank line per the EventSource processing model. Handles
//! chunk boundaries anywhere, including inside a CRLF pair or a multi-byte
//! character.

/// A dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name; "message" when the stream did not set one
    pub name: String,
    /// Data lines joined with newlines
    pub data: String,
    /// Last event id seen on the stream, if any
    pub id: Option<String>,
}

const DEFAULT_EVENT: &str = "message";

#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    event_name: String,
    data: String,
    last_id: Option<String>,
    pending_cr: bool,
    at_start: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            at_start: true,
            ..Self::default()
        }
    }

    /// Feed one chunk, returning every event it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();

        for &byte in chunk {
            if self.pending_cr {
                self.pending_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }

            match byte {
                b'\r' => {
                    self.pending_cr = true;
                    self.complete_line(&mut events);
                }
                b'\n' => self.complete_line(&mut events),
                _ => self.line.push(byte),
            }
        }

        events
    }

    fn complete_line(&mut self, events: &mut Vec<SseEvent>) {
        let raw = std::mem::take(&mut self.line);
        let mut line = String::from_utf8_lossy(&raw).into_owned();

        if self.at_start {
            self.at_start = false;
            if let Some(stripped) = line.strip_prefix('\u{feff}') {
                line = stripped.to_string();
            }
        }

        if line.is_empty() {
            self.dispatch(events);
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_str(), ""),
        };

        match field {
            "event" => self.event_name = value.to_string(),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "id" => {
                if !value.contains('\0') {
                    self.last_id = Some(value.to_string());
                }
            }
            // retry intervals are irrelevant without auto-reconnect
            _ => {}
        }
    }

    fn dispatch(&mut self, events: &mut Vec<SseEvent>) {
        let name = std::mem::take(&mut self.event_name);
        let mut data = std::mem::take(&mut self.data);

        // Events without data are dropped per the processing model
        if data.is_empty() {
            return;
        }
        data.pop();

        events.push(SseEvent {
            name: if name.is_empty() {
                DEFAULT_EVENT.to_string()
            } else {
                name
            },
            data,
            id: self.last_id.clone(),
        });
    }
}
