//! Helpers shared by the streaming providers: turning a byte stream into lines,
//! accumulating streamed text while echoing it to an observer, and reassembling
//! tool calls that arrive in fragments.
use anyhow::Result;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::ops::ControlFlow;

use super::base::ContentObserver;
use crate::models::tool::ToolCallRequest;

/// Printed to the observer before the first piece of content of a turn
pub const STREAM_START_MARKER: &str = "\n🔍 ";

/// Accumulates the streamed text of one turn.
///
/// The accumulated string is the source of truth for the assembled message, the
/// observer only sees a copy of each delta.
pub struct StreamCollector<'a> {
    observer: Option<&'a ContentObserver>,
    content: String,
    started: bool,
}

impl<'a> StreamCollector<'a> {
    pub fn new(observer: Option<&'a ContentObserver>) -> Self {
        Self {
            observer,
            content: String::new(),
            started: false,
        }
    }

    pub fn push(&mut self, delta: &str) {
        if delta.is_empty() {
            return;
        }
        if !self.started {
            self.started = true;
            self.emit(STREAM_START_MARKER);
        }
        self.content.push_str(delta);
        self.emit(delta);
    }

    /// Close the visual block and hand back everything that was streamed
    pub fn finish(self) -> String {
        if self.started {
            self.emit("\n");
        }
        self.content
    }

    fn emit(&self, text: &str) {
        if let Some(observer) = self.observer {
            observer(text);
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct PartialToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Reassembles tool calls from indexed fragments.
///
/// Every field of a fragment is appended to whatever already arrived for the same
/// index. Indices may arrive in any order and with gaps; calls come out sorted by index.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<usize, PartialToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &mut self,
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) {
        let call = self.calls.entry(index).or_default();
        if let Some(id) = id {
            call.id.push_str(id);
        }
        if let Some(name) = name {
            call.name.push_str(name);
        }
        if let Some(arguments) = arguments {
            call.arguments.push_str(arguments);
        }
    }

    /// Finalize into complete requests. Fragments without a name are dropped, and a
    /// call that never received an id gets a generated one so its result can be linked.
    pub fn finish(self) -> Vec<ToolCallRequest> {
        self.calls
            .into_values()
            .filter(|call| !call.name.is_empty())
            .map(|call| {
                let id = if call.id.is_empty() {
                    format!("call_{}", uuid::Uuid::new_v4().simple())
                } else {
                    call.id
                };
                ToolCallRequest::new(id, call.name, call.arguments)
            })
            .collect()
    }
}

/// Splits a byte stream into lines, holding back partial lines (and partial UTF-8
/// sequences) until the rest arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&line[..line.len() - 1]));
        }
        lines
    }

    /// Whatever is left once the stream ends without a trailing newline
    pub fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(decode_line(&self.pending))
        }
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\r')
        .to_string()
}

/// Feed every line of a streaming response body to `on_line` until it breaks or the
/// body ends.
pub async fn for_each_line<F>(response: reqwest::Response, mut on_line: F) -> Result<()>
where
    F: FnMut(&str) -> Result<ControlFlow<()>>,
{
    let mut body = response.bytes_stream();
    let mut buffer = LineBuffer::default();

    while let Some(chunk) = body.next().await {
        for line in buffer.push(&chunk?) {
            if on_line(&line)?.is_break() {
                return Ok(());
            }
        }
    }

    if let Some(line) = buffer.finish() {
        on_line(&line)?;
    }
    Ok(())
}

/// The payload of a server-sent event `data:` line
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}
