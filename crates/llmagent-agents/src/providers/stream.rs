use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use llmagent_common::Result;

use super::{EventStream, StreamEvent};

/// Stateful per-provider parser fed one line at a time.
pub(crate) trait LineDecoder: Send + 'static {
    fn decode_line(&mut self, line: &str) -> Result<Vec<StreamEvent>>;

    /// True once the provider signalled the end of the stream.
    fn finished(&self) -> bool {
        false
    }
}

/// Payload of an SSE `data:` line.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

struct LineState<D> {
    body: BoxStream<'static, Result<Bytes>>,
    buffer: Vec<u8>,
    decoder: D,
    pending: VecDeque<StreamEvent>,
    exhausted: bool,
}

impl<D: LineDecoder> LineState<D> {
    fn feed(&mut self, raw: &[u8]) -> Result<()> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok(());
        }
        let events = self.decoder.decode_line(line)?;
        self.pending.extend(events);
        Ok(())
    }
}

/// Split a byte stream on newlines and run every line through `decoder`.
pub(crate) fn decode_lines<D: LineDecoder>(
    body: BoxStream<'static, Result<Bytes>>,
    decoder: D,
) -> EventStream {
    let state = LineState {
        body,
        buffer: Vec::new(),
        decoder,
        pending: VecDeque::new(),
        exhausted: false,
    };

    stream::try_unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Ok(Some((event, state)));
            }
            if state.exhausted || state.decoder.finished() {
                return Ok(None);
            }

            if let Some(pos) = state.buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                state.feed(&line)?;
                continue;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(e),
                None => {
                    state.exhausted = true;
                    if !state.buffer.is_empty() {
                        let rest = std::mem::take(&mut state.buffer);
                        state.feed(&rest)?;
                    }
                }
            }
        }
    })
    .boxed()
}
