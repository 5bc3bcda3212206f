//! Typed frame streams and the unified chunk stream

use super::framing::{Framing, Record, RecordReader};
use super::{CancelToken, LlmError, StreamOutcome, UnifiedStreamChunk};
use serde::de::DeserializeOwned;
use std::io::Read;
use std::marker::PhantomData;

/// Body reader type handed out by the HTTP layer
pub type BodyReader = Box<dyn Read + Send>;

/// A provider-native streaming frame
pub trait StreamFrame: DeserializeOwned {
    /// Whether this frame ends the stream
    fn is_terminal(&self) -> bool;

    /// Error reported in-band by the backend, if any
    fn error_message(&self) -> Option<String> {
        None
    }
}

/// Lazily decodes provider-native frames from a response body.
///
/// Records that fail to parse are logged and skipped. After a terminal frame,
/// a `[DONE]` sentinel, a transport error or cancellation the stream is
/// finished and never touches the body again.
pub struct FrameStream<F, R = BodyReader> {
    records: RecordReader<R>,
    finished: bool,
    _frame: PhantomData<fn() -> F>,
}

impl<F: StreamFrame, R: Read> FrameStream<F, R> {
    pub fn new(reader: R, framing: Framing, cancel: CancelToken) -> Self {
        Self {
            records: RecordReader::new(reader, framing, cancel),
            finished: false,
            _frame: PhantomData,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.records.cancel_token().is_cancelled()
    }

    /// Feed every frame to `on_frame` in arrival order
    pub fn drive(self, mut on_frame: impl FnMut(F)) -> Result<StreamOutcome, LlmError> {
        let cancel = self.records.cancel_token().clone();
        for frame in self {
            on_frame(frame?);
        }
        Ok(outcome_of(&cancel))
    }
}

impl<F: StreamFrame, R: Read> Iterator for FrameStream<F, R> {
    type Item = Result<F, LlmError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let data = match self.records.next() {
                None | Some(Ok(Record::Done)) => {
                    self.finished = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                Some(Ok(Record::Data(data))) => data,
            };

            match serde_json::from_str::<F>(&data) {
                Ok(frame) => {
                    if let Some(message) = frame.error_message() {
                        self.finished = true;
                        return Some(Err(LlmError::Remote(message)));
                    }
                    if frame.is_terminal() {
                        self.finished = true;
                    }
                    return Some(Ok(frame));
                }
                Err(e) => {
                    tracing::warn!(error = %e, record = %data, "skipping malformed stream record");
                }
            }
        }
    }
}

fn outcome_of(cancel: &CancelToken) -> StreamOutcome {
    if cancel.is_cancelled() {
        StreamOutcome::Cancelled
    } else {
        StreamOutcome::Completed
    }
}

/// Finite, non-restartable sequence of normalized chunks.
///
/// Ends early, without an error item, when its cancel token is triggered.
pub struct ChunkStream {
    inner: Box<dyn Iterator<Item = Result<UnifiedStreamChunk, LlmError>> + Send>,
    cancel: CancelToken,
}

impl ChunkStream {
    pub fn new<I>(inner: I, cancel: CancelToken) -> Self
    where
        I: Iterator<Item = Result<UnifiedStreamChunk, LlmError>> + Send + 'static,
    {
        Self {
            inner: Box::new(inner),
            cancel,
        }
    }

    /// Map a native frame stream into unified chunks
    pub fn from_frames<F, R>(frames: FrameStream<F, R>, cancel: CancelToken) -> Self
    where
        F: StreamFrame + Into<UnifiedStreamChunk> + 'static,
        R: Read + Send + 'static,
    {
        Self::new(frames.map(|frame| frame.map(Into::into)), cancel)
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Callback form: invoke `on_chunk` for every chunk, in order
    pub fn drive(
        self,
        mut on_chunk: impl FnMut(UnifiedStreamChunk),
    ) -> Result<StreamOutcome, LlmError> {
        let cancel = self.cancel.clone();
        for chunk in self {
            on_chunk(chunk?);
        }
        Ok(outcome_of(&cancel))
    }
}

impl Iterator for ChunkStream {
    type Item = Result<UnifiedStreamChunk, LlmError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.inner.next()
    }
}

impl std::fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStream")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Cursor;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Frame {
        text: String,
        #[serde(default)]
        last: bool,
        #[serde(default)]
        error: Option<String>,
    }

    impl StreamFrame for Frame {
        fn is_terminal(&self) -> bool {
            self.last
        }

        fn error_message(&self) -> Option<String> {
            self.error.clone()
        }
    }

    impl From<Frame> for UnifiedStreamChunk {
        fn from(frame: Frame) -> Self {
            UnifiedStreamChunk {
                content: frame.text,
                done: frame.last,
                ..Default::default()
            }
        }
    }

    fn frames(body: &'static str) -> FrameStream<Frame, Cursor<&'static str>> {
        FrameStream::new(Cursor::new(body), Framing::Ndjson, CancelToken::new())
    }

    #[test]
    fn test_terminal_frame_stops_stream() {
        let body = "{\"text\":\"a\"}\n{\"text\":\"b\",\"last\":true}\n{\"text\":\"never\"}\n";
        let texts: Vec<String> = frames(body).map(|f| f.unwrap().text).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn test_in_band_error_ends_stream() {
        let body = "{\"text\":\"a\"}\n{\"text\":\"\",\"error\":\"model not found\"}\n{\"text\":\"c\"}\n";
        let items: Vec<_> = frames(body).collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1], Err(LlmError::Remote("model not found".into())));
    }

    #[test]
    fn test_chunk_stream_drive_reports_completion() {
        let cancel = CancelToken::new();
        let stream = ChunkStream::from_frames(
            FrameStream::<Frame, _>::new(
                Cursor::new("{\"text\":\"x\",\"last\":true}\n"),
                Framing::Ndjson,
                cancel.clone(),
            ),
            cancel,
        );

        let mut seen = Vec::new();
        let outcome = stream.drive(|chunk| seen.push(chunk)).unwrap();
        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(seen.len(), 1);
        assert!(seen[0].done);
    }

    #[test]
    fn test_chunk_stream_stops_when_cancelled_by_consumer() {
        let cancel = CancelToken::new();
        let body = "{\"text\":\"a\"}\n{\"text\":\"b\"}\n{\"text\":\"c\"}\n";
        let stream = ChunkStream::from_frames(
            FrameStream::<Frame, _>::new(Cursor::new(body), Framing::Ndjson, cancel.clone()),
            cancel.clone(),
        );

        let mut seen = String::new();
        let outcome = stream
            .drive(|chunk| {
                seen.push_str(&chunk.content);
                if seen.len() == 2 {
                    cancel.cancel();
                }
            })
            .unwrap();

        assert_eq!(outcome, StreamOutcome::Cancelled);
        assert_eq!(seen, "ab");
    }
}
