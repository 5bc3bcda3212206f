//! Stream decoding driven by in-memory bodies split at arbitrary offsets

use hearth_core::llm::{
    CancelToken, ChunkStream, DeepSeekStreamChunk, FrameStream, Framing, OllamaChatChunk,
    OllamaGenerateChunk, StreamOutcome, UnifiedStreamChunk,
};
use pretty_assertions::assert_eq;
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Body that hands out predefined slices, one per `read` call, and counts
/// how often it was read.
struct ScriptedBody {
    parts: Vec<Vec<u8>>,
    next: usize,
    reads: Arc<AtomicUsize>,
    /// Cancel this token right before serving the given read
    cancel_at: Option<(usize, CancelToken)>,
}

impl ScriptedBody {
    fn new(parts: Vec<Vec<u8>>) -> (Self, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let body = Self {
            parts,
            next: 0,
            reads: Arc::clone(&reads),
            cancel_at: None,
        };
        (body, reads)
    }

    /// Split `data` into pieces of `size` bytes
    fn chunked(data: &str, size: usize) -> (Self, Arc<AtomicUsize>) {
        Self::new(data.as_bytes().chunks(size).map(<[u8]>::to_vec).collect())
    }

    /// One piece per line, newline included
    fn by_line(data: &str) -> (Self, Arc<AtomicUsize>) {
        Self::new(
            data.split_inclusive('\n')
                .map(|l| l.as_bytes().to_vec())
                .collect(),
        )
    }

    fn cancelling_at(mut self, read: usize, token: CancelToken) -> Self {
        self.cancel_at = Some((read, token));
        self
    }
}

impl Read for ScriptedBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, token)) = &self.cancel_at {
            if *at == count {
                token.cancel();
            }
        }

        let Some(part) = self.parts.get(self.next) else {
            return Ok(0);
        };
        assert!(part.len() <= buf.len());
        buf[..part.len()].copy_from_slice(part);
        self.next += 1;
        Ok(part.len())
    }
}

/// Body that fails after serving its data
struct BrokenBody {
    data: Option<Vec<u8>>,
}

impl Read for BrokenBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.data.take() {
            Some(data) => {
                buf[..data.len()].copy_from_slice(&data);
                Ok(data.len())
            }
            None => Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer")),
        }
    }
}

const OLLAMA_BODY: &str = concat!(
    "{\"model\":\"llama3\",\"response\":\"Hé\",\"done\":false}\n",
    "{\"model\":\"llama3\",\"response\":\"llo, \",\"done\":false}\n",
    "{\"model\":\"llama3\",\"response\":\"你好\",\"done\":false}\n",
    "{\"model\":\"llama3\",\"response\":\"\",\"done\":true,\"prompt_eval_count\":4,\"eval_count\":3}\n",
);

fn collect_generate(body: ScriptedBody) -> Vec<UnifiedStreamChunk> {
    let frames: FrameStream<OllamaGenerateChunk, _> =
        FrameStream::new(body, Framing::Ndjson, CancelToken::new());
    frames
        .map(|frame| UnifiedStreamChunk::from(frame.unwrap()))
        .collect()
}

#[test]
fn reassembly_is_independent_of_read_size() {
    let (whole, _) = ScriptedBody::chunked(OLLAMA_BODY, OLLAMA_BODY.len());
    let expected = collect_generate(whole);
    assert_eq!(expected.len(), 4);

    for size in 1..OLLAMA_BODY.len() {
        let (body, _) = ScriptedBody::chunked(OLLAMA_BODY, size);
        assert_eq!(collect_generate(body), expected, "read size {}", size);
    }

    let text: String = expected.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(text, "Héllo, 你好");
    let last = expected.last().unwrap();
    assert!(last.done);
    assert_eq!(last.usage.unwrap().total_tokens, Some(7));
}

#[test]
fn sse_reassembly_is_independent_of_read_size() {
    let body = concat!(
        ": keep-alive\n",
        "data: {\"model\":\"deepseek-chat\",\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\r\n",
        "\r\n",
        "data:{\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n",
        "\n",
        "data: [DONE]\n",
    );

    for size in 1..=body.len() {
        let (reader, _) = ScriptedBody::chunked(body, size);
        let frames: FrameStream<DeepSeekStreamChunk, _> =
            FrameStream::new(reader, Framing::Sse, CancelToken::new());
        let text: String = frames
            .map(|f| f.unwrap().content().to_string())
            .collect();
        assert_eq!(text, "Hi there", "read size {}", size);
    }
}

#[test]
fn ollama_terminal_frame_stops_reading() {
    let body = concat!(
        "{\"response\":\"x\",\"done\":true}\n",
        "{\"response\":\"never\",\"done\":false}\n",
    );
    let (reader, reads) = ScriptedBody::by_line(body);

    let frames: FrameStream<OllamaGenerateChunk, _> =
        FrameStream::new(reader, Framing::Ndjson, CancelToken::new());
    let chunks: Vec<_> = frames.map(|f| UnifiedStreamChunk::from(f.unwrap())).collect();

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, "x");
    assert!(chunks[0].done);
    assert_eq!(reads.load(Ordering::SeqCst), 1);
}

#[test]
fn deepseek_done_sentinel_ends_stream() {
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
        "data: [DONE]\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"after\"}}]}\n",
    );
    let (reader, reads) = ScriptedBody::by_line(body);

    let frames: FrameStream<DeepSeekStreamChunk, _> =
        FrameStream::new(reader, Framing::Sse, CancelToken::new());
    let contents: Vec<String> = frames.map(|f| f.unwrap().content().to_string()).collect();

    assert_eq!(contents, vec!["a".to_string()]);
    assert_eq!(reads.load(Ordering::SeqCst), 2);
}

#[test]
fn deepseek_finish_reason_ends_stream() {
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"a\"},\"finish_reason\":null}]}\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n",
    );
    let (reader, _) = ScriptedBody::by_line(body);
    let cancel = CancelToken::new();
    let frames: FrameStream<DeepSeekStreamChunk, _> =
        FrameStream::new(reader, Framing::Sse, cancel.clone());

    let mut chunks = Vec::new();
    let outcome = ChunkStream::from_frames(frames, cancel)
        .drive(|chunk| chunks.push(chunk))
        .unwrap();

    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(chunks.len(), 2);
    assert!(!chunks[0].done);
    assert!(chunks[1].done);
}

#[test]
fn malformed_record_is_skipped() {
    let body = concat!(
        "{\"message\":{\"role\":\"assistant\",\"content\":\"one\"},\"done\":false}\n",
        "{\"message\": {\"role\": \"assist\n",
        "{\"message\":{\"role\":\"assistant\",\"content\":\"two\"},\"done\":true}\n",
    );
    let (reader, _) = ScriptedBody::chunked(body, 7);

    let frames: FrameStream<OllamaChatChunk, _> =
        FrameStream::new(reader, Framing::Ndjson, CancelToken::new());
    let contents: Vec<String> = frames
        .map(|f| f.unwrap().content().to_string())
        .collect();

    assert_eq!(contents, vec!["one".to_string(), "two".to_string()]);
}

#[test]
fn trailing_line_without_newline_is_processed() {
    let body = concat!(
        "{\"response\":\"a\",\"done\":false}\n",
        "{\"response\":\"b\",\"done\":true}",
    );
    let (reader, _) = ScriptedBody::chunked(body, 5);
    let chunks = collect_generate(reader);

    assert_eq!(chunks.len(), 2);
    assert!(chunks[1].done);
}

#[test]
fn body_ending_without_terminal_frame_completes() {
    let (reader, _) = ScriptedBody::by_line("{\"response\":\"partial\",\"done\":false}\n");
    let cancel = CancelToken::new();
    let frames: FrameStream<OllamaGenerateChunk, _> =
        FrameStream::new(reader, Framing::Ndjson, cancel.clone());

    let mut text = String::new();
    let outcome = ChunkStream::from_frames(frames, cancel)
        .drive(|chunk| text.push_str(&chunk.content))
        .unwrap();

    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(text, "partial");
}

#[test]
fn cancellation_after_two_fragments() {
    let body = concat!(
        "{\"response\":\"Hel\",\"done\":false}\n",
        "{\"response\":\"lo\",\"done\":false}\n",
        "{\"response\":\" world\",\"done\":false}\n",
        "{\"response\":\"\",\"done\":true}\n",
    );
    let cancel = CancelToken::new();
    let (reader, reads) = ScriptedBody::by_line(body);
    let reader = reader.cancelling_at(3, cancel.clone());

    let frames: FrameStream<OllamaGenerateChunk, _> =
        FrameStream::new(reader, Framing::Ndjson, cancel.clone());

    let mut text = String::new();
    let outcome = ChunkStream::from_frames(frames, cancel)
        .drive(|chunk| text.push_str(&chunk.content))
        .unwrap();

    assert_eq!(outcome, StreamOutcome::Cancelled);
    assert_eq!(text, "Hello");
    assert_eq!(reads.load(Ordering::SeqCst), 3);
}

#[test]
fn cancelled_before_start_reads_nothing() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let (reader, reads) = ScriptedBody::by_line(OLLAMA_BODY);

    let frames: FrameStream<OllamaGenerateChunk, _> =
        FrameStream::new(reader, Framing::Ndjson, cancel.clone());
    let outcome = ChunkStream::from_frames(frames, cancel)
        .drive(|_| panic!("no chunk expected"))
        .unwrap();

    assert_eq!(outcome, StreamOutcome::Cancelled);
    assert_eq!(reads.load(Ordering::SeqCst), 0);
}

#[test]
fn connection_reset_mid_stream_is_an_error() {
    let reader = BrokenBody {
        data: Some(b"{\"response\":\"a\",\"done\":false}\n".to_vec()),
    };
    let cancel = CancelToken::new();
    let frames: FrameStream<OllamaGenerateChunk, _> =
        FrameStream::new(reader, Framing::Ndjson, cancel.clone());

    let mut seen = Vec::new();
    let err = ChunkStream::from_frames(frames, cancel)
        .drive(|chunk| seen.push(chunk.content))
        .unwrap_err();

    assert_eq!(seen, vec!["a".to_string()]);
    assert!(err.to_string().contains("reset by peer"));
}

#[test]
fn in_band_error_frame_ends_stream() {
    let body = concat!(
        "{\"response\":\"a\",\"done\":false}\n",
        "{\"error\":\"model 'nope' not found\"}\n",
        "{\"response\":\"b\",\"done\":true}\n",
    );
    let (reader, _) = ScriptedBody::by_line(body);
    let frames: FrameStream<OllamaGenerateChunk, _> =
        FrameStream::new(reader, Framing::Ndjson, CancelToken::new());

    let results: Vec<_> = frames.collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(results[1]
        .as_ref()
        .unwrap_err()
        .to_string()
        .contains("not found"));
}
