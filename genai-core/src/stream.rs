//! Streaming primitives for generate-content calls.
//!
//! Contract:
//! - A streaming call produces a single-use, ordered, finite chunk stream plus
//!   a final-response handle that resolves exactly once with the merged result.
//! - The handle resolves whether or not the caller consumes the chunk stream:
//!   a pump task forwards chunks to the caller while accumulating them.
//! - Chunk order is preserved end to end; chunks are never duplicated or
//!   reordered. An error mid-stream surfaces on both the chunk stream (at the
//!   point it occurred) and the handle, and no partial final response exists.

use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};

use crate::content::{
    Candidate, Content, FinishReason, GenerateContentResponse, Part, PromptFeedback, Role,
    SafetyRating, UsageMetadata,
};
use crate::error::{CoreResult, GenAiError};

/// Boxed chunk stream. Single-pass: each chunk can be pulled at most once, in
/// arrival order; once exhausted it yields nothing further.
pub type ResponseStream =
    std::pin::Pin<Box<dyn futures_util::stream::Stream<Item = CoreResult<GenerateContentResponse>> + Send>>;

/// Resolves once with the merged final response of a streaming call, or with
/// the error that ended the stream.
pub struct FinalHandle {
    rx: oneshot::Receiver<CoreResult<GenerateContentResponse>>,
}

impl FinalHandle {
    pub async fn resolve(self) -> CoreResult<GenerateContentResponse> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(GenAiError::Other(anyhow::anyhow!(
                "stream ended without a final response"
            ))),
        }
    }
}

/// What a streaming call returns: the lazily-consumed chunk stream and the
/// independently-resolving final response.
pub struct StreamResult {
    pub stream: ResponseStream,
    pub response: FinalHandle,
}

impl StreamResult {
    /// Wrap a raw chunk source. Spawns a pump that pulls the source to
    /// exhaustion, forwarding every chunk to the caller-facing stream while
    /// accumulating the merged final response. The caller dropping its stream
    /// does not stop accumulation.
    pub fn drive(source: ResponseStream) -> StreamResult {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let (final_tx, final_rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut source = source;
            let mut seen: Vec<GenerateContentResponse> = Vec::new();
            let mut failure: Option<GenAiError> = None;
            while let Some(item) = source.next().await {
                match item {
                    Ok(chunk) => {
                        seen.push(chunk.clone());
                        // Send failure means the caller dropped its stream;
                        // keep pulling so the final handle still resolves.
                        let _ = chunk_tx.send(Ok(chunk));
                    }
                    Err(e) => {
                        let _ = chunk_tx.send(Err(e.fanout_copy()));
                        failure = Some(e);
                        break;
                    }
                }
            }
            let result = match failure {
                None => Ok(merge_chunks(&seen)),
                Some(e) => Err(e),
            };
            let _ = final_tx.send(result);
        });

        let stream: ResponseStream = Box::pin(futures_util::stream::unfold(
            chunk_rx,
            |mut rx| async move { rx.recv().await.map(|item| (item, rx)) },
        ));
        StreamResult {
            stream,
            response: FinalHandle { rx: final_rx },
        }
    }
}

/// Merge streamed chunks into one final response.
///
/// Per candidate index: text parts concatenate in arrival order into a single
/// text part, non-text parts are carried through in order, finish reason and
/// safety ratings come from the last chunk that set them. Prompt feedback is
/// taken from the first chunk that carried it, usage metadata from the last.
pub fn merge_chunks(chunks: &[GenerateContentResponse]) -> GenerateContentResponse {
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct CandidateAcc {
        role: Option<Role>,
        text: String,
        extra_parts: Vec<Part>,
        finish_reason: Option<FinishReason>,
        safety_ratings: Option<Vec<SafetyRating>>,
    }

    let mut by_index: BTreeMap<u32, CandidateAcc> = BTreeMap::new();
    let mut prompt_feedback: Option<PromptFeedback> = None;
    let mut usage_metadata: Option<UsageMetadata> = None;

    for chunk in chunks {
        if prompt_feedback.is_none() {
            prompt_feedback = chunk.prompt_feedback.clone();
        }
        if chunk.usage_metadata.is_some() {
            usage_metadata = chunk.usage_metadata;
        }
        for (pos, cand) in chunk.candidates.iter().flatten().enumerate() {
            let idx = cand.index.unwrap_or(pos as u32);
            let acc = by_index.entry(idx).or_default();
            if let Some(content) = &cand.content {
                if acc.role.is_none() {
                    acc.role = content.role;
                }
                for part in &content.parts {
                    match part {
                        Part::Text(t) => acc.text.push_str(t),
                        other => acc.extra_parts.push(other.clone()),
                    }
                }
            }
            if cand.finish_reason.is_some() {
                acc.finish_reason = cand.finish_reason;
            }
            if cand.safety_ratings.is_some() {
                acc.safety_ratings = cand.safety_ratings.clone();
            }
        }
    }

    let candidates: Vec<Candidate> = by_index
        .into_iter()
        .map(|(idx, acc)| {
            let mut parts = Vec::with_capacity(1 + acc.extra_parts.len());
            if !acc.text.is_empty() {
                parts.push(Part::Text(acc.text));
            }
            parts.extend(acc.extra_parts);
            Candidate {
                content: Some(Content {
                    role: acc.role.or(Some(Role::Model)),
                    parts,
                }),
                finish_reason: acc.finish_reason,
                index: Some(idx),
                safety_ratings: acc.safety_ratings,
            }
        })
        .collect();

    GenerateContentResponse {
        candidates: if candidates.is_empty() {
            None
        } else {
            Some(candidates)
        },
        prompt_feedback,
        usage_metadata,
    }
}

type DataFn = Box<dyn FnMut(&str) + Send + 'static>;
type DoneFn = Box<dyn FnOnce(&str) + Send + 'static>;

/// Optional per-call progress hooks. `on_data` receives each chunk's text
/// increment in arrival order; `on_done` fires at most once with the full
/// concatenated text.
#[derive(Default)]
pub struct StreamCallbacks {
    on_data: Option<DataFn>,
    on_done: Option<DoneFn>,
}

impl StreamCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_data(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_data = Some(Box::new(f));
        self
    }

    pub fn on_done(mut self, f: impl FnOnce(&str) + Send + 'static) -> Self {
        self.on_done = Some(Box::new(f));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.on_data.is_none() && self.on_done.is_none()
    }
}

/// Attach callbacks to a `StreamResult` without changing its observable
/// chunks, ordering, or final text.
///
/// - Neither callback: the input is returned unchanged.
/// - `on_data` set (with or without `on_done`): the stream is replaced by a
///   pull-driven wrapper that extracts each chunk's text, accumulates it,
///   invokes `on_data`, and re-emits the chunk unchanged. `on_done` fires once
///   with the accumulated text when the wrapper observes exhaustion; if the
///   caller stops pulling, `on_done` never fires in this branch.
/// - Only `on_done`: the stream is left untouched and `on_done` is attached to
///   the final-response handle instead, firing with the final full text even
///   if the caller never iterates the stream.
///
/// The two completion paths are intentionally asymmetric: exhaustion-tracking
/// keeps the `on_data` branch strictly pull-driven, while the handle-tracking
/// branch rides the pump that already runs regardless of iteration.
///
/// Errors pass through untouched; `on_done` only ever fires after a clean end
/// of stream.
pub fn wrap(result: StreamResult, callbacks: StreamCallbacks) -> StreamResult {
    let StreamCallbacks { on_data, on_done } = callbacks;
    match (on_data, on_done) {
        (None, None) => result,
        (Some(on_data), on_done) => {
            let stream: ResponseStream = Box::pin(CallbackStream {
                inner: result.stream,
                on_data,
                on_done,
                acc: String::new(),
                errored: false,
                finished: false,
            });
            StreamResult {
                stream,
                response: result.response,
            }
        }
        (None, Some(on_done)) => {
            let (tx, rx) = oneshot::channel();
            let inner = result.response;
            tokio::spawn(async move {
                let outcome = inner.resolve().await;
                if let Ok(final_response) = &outcome {
                    on_done(&final_response.text());
                }
                let _ = tx.send(outcome);
            });
            StreamResult {
                stream: result.stream,
                response: FinalHandle { rx },
            }
        }
    }
}

/// Pull-driven wrapper adding per-chunk and exhaustion side effects. Only the
/// consumer drives it; it never pulls the underlying stream on its own.
struct CallbackStream {
    inner: ResponseStream,
    on_data: DataFn,
    on_done: Option<DoneFn>,
    acc: String,
    errored: bool,
    finished: bool,
}

impl futures_util::stream::Stream for CallbackStream {
    type Item = CoreResult<GenerateContentResponse>;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::task::Poll;
        let this = self.get_mut();
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                let increment = chunk.text();
                this.acc.push_str(&increment);
                (this.on_data)(&increment);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.errored = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if !this.finished {
                    this.finished = true;
                    // Completion implies success: a stream that errored does
                    // not get a done callback.
                    if !this.errored
                        && let Some(done) = this.on_done.take()
                    {
                        done(&this.acc);
                    }
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Candidate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn chunk(text: &str) -> GenerateContentResponse {
        GenerateContentResponse {
            candidates: Some(vec![Candidate {
                content: Some(Content {
                    role: Some(Role::Model),
                    parts: vec![Part::text(text)],
                }),
                finish_reason: None,
                index: Some(0),
                safety_ratings: None,
            }]),
            prompt_feedback: None,
            usage_metadata: None,
        }
    }

    fn source_of(texts: &[&str]) -> ResponseStream {
        let items: Vec<CoreResult<GenerateContentResponse>> =
            texts.iter().map(|t| Ok(chunk(t))).collect();
        Box::pin(futures_util::stream::iter(items))
    }

    fn failing_source(texts: &[&str], err: GenAiError) -> ResponseStream {
        let mut items: Vec<CoreResult<GenerateContentResponse>> =
            texts.iter().map(|t| Ok(chunk(t))).collect();
        items.push(Err(err));
        Box::pin(futures_util::stream::iter(items))
    }

    #[tokio::test]
    async fn merge_concatenates_in_order() {
        let merged = merge_chunks(&[chunk("Hello"), chunk(" world"), chunk("!")]);
        assert_eq!(merged.text(), "Hello world!");
        assert_eq!(merged.candidates.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn merge_of_nothing_is_empty() {
        let merged = merge_chunks(&[]);
        assert!(merged.candidates.is_none());
        assert_eq!(merged.text(), "");
    }

    #[test]
    fn merge_keeps_terminal_fields() {
        let mut first = chunk("a");
        first.prompt_feedback = Some(PromptFeedback {
            block_reason: None,
            safety_ratings: None,
        });
        let mut last = chunk("b");
        last.candidates.as_mut().unwrap()[0].finish_reason = Some(FinishReason::Stop);
        last.usage_metadata = Some(UsageMetadata {
            prompt_token_count: Some(3),
            candidates_token_count: Some(7),
            total_token_count: Some(10),
        });
        let merged = merge_chunks(&[first, last]);
        assert_eq!(merged.text(), "ab");
        assert_eq!(merged.finish_reason(), Some(FinishReason::Stop));
        assert!(merged.prompt_feedback.is_some());
        assert_eq!(merged.usage_metadata.unwrap().total_token_count, Some(10));
    }

    #[test]
    fn merge_carries_function_call_parts() {
        let mut second = chunk("");
        second.candidates.as_mut().unwrap()[0]
            .content
            .as_mut()
            .unwrap()
            .parts = vec![Part::FunctionCall(crate::content::FunctionCall {
            name: "lookup".into(),
            args: serde_json::json!({"q": 1}),
        })];
        let merged = merge_chunks(&[chunk("hi"), second]);
        assert_eq!(merged.text(), "hi");
        assert_eq!(merged.function_calls().len(), 1);
    }

    #[tokio::test]
    async fn drive_resolves_final_without_consumption() {
        let result = StreamResult::drive(source_of(&["Hello", " world", "!"]));
        drop(result.stream);
        let final_response = result.response.resolve().await.unwrap();
        assert_eq!(final_response.text(), "Hello world!");
    }

    #[tokio::test]
    async fn drive_preserves_chunks_and_order() {
        let result = StreamResult::drive(source_of(&["a", "b", "c"]));
        let texts: Vec<String> = result.stream.map(|c| c.unwrap().text()).collect().await;
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(result.response.resolve().await.unwrap().text(), "abc");
    }

    #[tokio::test]
    async fn drive_surfaces_error_on_both_paths() {
        let result = StreamResult::drive(failing_source(
            &["a", "b"],
            GenAiError::Api {
                code: "500".into(),
                message: "mid-stream".into(),
            },
        ));
        let items: Vec<CoreResult<GenerateContentResponse>> = result.stream.collect().await;
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(items[1].is_ok());
        assert!(items[2].is_err());

        let err = result.response.resolve().await.unwrap_err();
        match err {
            GenAiError::Api { code, .. } => assert_eq!(code, "500"),
            other => panic!("expected Api, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrap_without_callbacks_is_identity() {
        let result = StreamResult::drive(source_of(&["x", "y"]));
        let wrapped = wrap(result, StreamCallbacks::new());
        let texts: Vec<String> = wrapped.stream.map(|c| c.unwrap().text()).collect().await;
        assert_eq!(texts, vec!["x", "y"]);
        assert_eq!(wrapped.response.resolve().await.unwrap().text(), "xy");
    }

    #[tokio::test]
    async fn on_data_sees_every_increment_in_order() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let seen2 = Arc::clone(&seen);
        let result = StreamResult::drive(source_of(&["Hello", " world", "!"]));
        let wrapped = wrap(
            result,
            StreamCallbacks::new().on_data(move |t| seen2.lock().unwrap().push(t.to_string())),
        );

        // The consumer still observes identical chunks.
        let texts: Vec<String> = wrapped.stream.map(|c| c.unwrap().text()).collect().await;
        assert_eq!(texts, vec!["Hello", " world", "!"]);
        assert_eq!(*seen.lock().unwrap(), vec!["Hello", " world", "!"]);
    }

    #[tokio::test]
    async fn on_done_after_full_drain_gets_concatenation() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let seen2 = Arc::clone(&seen);
        let done = Arc::new(Mutex::new(Vec::<String>::new()));
        let done2 = Arc::clone(&done);

        let result = StreamResult::drive(source_of(&["Hello", " world", "!"]));
        let wrapped = wrap(
            result,
            StreamCallbacks::new()
                .on_data(move |t| seen2.lock().unwrap().push(t.to_string()))
                .on_done(move |full| done2.lock().unwrap().push(full.to_string())),
        );

        let _drained: Vec<_> = wrapped.stream.collect().await;
        assert_eq!(*seen.lock().unwrap(), vec!["Hello", " world", "!"]);
        assert_eq!(*done.lock().unwrap(), vec!["Hello world!"]);
    }

    #[tokio::test]
    async fn on_data_branch_empty_stream_still_fires_done_once() {
        let done_calls = Arc::new(AtomicUsize::new(0));
        let done2 = Arc::clone(&done_calls);
        let result = StreamResult::drive(source_of(&[]));
        let wrapped = wrap(
            result,
            StreamCallbacks::new()
                .on_data(|_| {})
                .on_done(move |full| {
                    assert_eq!(full, "");
                    done2.fetch_add(1, Ordering::SeqCst);
                }),
        );
        let drained: Vec<_> = wrapped.stream.collect().await;
        assert!(drained.is_empty());
        assert_eq!(done_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abandoned_iteration_never_fires_done_in_on_data_branch() {
        let done_calls = Arc::new(AtomicUsize::new(0));
        let done2 = Arc::clone(&done_calls);
        let result = StreamResult::drive(source_of(&["a", "b", "c"]));
        let mut wrapped = wrap(
            result,
            StreamCallbacks::new()
                .on_data(|_| {})
                .on_done(move |_| {
                    done2.fetch_add(1, Ordering::SeqCst);
                }),
        );

        // Pull one chunk of three, then walk away.
        let first = wrapped.stream.next().await.unwrap().unwrap();
        assert_eq!(first.text(), "a");
        drop(wrapped.stream);

        // The pump still completes the final response independently.
        assert_eq!(wrapped.response.resolve().await.unwrap().text(), "abc");
        assert_eq!(done_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn on_done_only_fires_without_iteration() {
        let done = Arc::new(Mutex::new(Vec::<String>::new()));
        let done2 = Arc::clone(&done);
        let result = StreamResult::drive(source_of(&["Hello", " world", "!"]));
        let wrapped = wrap(
            result,
            StreamCallbacks::new().on_done(move |full| done2.lock().unwrap().push(full.to_string())),
        );

        // Caller never touches the chunk stream.
        drop(wrapped.stream);
        let final_response = wrapped.response.resolve().await.unwrap();
        assert_eq!(final_response.text(), "Hello world!");
        assert_eq!(*done.lock().unwrap(), vec!["Hello world!"]);
    }

    #[tokio::test]
    async fn on_done_only_leaves_stream_consumable() {
        let done_calls = Arc::new(AtomicUsize::new(0));
        let done2 = Arc::clone(&done_calls);
        let result = StreamResult::drive(source_of(&["a", "b"]));
        let wrapped = wrap(
            result,
            StreamCallbacks::new().on_done(move |_| {
                done2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let texts: Vec<String> = wrapped.stream.map(|c| c.unwrap().text()).collect().await;
        assert_eq!(texts, vec!["a", "b"]);
        assert_eq!(wrapped.response.resolve().await.unwrap().text(), "ab");
        assert_eq!(done_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn error_mid_stream_suppresses_done_and_keeps_partial_data_calls() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let seen2 = Arc::clone(&seen);
        let done_calls = Arc::new(AtomicUsize::new(0));
        let done2 = Arc::clone(&done_calls);

        let result = StreamResult::drive(failing_source(
            &["He", "llo"],
            GenAiError::Unavailable,
        ));
        let wrapped = wrap(
            result,
            StreamCallbacks::new()
                .on_data(move |t| seen2.lock().unwrap().push(t.to_string()))
                .on_done(move |_| {
                    done2.fetch_add(1, Ordering::SeqCst);
                }),
        );

        let items: Vec<CoreResult<GenerateContentResponse>> = wrapped.stream.collect().await;
        assert!(items.last().unwrap().is_err());
        assert_eq!(*seen.lock().unwrap(), vec!["He", "llo"]);
        assert_eq!(done_calls.load(Ordering::SeqCst), 0);
        assert!(wrapped.response.resolve().await.is_err());
    }

    #[tokio::test]
    async fn on_done_only_never_fires_on_error() {
        let done_calls = Arc::new(AtomicUsize::new(0));
        let done2 = Arc::clone(&done_calls);
        let result = StreamResult::drive(failing_source(&["x"], GenAiError::Unavailable));
        let wrapped = wrap(
            result,
            StreamCallbacks::new().on_done(move |_| {
                done2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        drop(wrapped.stream);
        assert!(wrapped.response.resolve().await.is_err());
        assert_eq!(done_calls.load(Ordering::SeqCst), 0);
    }
}
