//! Shape-specific response aggregation
//!
//! Turns engine output into what a call returns: one response, an ordered
//! list of responses, or a stream of chunks. Every engine request is covered
//! by an [`AbortGuard`] so work abandoned by the caller is aborted in the
//! engine.

use crate::{Result, TgisError};
use futures::StreamExt;
use futures::future::try_join_all;
use futures::stream::BoxStream;
use tgis_core::{EngineRequest, EngineStream, GenerationOutput, RequestId, SharedEngine};
use tracing::debug;

/// Chunks of one streamed generation, in engine emission order
pub type ResponseStream = BoxStream<'static, Result<GenerationOutput>>;

/// Aborts an engine request unless disarmed before being dropped
pub struct AbortGuard {
    engine: SharedEngine,
    request_id: RequestId,
    armed: bool,
}

impl AbortGuard {
    pub fn new(engine: SharedEngine, request_id: RequestId) -> Self {
        Self {
            engine,
            request_id,
            armed: true,
        }
    }

    /// The engine is done with the request; nothing to abort
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if self.armed {
            debug!("Aborting abandoned request {}", self.request_id);
            self.engine.abort(&self.request_id);
        }
    }
}

/// Await one full generation
pub async fn unary(engine: &SharedEngine, request: EngineRequest) -> Result<GenerationOutput> {
    let input_text = request
        .params
        .include_input_text
        .then(|| request.prompt.clone());

    let mut guard = AbortGuard::new(engine.clone(), request.request_id.clone());
    let result = engine.generate(request).await;
    guard.disarm();

    let mut output = result?;
    if let Some(input_text) = input_text {
        output.text.insert_str(0, &input_text);
    }
    Ok(output)
}

/// Generate all prompts concurrently.
///
/// Results line up with `requests`, whatever order the engine finishes in.
/// The first failure fails the batch and aborts the prompts still running.
pub async fn batch(
    engine: &SharedEngine,
    requests: Vec<EngineRequest>,
) -> Result<Vec<GenerationOutput>> {
    try_join_all(requests.into_iter().map(|request| unary(engine, request))).await
}

/// Relay a generation chunk by chunk.
///
/// The first chunk is a header with the input token count (and the input
/// text when requested); each later chunk is one engine step. Dropping the
/// stream before the last chunk aborts the request.
pub async fn stream(engine: &SharedEngine, request: EngineRequest) -> Result<ResponseStream> {
    let input_text = request
        .params
        .include_input_text
        .then(|| request.prompt.clone());

    let mut guard = AbortGuard::new(engine.clone(), request.request_id.clone());
    let EngineStream {
        input_token_count,
        mut deltas,
    } = match engine.generate_stream(request).await {
        Ok(stream) => stream,
        Err(error) => {
            guard.disarm();
            return Err(error.into());
        }
    };

    let chunks = async_stream::stream! {
        let mut guard = guard;
        yield Ok(GenerationOutput::stream_header(input_token_count, input_text));

        while let Some(delta) = deltas.next().await {
            match delta {
                Ok(delta) => {
                    let finished = delta.stop_reason.is_some();
                    if finished {
                        guard.disarm();
                    }
                    yield Ok(GenerationOutput::from(delta));
                    if finished {
                        return;
                    }
                }
                Err(error) => {
                    guard.disarm();
                    yield Err(TgisError::from(error));
                    return;
                }
            }
        }
        guard.disarm();
    };
    Ok(chunks.boxed())
}
