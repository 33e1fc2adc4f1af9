//! Deterministic echo engine
//!
//! Generates by cycling through the prompt's own tokens. Output depends only
//! on the prompt and parameters, which makes chunk counts and texts
//! reproducible across runs.

use crate::AdapterConfig;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tgis_core::{
    DecodingMethod, Engine, EngineError, EngineHealth, EngineRequest, EngineStream,
    GenerationDelta, GenerationOutput, ModelInfo, ModelKind, RequestId, Result, StopReason,
    Tokenization,
};
use tracing::debug;

/// Split text into word tokens, each carrying its leading whitespace.
///
/// Concatenating the tokens gives back `text`; any non-empty text has at
/// least one token.
pub fn split_tokens(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_word = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if in_word {
                tokens.push(&text[start..i]);
                start = i;
                in_word = false;
            }
        } else {
            in_word = true;
        }
    }
    if start < text.len() {
        tokens.push(&text[start..]);
    }
    tokens
}

pub struct EchoEngine {
    model_id: String,
    max_new_tokens: u32,
    max_sequence_length: u32,
    token_delay: Duration,
    dead: Arc<RwLock<Option<String>>>,
    aborted: Mutex<HashSet<RequestId>>,
}

impl EchoEngine {
    pub fn new() -> Self {
        Self {
            model_id: "echo".to_string(),
            max_new_tokens: 10,
            max_sequence_length: 2048,
            token_delay: Duration::ZERO,
            dead: Arc::new(RwLock::new(None)),
            aborted: Mutex::new(HashSet::new()),
        }
    }

    /// Create an EchoEngine matching the adapter's model limits
    pub fn from_config(config: &AdapterConfig) -> Self {
        Self::new()
            .with_model_id(config.model_id.clone())
            .with_max_new_tokens(config.default_max_new_tokens)
            .with_max_sequence_length(config.max_sequence_length)
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_max_new_tokens(mut self, max_new_tokens: u32) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }

    pub fn with_max_sequence_length(mut self, max_sequence_length: u32) -> Self {
        self.max_sequence_length = max_sequence_length;
        self
    }

    /// Sleep this long before emitting each token
    pub fn with_token_delay(mut self, token_delay: Duration) -> Self {
        self.token_delay = token_delay;
        self
    }

    /// Stop the engine loop; every later call fails engine-fatally
    pub fn kill(&self, reason: impl Into<String>) {
        if let Ok(mut dead) = self.dead.write() {
            *dead = Some(reason.into());
        }
    }

    /// Request ids passed to [`Engine::abort`] so far
    pub fn aborted_requests(&self) -> Vec<RequestId> {
        self.aborted
            .lock()
            .map(|aborted| aborted.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn ensure_alive(&self) -> Result<()> {
        match dead_reason(&self.dead) {
            Some(reason) => Err(EngineError::EngineDead(reason)),
            None => Ok(()),
        }
    }

    /// Work out every decoding step up front
    fn plan(&self, request: &EngineRequest) -> Result<(u32, Vec<GenerationDelta>)> {
        let mut tokens = split_tokens(&request.prompt);
        let truncate = request.params.truncate_input_tokens as usize;
        if truncate > 0 && tokens.len() > truncate {
            tokens.drain(..tokens.len() - truncate);
        }

        let input_token_count = tokens.len() as u32;
        if input_token_count >= self.max_sequence_length {
            return Err(EngineError::InvalidRequest(format!(
                "input has {} tokens, model accepts at most {}",
                input_token_count, self.max_sequence_length
            )));
        }
        if tokens.is_empty() {
            let step = GenerationDelta {
                stop_reason: Some(StopReason::EosToken),
                ..Default::default()
            };
            return Ok((0, vec![step]));
        }

        let params = &request.params;
        let max_new_tokens = params.max_new_tokens.unwrap_or(self.max_new_tokens);
        let room = self.max_sequence_length - input_token_count;
        let budget = max_new_tokens.min(room);
        let seed = match params.method {
            DecodingMethod::Sample => params.seed,
            DecodingMethod::Greedy => None,
        };

        let mut generated = String::new();
        let mut steps = Vec::with_capacity(budget as usize);
        for count in 1..=budget {
            let token = tokens[(count as usize - 1) % tokens.len()];
            generated.push_str(token);
            let mut step = GenerationDelta {
                text: token.to_string(),
                generated_token_count: count,
                ..Default::default()
            };

            let matched = (count >= params.min_new_tokens)
                .then(|| {
                    params
                        .stop_sequences
                        .iter()
                        .find(|s| generated.ends_with(s.as_str()) || token.contains(s.as_str()))
                })
                .flatten();
            if let Some(sequence) = matched {
                step.stop_reason = Some(StopReason::StopSequence);
                step.stop_sequence = Some(sequence.clone());
            } else if count == max_new_tokens {
                step.stop_reason = Some(StopReason::MaxTokens);
            } else if count == budget {
                step.stop_reason = Some(StopReason::TokenLimit);
            }

            let done = step.stop_reason.is_some();
            if done {
                step.seed = seed;
            }
            steps.push(step);
            if done {
                break;
            }
        }

        if steps.is_empty() {
            steps.push(GenerationDelta {
                stop_reason: Some(StopReason::MaxTokens),
                seed,
                ..Default::default()
            });
        }
        Ok((input_token_count, steps))
    }
}

impl Default for EchoEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn dead_reason(dead: &RwLock<Option<String>>) -> Option<String> {
    dead.read().ok().and_then(|reason| reason.clone())
}

#[async_trait]
impl Engine for EchoEngine {
    async fn generate(&self, request: EngineRequest) -> Result<GenerationOutput> {
        let stream = self.generate_stream(request).await?;
        let mut output = GenerationOutput {
            input_token_count: Some(stream.input_token_count),
            ..Default::default()
        };

        let mut deltas = stream.deltas;
        while let Some(delta) = deltas.next().await {
            let delta = delta?;
            output.text.push_str(&delta.text);
            output.generated_token_count = delta.generated_token_count;
            output.stop_reason = delta.stop_reason.unwrap_or_default();
            output.stop_sequence = delta.stop_sequence;
            output.seed = delta.seed;
        }
        Ok(output)
    }

    async fn generate_stream(&self, request: EngineRequest) -> Result<EngineStream> {
        self.ensure_alive()?;
        if let Some(adapter) = &request.adapter {
            if !adapter.path.is_dir() {
                return Err(EngineError::AdapterNotFound(adapter.name.clone()));
            }
            debug!("Applying adapter {} to {}", adapter.name, request.request_id);
        }

        let (input_token_count, steps) = self.plan(&request)?;
        let delay = self.token_delay;
        let time_limit = request.params.time_limit;
        let dead = Arc::clone(&self.dead);

        let deltas = async_stream::stream! {
            let started = Instant::now();
            for mut step in steps {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if let Some(reason) = dead_reason(&dead) {
                    yield Err(EngineError::EngineDead(reason));
                    return;
                }
                let out_of_time = time_limit.is_some_and(|limit| started.elapsed() >= limit);
                if out_of_time && step.stop_reason.is_none() {
                    step.stop_reason = Some(StopReason::TimeLimit);
                    yield Ok(step);
                    return;
                }
                yield Ok(step);
            }
        };

        Ok(EngineStream {
            input_token_count,
            deltas: deltas.boxed(),
        })
    }

    async fn tokenize(&self, text: &str, return_tokens: bool) -> Result<Tokenization> {
        self.ensure_alive()?;
        let tokens = split_tokens(text);
        Ok(Tokenization {
            token_count: tokens.len() as u32,
            tokens: if return_tokens {
                tokens.into_iter().map(str::to_string).collect()
            } else {
                Vec::new()
            },
        })
    }

    fn abort(&self, request_id: &RequestId) {
        debug!("Aborting request {}", request_id);
        if let Ok(mut aborted) = self.aborted.lock() {
            aborted.insert(request_id.clone());
        }
    }

    fn health(&self) -> EngineHealth {
        let dead = dead_reason(&self.dead).is_some();
        EngineHealth {
            errored: dead,
            running: !dead,
        }
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model_id: self.model_id.clone(),
            kind: ModelKind::DecoderOnly,
            max_sequence_length: self.max_sequence_length,
            max_new_tokens: self.max_new_tokens,
        }
    }
}
