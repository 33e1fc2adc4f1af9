//! Response types for tgis-core

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Why generation stopped
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    /// Still decoding; only valid on intermediate stream chunks
    #[default]
    NotFinished,
    MaxTokens,
    EosToken,
    Cancelled,
    TimeLimit,
    StopSequence,
    TokenLimit,
    Error,
}

impl StopReason {
    pub fn is_finished(&self) -> bool {
        !matches!(self, StopReason::NotFinished)
    }
}

/// A generation result, or one chunk of a streamed result
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub text: String,
    pub generated_token_count: u32,
    pub stop_reason: StopReason,
    pub input_token_count: Option<u32>,
    pub stop_sequence: Option<String>,
    pub seed: Option<u64>,
}

impl GenerationOutput {
    /// Header chunk opening a stream: token accounting for the prompt only
    pub fn stream_header(input_token_count: u32, input_text: Option<String>) -> Self {
        Self {
            text: input_text.unwrap_or_default(),
            input_token_count: Some(input_token_count),
            ..Default::default()
        }
    }
}

/// One decoding step reported by a streaming engine
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenerationDelta {
    /// Text decoded in this step
    pub text: String,
    /// Tokens generated so far, including this step
    pub generated_token_count: u32,
    /// Set on the final step only
    pub stop_reason: Option<StopReason>,
    pub stop_sequence: Option<String>,
    pub seed: Option<u64>,
}

impl From<GenerationDelta> for GenerationOutput {
    fn from(delta: GenerationDelta) -> Self {
        Self {
            text: delta.text,
            generated_token_count: delta.generated_token_count,
            stop_reason: delta.stop_reason.unwrap_or_default(),
            input_token_count: None,
            stop_sequence: delta.stop_sequence,
            seed: delta.seed,
        }
    }
}

/// Tokenization result for one text
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenizeOutput {
    pub token_count: u32,
    /// Token strings, only populated when requested
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
pub enum ModelKind {
    #[default]
    DecoderOnly,
    EncoderDecoder,
}

/// Static facts about the served model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_id: String,
    pub kind: ModelKind,
    pub max_sequence_length: u32,
    pub max_new_tokens: u32,
}
