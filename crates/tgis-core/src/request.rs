//! Request types for tgis-core

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Header carrying a caller-supplied correlation identity.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// NewType pattern for Request ID
///
/// One per inbound call. Either the caller's correlation id, passed through
/// verbatim, or a generated UUID in its 32-digit hex form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    /// Create a new random RequestId
    pub fn new() -> Self {
        Self::from_uuid(uuid::Uuid::new_v4())
    }

    /// Create from a UUID, using its simple (hex) form
    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id.simple().to_string())
    }

    /// Create from existing string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Derive the id of the `index`-th sub-request of a batch
    pub fn child(&self, index: usize) -> Self {
        Self(format!("{}-{}", self.0, index))
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inbound call metadata.
///
/// Header names are stored lowercase. When a header repeats, the first
/// value wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallMetadata {
    entries: HashMap<String, String>,
}

impl CallMetadata {
    /// Create empty metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry unless the header is already present
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.entries
            .entry(name.as_ref().to_ascii_lowercase())
            .or_insert_with(|| value.into());
        self
    }

    /// Look up a header value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Caller-supplied correlation id, if present and non-empty
    pub fn correlation_id(&self) -> Option<&str> {
        self.get(CORRELATION_HEADER).filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for CallMetadata
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |metadata, (k, v)| metadata.with(k, v))
    }
}

/// Decoding strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DecodingMethod {
    #[default]
    Greedy,
    Sample,
}

/// Sampling and stopping parameters shared by all prompts of a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub method: DecodingMethod,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub seed: Option<u64>,

    /// Upper bound on generated tokens; the server default applies when unset
    pub max_new_tokens: Option<u32>,
    pub min_new_tokens: u32,
    pub time_limit: Option<Duration>,
    pub stop_sequences: Vec<String>,

    /// Echo the prompt in front of the generated text
    pub include_input_text: bool,
    /// Keep only the last N prompt tokens (0 disables truncation)
    pub truncate_input_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            method: DecodingMethod::Greedy,
            temperature: 1.0,
            top_k: 0,
            top_p: 1.0,
            seed: None,
            max_new_tokens: None,
            min_new_tokens: 0,
            time_limit: None,
            stop_sequences: Vec::new(),
            include_input_text: false,
            truncate_input_tokens: 0,
        }
    }
}

/// Single-prompt generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub adapter_id: Option<String>,
    pub params: GenerationParams,
}

impl GenerationRequest {
    /// Create a request with default parameters
    pub fn simple(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            adapter_id: None,
            params: GenerationParams::default(),
        }
    }

    /// Select a LoRA adapter
    pub fn with_adapter(mut self, adapter_id: impl Into<String>) -> Self {
        self.adapter_id = Some(adapter_id.into());
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }
}

/// Ordered prompts sharing one adapter, one parameter set and one identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub prompts: Vec<String>,
    pub adapter_id: Option<String>,
    pub params: GenerationParams,
}

impl BatchRequest {
    pub fn new<I, S>(prompts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prompts: prompts.into_iter().map(Into::into).collect(),
            adapter_id: None,
            params: GenerationParams::default(),
        }
    }

    /// Select a LoRA adapter
    pub fn with_adapter(mut self, adapter_id: impl Into<String>) -> Self {
        self.adapter_id = Some(adapter_id.into());
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }
}

/// Tokenization request for one or more texts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizeRequest {
    pub texts: Vec<String>,
    pub return_tokens: bool,
}

impl TokenizeRequest {
    pub fn new<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            texts: texts.into_iter().map(Into::into).collect(),
            return_tokens: false,
        }
    }
}
