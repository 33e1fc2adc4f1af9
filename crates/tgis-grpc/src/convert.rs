//! Conversions between wire messages and adapter types

use crate::pb;
use std::time::Duration;
use tgis::{
    CallMetadata, DecodingMethod, GenerationOutput, GenerationParams, ModelInfo, ModelKind,
    StopReason, TokenizeOutput,
};
use tonic::metadata::{KeyAndValueRef, MetadataMap};

/// Text-valued request metadata. Binary entries are skipped.
pub fn call_metadata(metadata: &MetadataMap) -> CallMetadata {
    metadata
        .iter()
        .filter_map(|entry| match entry {
            KeyAndValueRef::Ascii(key, value) => value
                .to_str()
                .ok()
                .map(|value| (key.as_str().to_string(), value.to_string())),
            KeyAndValueRef::Binary(..) => None,
        })
        .collect()
}

/// Map wire parameters onto generation parameters.
///
/// Zero means "unset" on the wire for every numeric field.
pub fn generation_params(params: Option<pb::Parameters>) -> GenerationParams {
    let mut out = GenerationParams::default();
    let Some(params) = params else {
        return out;
    };

    out.method = match params.method() {
        pb::DecodingMethod::Greedy => DecodingMethod::Greedy,
        pb::DecodingMethod::Sample => DecodingMethod::Sample,
    };
    out.truncate_input_tokens = params.truncate_input_tokens;

    if let Some(sampling) = params.sampling {
        if sampling.temperature > 0.0 {
            out.temperature = sampling.temperature;
        }
        if sampling.top_p > 0.0 {
            out.top_p = sampling.top_p;
        }
        out.top_k = sampling.top_k;
        out.seed = sampling.seed;
    }

    if let Some(stopping) = params.stopping {
        out.max_new_tokens = (stopping.max_new_tokens > 0).then_some(stopping.max_new_tokens);
        out.min_new_tokens = stopping.min_new_tokens;
        out.time_limit = (stopping.time_limit_millis > 0)
            .then(|| Duration::from_millis(u64::from(stopping.time_limit_millis)));
        out.stop_sequences = stopping.stop_sequences;
    }

    if let Some(response) = params.response {
        out.include_input_text = response.input_text;
    }
    out
}

pub fn generation_response(output: GenerationOutput) -> pb::GenerationResponse {
    let mut response = pb::GenerationResponse {
        input_token_count: output.input_token_count,
        generated_token_count: output.generated_token_count,
        text: output.text,
        stop_sequence: output.stop_sequence.unwrap_or_default(),
        seed: output.seed.unwrap_or_default(),
        ..Default::default()
    };
    response.set_stop_reason(stop_reason(output.stop_reason));
    response
}

fn stop_reason(reason: StopReason) -> pb::StopReason {
    match reason {
        StopReason::NotFinished => pb::StopReason::NotFinished,
        StopReason::MaxTokens => pb::StopReason::MaxTokens,
        StopReason::EosToken => pb::StopReason::EosToken,
        StopReason::Cancelled => pb::StopReason::Cancelled,
        StopReason::TimeLimit => pb::StopReason::TimeLimit,
        StopReason::StopSequence => pb::StopReason::StopSequence,
        StopReason::TokenLimit => pb::StopReason::TokenLimit,
        StopReason::Error => pb::StopReason::Error,
    }
}

pub fn tokenize_response(output: TokenizeOutput) -> pb::TokenizeResponse {
    pb::TokenizeResponse {
        token_count: output.token_count,
        tokens: output.tokens,
    }
}

pub fn model_info_response(info: ModelInfo) -> pb::ModelInfoResponse {
    let mut response = pb::ModelInfoResponse {
        max_sequence_length: info.max_sequence_length,
        max_new_tokens: info.max_new_tokens,
        ..Default::default()
    };
    response.set_model_kind(match info.kind {
        ModelKind::DecoderOnly => pb::model_info_response::ModelKind::DecoderOnly,
        ModelKind::EncoderDecoder => pb::model_info_response::ModelKind::EncoderDecoder,
    });
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use tgis::CORRELATION_HEADER;
    use tonic::metadata::{Ascii, Binary, MetadataValue};

    #[test]
    fn test_call_metadata_reads_correlation_header() {
        let mut metadata = MetadataMap::new();
        metadata.insert(
            CORRELATION_HEADER,
            MetadataValue::<Ascii>::from_static("abc-123"),
        );
        metadata.insert_bin("trace-bin", MetadataValue::<Binary>::from_bytes(&[0, 1]));

        let converted = call_metadata(&metadata);
        assert_eq!(converted.correlation_id(), Some("abc-123"));
        assert_eq!(converted.get("trace-bin"), None);
    }

    #[test]
    fn test_zero_means_unset() {
        let params = pb::Parameters {
            sampling: Some(pb::SamplingParameters::default()),
            stopping: Some(pb::StoppingCriteria::default()),
            ..Default::default()
        };

        let converted = generation_params(Some(params));
        assert_eq!(converted, GenerationParams::default());
    }

    #[test]
    fn test_sampling_and_stopping() {
        let mut params = pb::Parameters {
            sampling: Some(pb::SamplingParameters {
                temperature: 0.5,
                top_k: 40,
                top_p: 0.9,
                seed: Some(7),
            }),
            stopping: Some(pb::StoppingCriteria {
                max_new_tokens: 20,
                min_new_tokens: 2,
                time_limit_millis: 1500,
                stop_sequences: vec!["\n".to_string()],
            }),
            response: Some(pb::ResponseOptions { input_text: true }),
            truncate_input_tokens: 100,
            ..Default::default()
        };
        params.set_method(pb::DecodingMethod::Sample);

        let converted = generation_params(Some(params));
        assert_eq!(converted.method, DecodingMethod::Sample);
        assert_eq!(converted.temperature, 0.5);
        assert_eq!(converted.top_k, 40);
        assert_eq!(converted.seed, Some(7));
        assert_eq!(converted.max_new_tokens, Some(20));
        assert_eq!(converted.min_new_tokens, 2);
        assert_eq!(converted.time_limit, Some(Duration::from_millis(1500)));
        assert_eq!(converted.stop_sequences, vec!["\n".to_string()]);
        assert!(converted.include_input_text);
        assert_eq!(converted.truncate_input_tokens, 100);
    }

    #[test]
    fn test_generation_response() {
        let response = generation_response(GenerationOutput {
            text: "hello".to_string(),
            generated_token_count: 1,
            stop_reason: StopReason::StopSequence,
            input_token_count: Some(3),
            stop_sequence: Some("lo".to_string()),
            seed: None,
        });

        assert_eq!(response.stop_reason(), pb::StopReason::StopSequence);
        assert_eq!(response.stop_sequence, "lo");
        assert_eq!(response.input_token_count, Some(3));
        assert_eq!(response.seed, 0);
    }
}
