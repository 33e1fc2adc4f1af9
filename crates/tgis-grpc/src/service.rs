//! `fmaas.GenerationService` backed by a [`Dispatcher`]

use crate::convert::{
    call_metadata, generation_params, generation_response, model_info_response,
    tokenize_response,
};
use crate::pb::{self, generation_service_server::GenerationService};
use crate::status::to_status;
use futures::{Stream, StreamExt, stream};
use std::pin::Pin;
use std::sync::Arc;
use tgis::{BatchRequest, Dispatcher, GenerationRequest, TokenizeRequest};
use tonic::{Request, Response, Status};

#[derive(Clone)]
pub struct TgisService {
    dispatcher: Arc<Dispatcher>,
}

impl TgisService {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

fn reject_prefix(prefix_id: Option<&str>) -> Result<(), Status> {
    match prefix_id {
        Some(prefix) if !prefix.is_empty() => Err(Status::invalid_argument(format!(
            "prefix_id is not supported: {}",
            prefix
        ))),
        _ => Ok(()),
    }
}

#[tonic::async_trait]
impl GenerationService for TgisService {
    type GenerateStreamStream =
        Pin<Box<dyn Stream<Item = Result<pb::GenerationResponse, Status>> + Send>>;

    async fn generate(
        &self,
        request: Request<pb::BatchedGenerationRequest>,
    ) -> Result<Response<pb::BatchedGenerationResponse>, Status> {
        let metadata = call_metadata(request.metadata());
        let request = request.into_inner();
        reject_prefix(request.prefix_id.as_deref())?;

        let batch = BatchRequest {
            prompts: request.requests.into_iter().map(|r| r.text).collect(),
            adapter_id: request.adapter_id,
            params: generation_params(request.params),
        };
        let outputs = self
            .dispatcher
            .generate_batch(&metadata, batch)
            .await
            .map_err(to_status)?
            .into_option()
            .unwrap_or_default();

        Ok(Response::new(pb::BatchedGenerationResponse {
            responses: outputs.into_iter().map(generation_response).collect(),
        }))
    }

    async fn generate_stream(
        &self,
        request: Request<pb::SingleGenerationRequest>,
    ) -> Result<Response<Self::GenerateStreamStream>, Status> {
        let metadata = call_metadata(request.metadata());
        let request = request.into_inner();
        reject_prefix(request.prefix_id.as_deref())?;

        let single = GenerationRequest {
            prompt: request.request.map(|r| r.text).unwrap_or_default(),
            adapter_id: request.adapter_id,
            params: generation_params(request.params),
        };
        let outcome = self
            .dispatcher
            .generate_stream(&metadata, single)
            .await
            .map_err(to_status)?;

        let chunks: Self::GenerateStreamStream = match outcome.into_option() {
            Some(chunks) => Box::pin(
                chunks.map(|chunk| chunk.map(generation_response).map_err(to_status)),
            ),
            None => Box::pin(stream::empty::<Result<pb::GenerationResponse, Status>>()),
        };
        Ok(Response::new(chunks))
    }

    async fn tokenize(
        &self,
        request: Request<pb::BatchedTokenizeRequest>,
    ) -> Result<Response<pb::BatchedTokenizeResponse>, Status> {
        let metadata = call_metadata(request.metadata());
        let request = request.into_inner();

        let tokenize = TokenizeRequest {
            texts: request.requests.into_iter().map(|r| r.text).collect(),
            return_tokens: request.return_tokens,
        };
        let outputs = self
            .dispatcher
            .tokenize(&metadata, tokenize)
            .await
            .map_err(to_status)?
            .into_option()
            .unwrap_or_default();

        Ok(Response::new(pb::BatchedTokenizeResponse {
            responses: outputs.into_iter().map(tokenize_response).collect(),
        }))
    }

    async fn model_info(
        &self,
        request: Request<pb::ModelInfoRequest>,
    ) -> Result<Response<pb::ModelInfoResponse>, Status> {
        let metadata = call_metadata(request.metadata());
        let response = self
            .dispatcher
            .model_info(&metadata)
            .await
            .map_err(to_status)?
            .into_option()
            .map(model_info_response)
            .unwrap_or_default();

        Ok(Response::new(response))
    }
}
