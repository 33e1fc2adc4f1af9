//! Request dispatcher
//!
//! Top of the request lifecycle: every operation assigns the call's
//! identity, validates, resolves the adapter, runs the engine through the
//! aggregator and hands any failure to the [`ErrorClassifier`] exactly once.

use crate::adapters::AdapterStore;
use crate::aggregator::{self, ResponseStream};
use crate::classifier::{CallContext, ErrorClassifier, ErrorRecord, ShutdownSignal};
use crate::correlation::{CorrelationAssigner, IdSource};
use crate::validation::{validate_batch_size, validate_params};
use crate::{AdapterConfig, Result, TgisError};
use futures::StreamExt;
use futures::future::try_join_all;
use tgis_core::{
    BatchRequest, CallMetadata, EngineError, EngineRequest, GenerationOutput, GenerationRequest,
    ModelInfo, SharedEngine, TokenizeOutput, TokenizeRequest,
};
use tracing::{Span, debug, instrument};

/// How a call ended when it did not fail.
///
/// `Suppressed` is a terminal state of its own: an engine-fatal failure was
/// logged and the call ends without a result and without an error.
#[must_use]
#[derive(Debug)]
pub enum CallOutcome<T> {
    Completed(T),
    Suppressed(ErrorRecord),
}

impl<T> CallOutcome<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            CallOutcome::Completed(value) => Some(value),
            CallOutcome::Suppressed(_) => None,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, CallOutcome::Suppressed(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallOutcome<U> {
        match self {
            CallOutcome::Completed(value) => CallOutcome::Completed(f(value)),
            CallOutcome::Suppressed(record) => CallOutcome::Suppressed(record),
        }
    }
}

pub struct Dispatcher {
    engine: SharedEngine,
    config: AdapterConfig,
    assigner: CorrelationAssigner,
    classifier: ErrorClassifier,
    adapters: AdapterStore,
}

impl Dispatcher {
    /// Create a new builder
    pub fn builder(engine: SharedEngine) -> DispatcherBuilder {
        DispatcherBuilder::new(engine)
    }

    /// Generate a completion for one prompt
    #[instrument(name = "generate", skip_all, fields(request_id))]
    pub async fn generate(
        &self,
        metadata: &CallMetadata,
        request: GenerationRequest,
    ) -> Result<CallOutcome<GenerationOutput>> {
        let context = self.begin("generate", metadata);
        let result = self.run_generate(&context, request).await;
        self.settle(&context, result)
    }

    /// Generate completions for every prompt of a batch, in input order
    #[instrument(name = "generate_batch", skip_all, fields(request_id))]
    pub async fn generate_batch(
        &self,
        metadata: &CallMetadata,
        request: BatchRequest,
    ) -> Result<CallOutcome<Vec<GenerationOutput>>> {
        let context = self.begin("generate_batch", metadata);
        let result = self.run_generate_batch(&context, request).await;
        self.settle(&context, result)
    }

    /// Stream a completion for one prompt.
    ///
    /// Failures after the stream has started go through the classifier as
    /// well: an engine-fatal one ends the stream quietly, any other is the
    /// last item.
    #[instrument(name = "generate_stream", skip_all, fields(request_id))]
    pub async fn generate_stream(
        &self,
        metadata: &CallMetadata,
        request: GenerationRequest,
    ) -> Result<CallOutcome<ResponseStream>> {
        let context = self.begin("generate_stream", metadata);
        let result = self.run_generate_stream(&context, request).await;
        let outcome = self.settle(&context, result)?;
        Ok(outcome.map(|chunks| self.classify_stream(context, chunks)))
    }

    /// Count tokens of every text, in input order
    #[instrument(name = "tokenize", skip_all, fields(request_id))]
    pub async fn tokenize(
        &self,
        metadata: &CallMetadata,
        request: TokenizeRequest,
    ) -> Result<CallOutcome<Vec<TokenizeOutput>>> {
        let context = self.begin("tokenize", metadata);
        let result = self.run_tokenize(request).await;
        self.settle(&context, result)
    }

    #[instrument(name = "model_info", skip_all, fields(request_id))]
    pub async fn model_info(&self, metadata: &CallMetadata) -> Result<CallOutcome<ModelInfo>> {
        let context = self.begin("model_info", metadata);
        let result = self.run_model_info();
        self.settle(&context, result)
    }

    fn begin(&self, method: &'static str, metadata: &CallMetadata) -> CallContext {
        let request_id = self.assigner.assign(metadata);
        Span::current().record("request_id", request_id.as_str());
        CallContext::new(request_id, method)
    }

    fn settle<T>(&self, context: &CallContext, result: Result<T>) -> Result<CallOutcome<T>> {
        match result {
            Ok(value) => Ok(CallOutcome::Completed(value)),
            Err(error) => self
                .classifier
                .handle(error, context)
                .map(CallOutcome::Suppressed),
        }
    }

    async fn run_generate(
        &self,
        context: &CallContext,
        request: GenerationRequest,
    ) -> Result<GenerationOutput> {
        let request = self.prepare(context, request).await?;
        aggregator::unary(&self.engine, request).await
    }

    async fn run_generate_batch(
        &self,
        context: &CallContext,
        request: BatchRequest,
    ) -> Result<Vec<GenerationOutput>> {
        validate_batch_size(request.prompts.len(), &self.config)?;
        let params = validate_params(request.params, &self.config)?;
        let adapter = self
            .adapters
            .resolve(request.adapter_id.as_deref())
            .await?;

        debug!("Dispatching batch of {} prompts", request.prompts.len());
        let requests = request
            .prompts
            .into_iter()
            .enumerate()
            .map(|(index, prompt)| EngineRequest {
                request_id: context.request_id.child(index),
                prompt,
                adapter: adapter.clone(),
                params: params.clone(),
            })
            .collect();
        aggregator::batch(&self.engine, requests).await
    }

    async fn run_generate_stream(
        &self,
        context: &CallContext,
        request: GenerationRequest,
    ) -> Result<ResponseStream> {
        let request = self.prepare(context, request).await?;
        aggregator::stream(&self.engine, request).await
    }

    async fn run_tokenize(&self, request: TokenizeRequest) -> Result<Vec<TokenizeOutput>> {
        let return_tokens = request.return_tokens;
        let engine = &self.engine;
        try_join_all(request.texts.iter().map(|text| async move {
            let tokenization = engine.tokenize(text, return_tokens).await?;
            Ok::<_, TgisError>(TokenizeOutput {
                token_count: tokenization.token_count,
                tokens: tokenization.tokens,
            })
        }))
        .await
    }

    fn run_model_info(&self) -> Result<ModelInfo> {
        if self.engine.health().is_dead() {
            return Err(EngineError::EngineDead("engine loop is not running".to_string()).into());
        }
        let mut info = self.engine.model_info();
        info.max_new_tokens = self.config.max_new_tokens_limit;
        Ok(info)
    }

    async fn prepare(
        &self,
        context: &CallContext,
        request: GenerationRequest,
    ) -> Result<EngineRequest> {
        let params = validate_params(request.params, &self.config)?;
        let adapter = self
            .adapters
            .resolve(request.adapter_id.as_deref())
            .await?;
        Ok(EngineRequest {
            request_id: context.request_id.clone(),
            prompt: request.prompt,
            adapter,
            params,
        })
    }

    fn classify_stream(&self, context: CallContext, chunks: ResponseStream) -> ResponseStream {
        let classifier = self.classifier.clone();
        let classified = async_stream::stream! {
            let mut chunks = chunks;
            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(chunk) => yield Ok(chunk),
                    Err(error) => {
                        if let Err(error) = classifier.handle(error, &context) {
                            yield Err(error);
                        }
                        return;
                    }
                }
            }
        };
        classified.boxed()
    }
}

/// Builder for creating dispatchers
pub struct DispatcherBuilder {
    engine: SharedEngine,
    config: AdapterConfig,
    adapters: Option<AdapterStore>,
    id_source: Option<IdSource>,
    shutdown: Option<ShutdownSignal>,
}

impl DispatcherBuilder {
    /// Create a new builder
    pub fn new(engine: SharedEngine) -> Self {
        Self {
            engine,
            config: AdapterConfig::default(),
            adapters: None,
            id_source: None,
            shutdown: None,
        }
    }

    /// Set the configuration
    pub fn config(mut self, config: AdapterConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a prepared adapter store instead of one built from the config
    pub fn adapter_store(mut self, adapters: AdapterStore) -> Self {
        self.adapters = Some(adapters);
        self
    }

    /// Draw generated request ids from `id_source`
    pub fn id_source(mut self, id_source: IdSource) -> Self {
        self.id_source = Some(id_source);
        self
    }

    /// Signal to trigger on engine-fatal failures, when the config asks for it
    pub fn shutdown_signal(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Build the dispatcher
    pub fn build(self) -> Dispatcher {
        let adapters = self
            .adapters
            .unwrap_or_else(|| AdapterStore::new(self.config.adapter_cache.clone()));
        let assigner = match self.id_source {
            Some(id_source) => CorrelationAssigner::with_id_source(id_source),
            None => CorrelationAssigner::new(),
        };

        let mut classifier = ErrorClassifier::new(self.engine.clone());
        if self.config.terminate_on_engine_fatal {
            if let Some(shutdown) = self.shutdown {
                classifier = classifier.with_shutdown(shutdown);
            }
        }

        Dispatcher {
            engine: self.engine,
            config: self.config,
            assigner,
            classifier,
            adapters,
        }
    }
}
