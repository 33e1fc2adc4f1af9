use futures::StreamExt;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tgis::{AdapterConfig, CORRELATION_HEADER, Dispatcher, EchoEngine, SharedEngine};
use tgis_grpc::pb::generation_service_client::GenerationServiceClient;
use tgis_grpc::pb::{
    self, BatchedGenerationRequest, BatchedTokenizeRequest, ModelInfoRequest, Parameters,
    SingleGenerationRequest, StoppingCriteria,
};
use tokio::net::TcpListener;
use tonic::transport::Channel;
use tonic::{Code, Request};

const REFERENCE_PROMPT: &str = "The answer to life the universe and everything is ";

/// Collects formatted log output of the current thread
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    fn install(&self) -> tracing::subscriber::DefaultGuard {
        let capture = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || capture.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    fn lines(&self) -> Vec<String> {
        let buf = self.0.lock().unwrap();
        String::from_utf8_lossy(&buf)
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn count(&self, needle: &str) -> usize {
        self.lines()
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Start a server on an ephemeral port and connect a client to it
async fn start_server(
    engine: SharedEngine,
    config: AdapterConfig,
) -> GenerationServiceClient<Channel> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let dispatcher = Arc::new(Dispatcher::builder(engine).config(config).build());
    tokio::spawn(tgis_grpc::serve(
        dispatcher,
        listener,
        std::future::pending(),
    ));

    GenerationServiceClient::connect(format!("http://{}", addr))
        .await
        .unwrap()
}

async fn echo_client() -> GenerationServiceClient<Channel> {
    let config = AdapterConfig::default();
    start_server(Arc::new(EchoEngine::from_config(&config)), config).await
}

fn batch(prompts: &[&str]) -> BatchedGenerationRequest {
    BatchedGenerationRequest {
        model_id: "echo".to_string(),
        requests: prompts
            .iter()
            .map(|text| pb::GenerationRequest {
                text: text.to_string(),
            })
            .collect(),
        ..Default::default()
    }
}

fn single(prompt: &str) -> SingleGenerationRequest {
    SingleGenerationRequest {
        model_id: "echo".to_string(),
        request: Some(pb::GenerationRequest {
            text: prompt.to_string(),
        }),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_generation_request() {
    let mut client = echo_client().await;

    let response = client
        .generate(batch(&[REFERENCE_PROMPT]))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.responses.len(), 1);
    let response = &response.responses[0];
    assert!(!response.text.is_empty());
    assert_eq!(response.generated_token_count, 10);
    assert_eq!(response.stop_reason(), pb::StopReason::MaxTokens);
}

#[tokio::test]
async fn test_tokenize_request() {
    let mut client = echo_client().await;

    let response = client
        .tokenize(BatchedTokenizeRequest {
            model_id: "echo".to_string(),
            requests: vec![pb::TokenizeRequest {
                text: "Please answer the following question.\nhow far is Paris from New York?"
                    .to_string(),
            }],
            return_tokens: false,
        })
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.responses.len(), 1);
    assert!(response.responses[0].token_count > 0);
}

#[tokio::test]
async fn test_generation_request_stream() {
    let mut client = echo_client().await;

    let chunks: Vec<_> = client
        .generate_stream(single(REFERENCE_PROMPT))
        .await
        .unwrap()
        .into_inner()
        .map(|chunk| chunk.unwrap())
        .collect()
        .await;

    assert_eq!(chunks.len(), 11);
    assert_eq!(chunks[0].input_token_count, Some(10));
    let text: String = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
    assert!(!text.is_empty());
    assert_eq!(chunks[10].stop_reason(), pb::StopReason::MaxTokens);
}

#[tokio::test]
async fn test_batched_generation_request() {
    let mut client = echo_client().await;

    let response = client
        .generate(batch(&[REFERENCE_PROMPT, "Medicinal herbs "]))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.responses.len(), 2);
    assert!(response.responses.iter().all(|r| !r.text.is_empty()));
    assert!(response.responses[1].text.starts_with("Medicinal"));
}

#[tokio::test]
async fn test_lora_request() {
    let root = tempfile::tempdir().unwrap();
    let adapter_dir = root.path().join("my-lora");
    std::fs::create_dir_all(&adapter_dir).unwrap();
    std::fs::write(
        adapter_dir.join("adapter_config.json"),
        r#"{"peft_type": "LORA", "r": 8}"#,
    )
    .unwrap();
    let config = AdapterConfig {
        adapter_cache: Some(root.path().to_path_buf()),
        ..Default::default()
    };
    let mut client = start_server(Arc::new(EchoEngine::from_config(&config)), config).await;

    let mut request = batch(&["hello"]);
    request.adapter_id = Some("my-lora".to_string());
    let response = client.generate(request).await.unwrap().into_inner();
    assert!(!response.responses[0].text.is_empty());

    let mut request = batch(&["hello"]);
    request.adapter_id = Some("unknown-lora".to_string());
    let status = client.generate(request).await.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn test_request_id_from_metadata() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let mut client = echo_client().await;

    let mut request = Request::new(batch(&[REFERENCE_PROMPT]));
    request
        .metadata_mut()
        .insert(CORRELATION_HEADER, "dummy-correlation-id".parse().unwrap());
    let response = client.generate(request).await.unwrap().into_inner();
    assert!(!response.responses[0].text.is_empty());
    assert_eq!(logs.count("correlation_id=dummy-correlation-id"), 1);

    let response = client
        .generate(batch(&[REFERENCE_PROMPT]))
        .await
        .unwrap()
        .into_inner();
    assert!(!response.responses[0].text.is_empty());
    assert_eq!(logs.count("correlation_id=None"), 1);
    assert_eq!(logs.count("Request received"), 2);
}

#[tokio::test]
async fn test_invalid_parameters() {
    let mut client = echo_client().await;

    let mut request = batch(&["hello"]);
    request.params = Some(Parameters {
        stopping: Some(StoppingCriteria {
            max_new_tokens: 100_000,
            ..Default::default()
        }),
        ..Default::default()
    });
    let status = client.generate(request).await.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    let mut request = single("hello");
    request.prefix_id = Some("my-prefix".to_string());
    let status = client.generate_stream(request).await.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn test_dead_engine_ends_calls_quietly() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let echo = Arc::new(EchoEngine::new());
    echo.kill("foo:bar");
    let mut client = start_server(echo, AdapterConfig::default()).await;

    let response = client
        .generate(batch(&[REFERENCE_PROMPT]))
        .await
        .unwrap()
        .into_inner();
    assert!(response.responses.is_empty());

    let chunks: Vec<_> = client
        .generate_stream(single(REFERENCE_PROMPT))
        .await
        .unwrap()
        .into_inner()
        .collect()
        .await;
    assert!(chunks.is_empty());

    assert_eq!(logs.count("foo:bar"), 2);
}

#[tokio::test]
async fn test_model_info() {
    let mut client = echo_client().await;

    let info = client
        .model_info(ModelInfoRequest {
            model_id: "echo".to_string(),
        })
        .await
        .unwrap()
        .into_inner();

    assert_eq!(info.model_kind(), pb::model_info_response::ModelKind::DecoderOnly);
    assert_eq!(info.max_sequence_length, 2048);
    assert_eq!(info.max_new_tokens, 1024);
}
