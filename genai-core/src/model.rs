use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::SecretString;

use crate::chat::{ChatSession, StartChatParams};
use crate::config::{ClientConfig, RequestOptions};
use crate::content::{
    BatchEmbedContentsRequest, BatchEmbedContentsResponse, Content, CountTokensRequest,
    CountTokensResponse, EmbedContentRequest, EmbedContentResponse, FinishReason,
    GenerateContentRequest, GenerateContentResponse, GenerationConfig, IntoContent, IntoRequest,
    SafetySetting, Tool, ToolConfig,
};
use crate::error::{CoreResult, GenAiError};
use crate::http_client::HttpClient;
use crate::normalize::normalize_request;
use crate::stream::{StreamCallbacks, StreamResult, wrap};
use crate::transport::{RestTransport, Transport};

static MODEL_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("model name regex"));

/// A bare model name becomes a `models/` resource; already-qualified
/// `models/` and `tunedModels/` names pass through.
fn normalize_model_name(name: &str) -> CoreResult<String> {
    let (prefix, bare) = match name.split_once('/') {
        Some(("models", rest)) => ("models", rest),
        Some(("tunedModels", rest)) => ("tunedModels", rest),
        Some((other, _)) => {
            return Err(GenAiError::Validation(format!(
                "unknown model resource collection '{other}'"
            )));
        }
        None => ("models", name),
    };
    if !MODEL_NAME_RE.is_match(bare) {
        return Err(GenAiError::Validation(format!(
            "invalid model name '{name}'"
        )));
    }
    Ok(format!("{prefix}/{bare}"))
}

/// Entry point: owns the HTTP client and the API key, hands out model facades.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    defaults: RequestOptions,
}

impl Client {
    pub fn new(api_key: impl Into<String>) -> CoreResult<Self> {
        let http = HttpClient::new_default()?;
        Ok(Self {
            transport: Arc::new(RestTransport::new(http, SecretString::from(api_key.into()))),
            defaults: RequestOptions::default(),
        })
    }

    /// Build a client from a loaded config; the API key is read from the
    /// environment variable the config names.
    pub fn from_config(cfg: &ClientConfig) -> CoreResult<Self> {
        let api_key = std::env::var(&cfg.api_key_env).map_err(|_| {
            GenAiError::Validation(format!("environment variable {} not set", cfg.api_key_env))
        })?;
        let http = HttpClient::from_cfg(&cfg.http)?;
        Ok(Self {
            transport: Arc::new(RestTransport::new(http, SecretString::from(api_key))),
            defaults: RequestOptions {
                timeout_ms: None,
                api_version: cfg.api_version.clone(),
                base_url: cfg.base_url.clone(),
            },
        })
    }

    #[cfg(test)]
    pub(crate) fn with_transport_for_tests(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            defaults: RequestOptions::default(),
        }
    }

    pub fn generative_model(&self, params: ModelParams) -> CoreResult<GenerativeModel> {
        let model = normalize_model_name(&params.model)?;
        Ok(GenerativeModel {
            transport: Arc::clone(&self.transport),
            model,
            generation_config: params.generation_config,
            safety_settings: params.safety_settings,
            tools: params.tools,
            tool_config: params.tool_config,
            system_instruction: params.system_instruction,
            cached_content: params.cached_content,
            request_options: params.request_options.merge_over(&self.defaults),
        })
    }
}

/// Persistent configuration for one model facade.
#[derive(Debug, Clone, Default)]
pub struct ModelParams {
    pub model: String,
    pub generation_config: Option<GenerationConfig>,
    pub safety_settings: Option<Vec<SafetySetting>>,
    pub tools: Option<Vec<Tool>>,
    pub tool_config: Option<ToolConfig>,
    pub system_instruction: Option<Content>,
    pub cached_content: Option<String>,
    pub request_options: RequestOptions,
}

impl ModelParams {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }
}

/// Configured handle on one remote model. Holds the persistent settings so
/// callers don't repeat them per call; cheap to clone.
#[derive(Clone)]
pub struct GenerativeModel {
    transport: Arc<dyn Transport>,
    model: String,
    generation_config: Option<GenerationConfig>,
    safety_settings: Option<Vec<SafetySetting>>,
    tools: Option<Vec<Tool>>,
    tool_config: Option<ToolConfig>,
    system_instruction: Option<Content>,
    cached_content: Option<String>,
    request_options: RequestOptions,
}

fn finish_reason_label(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::FinishReasonUnspecified => "FINISH_REASON_UNSPECIFIED",
        FinishReason::Stop => "STOP",
        FinishReason::MaxTokens => "MAX_TOKENS",
        FinishReason::Safety => "SAFETY",
        FinishReason::Recitation => "RECITATION",
        FinishReason::Other => "OTHER",
    }
}

impl GenerativeModel {
    /// Fully-qualified resource name, e.g. `models/gemini-pro`.
    pub fn name(&self) -> &str {
        &self.model
    }

    /// Merge instance configuration into a per-call request: call-scoped
    /// fields win, instance fields fill the gaps.
    fn merge_request(&self, mut req: GenerateContentRequest) -> GenerateContentRequest {
        if req.generation_config.is_none() {
            req.generation_config = self.generation_config.clone();
        }
        if req.safety_settings.is_none() {
            req.safety_settings = self.safety_settings.clone();
        }
        if req.tools.is_none() {
            req.tools = self.tools.clone();
        }
        if req.tool_config.is_none() {
            req.tool_config = self.tool_config.clone();
        }
        if req.system_instruction.is_none() {
            req.system_instruction = self.system_instruction.clone();
        }
        if req.cached_content.is_none() {
            req.cached_content = self.cached_content.clone();
        }
        normalize_request(req)
    }

    fn merge_options(&self, opts: Option<&RequestOptions>) -> RequestOptions {
        match opts {
            Some(o) => o.merge_over(&self.request_options),
            None => self.request_options.clone(),
        }
    }

    /// One-shot generation; suspends until the complete response is available.
    pub async fn generate_content(
        &self,
        request: impl IntoRequest,
        options: Option<&RequestOptions>,
    ) -> CoreResult<GenerateContentResponse> {
        let req = self.merge_request(request.into_request());
        let opts = self.merge_options(options);
        tracing::debug!(model = %self.model, contents = req.contents.len(), "generate_content");

        let start = Instant::now();
        let result = self.transport.generate(&self.model, &req, &opts).await;
        let latency = start.elapsed().as_millis() as u64;

        let mut log = crate::telemetry::GenerationLog::new()
            .model(&self.model)
            .verb("generateContent")
            .latency_ms(latency);
        match &result {
            Ok(resp) => {
                let usage = resp.usage_metadata.unwrap_or_default();
                log = log
                    .finish_reason_opt(resp.finish_reason().map(finish_reason_label))
                    .tokens(
                        usage.prompt_token_count,
                        usage.candidates_token_count,
                        usage.total_token_count,
                    );
            }
            Err(e) => {
                log = log.error_kind(error_kind(e)).error_message(&e.to_string());
            }
        }
        crate::telemetry::emit(log);
        result
    }

    /// Streaming generation without callbacks. Returns as soon as the stream
    /// is established; the chunk stream and final-response handle are both
    /// live from that point.
    pub async fn generate_content_stream(
        &self,
        request: impl IntoRequest,
        options: Option<&RequestOptions>,
    ) -> CoreResult<StreamResult> {
        self.generate_content_stream_with(request, options, StreamCallbacks::new())
            .await
    }

    /// Streaming generation with optional progress callbacks; see
    /// [`crate::stream::wrap`] for the callback semantics.
    pub async fn generate_content_stream_with(
        &self,
        request: impl IntoRequest,
        options: Option<&RequestOptions>,
        callbacks: StreamCallbacks,
    ) -> CoreResult<StreamResult> {
        let req = self.merge_request(request.into_request());
        let opts = self.merge_options(options);
        tracing::debug!(model = %self.model, contents = req.contents.len(), "generate_content_stream");

        let start = Instant::now();
        let result = self.transport.stream_generate(&self.model, &req, &opts).await;
        // Latency here is time-to-headers; chunk timings belong to the consumer.
        let latency = start.elapsed().as_millis() as u64;

        let mut log = crate::telemetry::GenerationLog::new()
            .model(&self.model)
            .verb("streamGenerateContent")
            .latency_ms(latency);
        if let Err(e) = &result {
            log = log.error_kind(error_kind(e)).error_message(&e.to_string());
        }
        crate::telemetry::emit(log);

        let source = result?;
        Ok(wrap(StreamResult::drive(source), callbacks))
    }

    pub async fn count_tokens(
        &self,
        request: impl IntoRequest,
        options: Option<&RequestOptions>,
    ) -> CoreResult<CountTokensResponse> {
        let req = CountTokensRequest {
            contents: self.merge_request(request.into_request()).contents,
        };
        let opts = self.merge_options(options);
        self.transport.count_tokens(&self.model, &req, &opts).await
    }

    pub async fn embed_content(
        &self,
        content: impl IntoContent,
        options: Option<&RequestOptions>,
    ) -> CoreResult<EmbedContentResponse> {
        let req = EmbedContentRequest {
            model: self.model.clone(),
            content: content.into_content(),
            task_type: None,
            title: None,
        };
        let opts = self.merge_options(options);
        self.transport.embed_content(&self.model, &req, &opts).await
    }

    /// Batch embedding; requests with an empty model field inherit this
    /// facade's model.
    pub async fn batch_embed_contents(
        &self,
        mut requests: Vec<EmbedContentRequest>,
        options: Option<&RequestOptions>,
    ) -> CoreResult<BatchEmbedContentsResponse> {
        for r in &mut requests {
            if r.model.is_empty() {
                r.model = self.model.clone();
            }
        }
        let req = BatchEmbedContentsRequest { requests };
        let opts = self.merge_options(options);
        self.transport
            .batch_embed_contents(&self.model, &req, &opts)
            .await
    }

    /// Start a multi-turn chat session seeded with this facade's
    /// configuration snapshot.
    pub fn start_chat(&self, params: StartChatParams) -> ChatSession {
        ChatSession::new(self.clone(), params)
    }
}

fn error_kind(e: &GenAiError) -> &'static str {
    match e {
        GenAiError::Validation(_) => "validation",
        GenAiError::RateLimited { .. } => "rate_limited",
        GenAiError::Unavailable => "unavailable",
        GenAiError::Api { .. } => "api",
        GenAiError::Blocked { .. } => "blocked",
        GenAiError::Io(_) => "io",
        GenAiError::Other(_) => "other",
    }
}
