use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use secrecy::{ExposeSecret, SecretString};

use crate::config::RequestOptions;
use crate::content::{
    BatchEmbedContentsRequest, BatchEmbedContentsResponse, BlockReason, CountTokensRequest,
    CountTokensResponse, EmbedContentRequest, EmbedContentResponse, GenerateContentRequest,
    GenerateContentResponse,
};
use crate::error::{CoreResult, GenAiError};
use crate::http_client::{HttpClient, SseLineStream};
use crate::stream::ResponseStream;

/// The remote-call seam. The model facade only talks to this trait, so tests
/// can substitute an in-memory implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        req: &GenerateContentRequest,
        opts: &RequestOptions,
    ) -> CoreResult<GenerateContentResponse>;

    /// Returns the raw chunk source as soon as response headers are available.
    async fn stream_generate(
        &self,
        model: &str,
        req: &GenerateContentRequest,
        opts: &RequestOptions,
    ) -> CoreResult<ResponseStream>;

    async fn count_tokens(
        &self,
        model: &str,
        req: &CountTokensRequest,
        opts: &RequestOptions,
    ) -> CoreResult<CountTokensResponse>;

    async fn embed_content(
        &self,
        model: &str,
        req: &EmbedContentRequest,
        opts: &RequestOptions,
    ) -> CoreResult<EmbedContentResponse>;

    async fn batch_embed_contents(
        &self,
        model: &str,
        req: &BatchEmbedContentsRequest,
        opts: &RequestOptions,
    ) -> CoreResult<BatchEmbedContentsResponse>;
}

/// REST transport against the generative-language API.
#[derive(Debug, Clone)]
pub struct RestTransport {
    http: HttpClient,
    api_key: SecretString,
}

impl RestTransport {
    pub fn new(http: HttpClient, api_key: SecretString) -> Self {
        Self { http, api_key }
    }

    fn url(&self, opts: &RequestOptions, model: &str, verb: &str) -> String {
        format!("{}/{}/{}:{}", opts.base_url(), opts.api_version(), model, verb)
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            (
                "x-goog-api-key".to_string(),
                self.api_key.expose_secret().to_string(),
            ),
            ("Content-Type".to_string(), "application/json".to_string()),
        ]
    }

    fn timeout(opts: &RequestOptions) -> Option<Duration> {
        opts.timeout_ms.map(Duration::from_millis)
    }

    async fn post<T: serde::Serialize + ?Sized, R: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &T,
        opts: &RequestOptions,
    ) -> CoreResult<R> {
        let owned_headers = self.headers();
        let hdrs: Vec<(&str, &str)> = owned_headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let (resp, _latency) = self
            .http
            .post_json::<_, R>(url, body, &hdrs, Self::timeout(opts))
            .await?;
        Ok(resp)
    }
}

fn block_reason_label(reason: BlockReason) -> &'static str {
    match reason {
        BlockReason::BlockReasonUnspecified => "BLOCK_REASON_UNSPECIFIED",
        BlockReason::Safety => "SAFETY",
        BlockReason::Other => "OTHER",
    }
}

/// A response with a block reason and no candidates carries no usable output;
/// surface it as an error instead.
fn check_blocked(resp: GenerateContentResponse) -> CoreResult<GenerateContentResponse> {
    let no_candidates = resp.candidates.as_deref().is_none_or(|c| c.is_empty());
    if no_candidates
        && let Some(feedback) = &resp.prompt_feedback
        && let Some(reason) = feedback.block_reason
    {
        return Err(GenAiError::Blocked {
            reason: block_reason_label(reason).to_string(),
        });
    }
    Ok(resp)
}

/// Decode an SSE line stream into response chunks. Blank lines and non-`data:`
/// fields are skipped; a `data:` payload that fails to decode yields an error
/// item at exactly that point in the stream.
fn decode_sse(lines: SseLineStream) -> ResponseStream {
    Box::pin(lines.filter_map(|item| async move {
        match item {
            Ok(line) => {
                let line = line.trim();
                let payload = line.strip_prefix("data:")?.trim_start();
                match serde_json::from_str::<GenerateContentResponse>(payload) {
                    Ok(chunk) => Some(check_blocked(chunk)),
                    Err(e) => Some(Err(GenAiError::Api {
                        code: "200".into(),
                        message: format!("malformed stream chunk: {e}"),
                    })),
                }
            }
            Err(e) => Some(Err(e)),
        }
    }))
}

#[async_trait]
impl Transport for RestTransport {
    async fn generate(
        &self,
        model: &str,
        req: &GenerateContentRequest,
        opts: &RequestOptions,
    ) -> CoreResult<GenerateContentResponse> {
        let url = self.url(opts, model, "generateContent");
        let resp: GenerateContentResponse = self.post(&url, req, opts).await?;
        check_blocked(resp)
    }

    async fn stream_generate(
        &self,
        model: &str,
        req: &GenerateContentRequest,
        opts: &RequestOptions,
    ) -> CoreResult<ResponseStream> {
        let url = self.url(opts, model, "streamGenerateContent?alt=sse");
        let owned_headers = self.headers();
        let hdrs: Vec<(&str, &str)> = owned_headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let lines = self
            .http
            .post_sse_lines(&url, req, &hdrs, Self::timeout(opts))
            .await?;
        Ok(decode_sse(lines))
    }

    async fn count_tokens(
        &self,
        model: &str,
        req: &CountTokensRequest,
        opts: &RequestOptions,
    ) -> CoreResult<CountTokensResponse> {
        let url = self.url(opts, model, "countTokens");
        self.post(&url, req, opts).await
    }

    async fn embed_content(
        &self,
        model: &str,
        req: &EmbedContentRequest,
        opts: &RequestOptions,
    ) -> CoreResult<EmbedContentResponse> {
        let url = self.url(opts, model, "embedContent");
        self.post(&url, req, opts).await
    }

    async fn batch_embed_contents(
        &self,
        model: &str,
        req: &BatchEmbedContentsRequest,
        opts: &RequestOptions,
    ) -> CoreResult<BatchEmbedContentsResponse> {
        let url = self.url(opts, model, "batchEmbedContents");
        self.post(&url, req, opts).await
    }
}
