use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    Function,
}

/// One piece of a `Content`. The wire form is externally tagged, so a text
/// part serializes as `{"text": "..."}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    FunctionCall(FunctionCall),
    FunctionResponse(FunctionResponse),
    InlineData(Blob),
}

impl Part {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FunctionResponse {
    pub name: String,
    pub response: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    /// Base64-encoded bytes.
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user_text(s: impl Into<String>) -> Self {
        Self {
            role: Some(Role::User),
            parts: vec![Part::text(s)],
        }
    }

    pub fn model_text(s: impl Into<String>) -> Self {
        Self {
            role: Some(Role::Model),
            parts: vec![Part::text(s)],
        }
    }

    /// Concatenation of the text parts, in order. Non-text parts contribute
    /// nothing.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| p.as_text())
            .collect::<Vec<_>>()
            .concat()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmCategory {
    HarmCategoryUnspecified,
    HarmCategoryHarassment,
    HarmCategoryHateSpeech,
    HarmCategorySexuallyExplicit,
    HarmCategoryDangerousContent,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    HarmBlockThresholdUnspecified,
    BlockLowAndAbove,
    BlockMediumAndAbove,
    BlockOnlyHigh,
    BlockNone,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmProbability {
    HarmProbabilityUnspecified,
    Negligible,
    Low,
    Medium,
    High,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct SafetyRating {
    pub category: HarmCategory,
    pub probability: HarmProbability,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeclaration {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunctionCallingMode {
    ModeUnspecified,
    Auto,
    Any,
    None,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallingConfig {
    pub mode: FunctionCallingMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_function_names: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    pub function_calling_config: FunctionCallingConfig,
}

/// The per-call request body: caller-supplied contents plus whatever instance
/// configuration the facade merged in. Built fresh per call, never retained.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_settings: Option<Vec<SafetySetting>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    FinishReasonUnspecified,
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    Other,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockReason {
    BlockReasonUnspecified,
    Safety,
    Other,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_ratings: Option<Vec<SafetyRating>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<BlockReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_ratings: Option<Vec<SafetyRating>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_token_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates_token_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_token_count: Option<u32>,
}

/// One response unit. When streaming, each value carries only its own text
/// increment; the merged final response reuses the same type.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<Candidate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<PromptFeedback>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
}

impl GenerateContentResponse {
    /// Text of the first candidate. Empty when there are no candidates or no
    /// text parts.
    pub fn text(&self) -> String {
        self.candidates
            .as_deref()
            .and_then(|c| c.first())
            .and_then(|c| c.content.as_ref())
            .map(|c| c.text())
            .unwrap_or_default()
    }

    /// Function calls requested by the first candidate, in order.
    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.candidates
            .as_deref()
            .and_then(|c| c.first())
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| match p {
                        Part::FunctionCall(fc) => Some(fc),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.candidates
            .as_deref()
            .and_then(|c| c.first())
            .and_then(|c| c.finish_reason)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CountTokensRequest {
    pub contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CountTokensResponse {
    pub total_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    TaskTypeUnspecified,
    RetrievalQuery,
    RetrievalDocument,
    SemanticSimilarity,
    Classification,
    Clustering,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmbedContentRequest {
    /// Resource name of the embedding model, e.g. `models/text-embedding-004`.
    pub model: String,
    pub content: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContentEmbedding {
    pub values: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EmbedContentResponse {
    pub embedding: ContentEmbedding,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BatchEmbedContentsRequest {
    pub requests: Vec<EmbedContentRequest>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BatchEmbedContentsResponse {
    pub embeddings: Vec<ContentEmbedding>,
}

/// Accepts the heterogeneous caller inputs the generate/count operations
/// allow: bare text becomes a single user turn; structured contents pass
/// through; a full request is used as-is.
pub trait IntoRequest {
    fn into_request(self) -> GenerateContentRequest;
}

impl IntoRequest for &str {
    fn into_request(self) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::user_text(self)],
            ..Default::default()
        }
    }
}

impl IntoRequest for String {
    fn into_request(self) -> GenerateContentRequest {
        self.as_str().into_request()
    }
}

impl IntoRequest for Content {
    fn into_request(self) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![self],
            ..Default::default()
        }
    }
}

impl IntoRequest for Vec<Content> {
    fn into_request(self) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: self,
            ..Default::default()
        }
    }
}

impl IntoRequest for GenerateContentRequest {
    fn into_request(self) -> GenerateContentRequest {
        self
    }
}

/// Single-content inputs for embedding.
pub trait IntoContent {
    fn into_content(self) -> Content;
}

impl IntoContent for &str {
    fn into_content(self) -> Content {
        Content {
            role: None,
            parts: vec![Part::text(self)],
        }
    }
}

impl IntoContent for String {
    fn into_content(self) -> Content {
        self.as_str().into_content()
    }
}

impl IntoContent for Content {
    fn into_content(self) -> Content {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrip() {
        let req = GenerateContentRequest {
            contents: vec![Content::user_text("Hello")],
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part::text("be brief")],
            }),
            generation_config: Some(GenerationConfig {
                temperature: Some(0.7),
                max_output_tokens: Some(256),
                ..Default::default()
            }),
            safety_settings: Some(vec![SafetySetting {
                category: HarmCategory::HarmCategoryHarassment,
                threshold: HarmBlockThreshold::BlockOnlyHigh,
            }]),
            tools: None,
            tool_config: None,
            cached_content: Some("cachedContents/abc".into()),
        };

        let json = serde_json::to_string(&req).unwrap();
        let de: GenerateContentRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req, de);
    }

    #[test]
    fn wire_names_are_camel_case() {
        let req = GenerateContentRequest {
            contents: vec![Content::user_text("hi")],
            generation_config: Some(GenerationConfig {
                max_output_tokens: Some(8),
                ..Default::default()
            }),
            ..Default::default()
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"generationConfig\""));
        assert!(json.contains("\"maxOutputTokens\""));
        assert!(json.contains("\"role\":\"user\""));
    }

    #[test]
    fn part_is_externally_tagged() {
        let json = serde_json::to_string(&Part::text("hi")).unwrap();
        assert_eq!(json, r#"{"text":"hi"}"#);

        let fc: Part = serde_json::from_str(
            r#"{"functionCall":{"name":"get_weather","args":{"city":"Oslo"}}}"#,
        )
        .unwrap();
        match fc {
            Part::FunctionCall(fc) => assert_eq!(fc.name, "get_weather"),
            other => panic!("expected FunctionCall, got: {other:?}"),
        }
    }

    #[test]
    fn safety_enums_use_screaming_snake() {
        let s = SafetySetting {
            category: HarmCategory::HarmCategoryDangerousContent,
            threshold: HarmBlockThreshold::BlockMediumAndAbove,
        };
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("HARM_CATEGORY_DANGEROUS_CONTENT"));
        assert!(json.contains("BLOCK_MEDIUM_AND_ABOVE"));
    }

    #[test]
    fn response_text_concatenates_text_parts() {
        let resp = GenerateContentResponse {
            candidates: Some(vec![Candidate {
                content: Some(Content {
                    role: Some(Role::Model),
                    parts: vec![
                        Part::text("Hello"),
                        Part::FunctionCall(FunctionCall {
                            name: "noop".into(),
                            args: serde_json::Value::Null,
                        }),
                        Part::text(" world"),
                    ],
                }),
                finish_reason: Some(FinishReason::Stop),
                index: Some(0),
                safety_ratings: None,
            }]),
            prompt_feedback: None,
            usage_metadata: None,
        };
        assert_eq!(resp.text(), "Hello world");
        assert_eq!(resp.function_calls().len(), 1);
        assert_eq!(resp.finish_reason(), Some(FinishReason::Stop));
    }

    #[test]
    fn empty_response_has_empty_text() {
        let resp = GenerateContentResponse::default();
        assert_eq!(resp.text(), "");
        assert!(resp.function_calls().is_empty());
        assert_eq!(resp.finish_reason(), None);
    }

    #[test]
    fn into_request_from_text_builds_user_turn() {
        let req = "hi there".into_request();
        assert_eq!(req.contents.len(), 1);
        assert_eq!(req.contents[0].role, Some(Role::User));
        assert_eq!(req.contents[0].text(), "hi there");
        assert!(req.generation_config.is_none());
    }

    #[test]
    fn streamed_chunk_parses() {
        let json = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "par"}]},
                "index": 0
            }],
            "usageMetadata": {"promptTokenCount": 4, "totalTokenCount": 9}
        }"#;
        let chunk: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.text(), "par");
        assert_eq!(
            chunk.usage_metadata.unwrap().prompt_token_count,
            Some(4)
        );
    }
}
