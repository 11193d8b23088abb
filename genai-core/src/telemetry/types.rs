use serde::Serialize;

/// Structured record of one completed (or failed) generation call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationLog {
    pub model: Option<String>,
    /// API verb, e.g. "generateContent" or "streamGenerateContent".
    pub verb: Option<String>,
    pub latency_ms: Option<u64>,

    pub finish_reason: Option<String>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,

    pub tokens_prompt: Option<u32>,
    pub tokens_completion: Option<u32>,
    pub tokens_total: Option<u32>,
}

impl GenerationLog {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn model(mut self, v: &str) -> Self {
        self.model = Some(v.to_string());
        self
    }
    pub fn verb(mut self, v: &str) -> Self {
        self.verb = Some(v.to_string());
        self
    }
    pub fn latency_ms(mut self, v: u64) -> Self {
        self.latency_ms = Some(v);
        self
    }
    pub fn finish_reason_opt(mut self, v: Option<&str>) -> Self {
        self.finish_reason = v.map(|s| s.to_string());
        self
    }
    pub fn error_kind(mut self, v: &str) -> Self {
        self.error_kind = Some(v.to_string());
        self
    }
    pub fn error_message(mut self, v: &str) -> Self {
        self.error_message = Some(v.to_string());
        self
    }
    pub fn tokens(mut self, p: Option<u32>, c: Option<u32>, t: Option<u32>) -> Self {
        self.tokens_prompt = p;
        self.tokens_completion = c;
        self.tokens_total = t;
        self
    }
}
