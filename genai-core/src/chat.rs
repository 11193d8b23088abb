use crate::config::RequestOptions;
use crate::content::{Content, GenerateContentResponse, IntoContent, Role};
use crate::error::{CoreResult, GenAiError};
use crate::model::GenerativeModel;

/// Seed state for a chat session.
#[derive(Debug, Clone, Default)]
pub struct StartChatParams {
    /// Prior turns, oldest first. Must alternate user/model if supplied.
    pub history: Vec<Content>,
}

/// Multi-turn conversation over one model facade. Holds the transcript;
/// each `send_message` replays it in full, so the remote side stays
/// stateless.
pub struct ChatSession {
    model: GenerativeModel,
    history: Vec<Content>,
}

impl ChatSession {
    pub(crate) fn new(model: GenerativeModel, params: StartChatParams) -> Self {
        Self {
            model,
            history: params.history,
        }
    }

    /// The transcript so far, oldest turn first.
    pub fn history(&self) -> &[Content] {
        &self.history
    }

    /// Send one user turn and wait for the model's reply. Both turns are
    /// committed to history only after a successful response with a
    /// non-empty candidate; on failure the transcript is unchanged.
    pub async fn send_message(
        &mut self,
        message: impl IntoContent,
        options: Option<&RequestOptions>,
    ) -> CoreResult<GenerateContentResponse> {
        let mut user_turn = message.into_content();
        user_turn.role = Some(Role::User);

        let mut contents = self.history.clone();
        contents.push(user_turn.clone());

        let response = self.model.generate_content(contents, options).await?;

        let mut reply = response
            .candidates
            .as_deref()
            .and_then(|c| c.first())
            .and_then(|c| c.content.clone())
            .ok_or_else(|| {
                GenAiError::Validation("response carried no candidate content".into())
            })?;
        reply.role = Some(Role::Model);

        self.history.push(user_turn);
        self.history.push(reply);
        Ok(response)
    }
}
