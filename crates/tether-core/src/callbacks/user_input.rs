//! Questions the agent asks the user

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A free-form or multiple-choice question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInputRequest {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_freeform: Option<bool>,
}

/// Context for a user input request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInputInvocation {
    pub session_id: String,
}

/// The user's answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInputResponse {
    /// Always present on the wire, possibly empty
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub was_freeform: bool,
}

impl UserInputResponse {
    pub fn choice(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            was_freeform: false,
        }
    }

    pub fn freeform(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            was_freeform: true,
        }
    }
}

/// Answers questions on behalf of the user
#[async_trait]
pub trait UserInputHandler: Send + Sync {
    async fn ask(
        &self,
        request: UserInputRequest,
        invocation: UserInputInvocation,
    ) -> anyhow::Result<UserInputResponse>;
}

#[async_trait]
impl<F, Fut> UserInputHandler for F
where
    F: Fn(UserInputRequest, UserInputInvocation) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<UserInputResponse>> + Send,
{
    async fn ask(
        &self,
        request: UserInputRequest,
        invocation: UserInputInvocation,
    ) -> anyhow::Result<UserInputResponse> {
        (self)(request, invocation).await
    }
}
