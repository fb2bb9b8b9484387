//! Terminal prompt used by `auth login` to read a pasted redirect URL or code.

use async_trait::async_trait;
use dialoguer::Input;
use runbox_core::error::OAuthError;
use runbox_core::oauth::LoginPrompt;

pub struct TerminalPrompt;

#[async_trait]
impl LoginPrompt for TerminalPrompt {
    async fn prompt(&self, message: &str) -> Result<String, OAuthError> {
        println!("{message}");
        println!();

        let answer = tokio::task::spawn_blocking(|| {
            Input::<String>::new()
                .with_prompt("Redirect URL or code")
                .interact_text()
        })
        .await
        .map_err(|e| OAuthError::Prompt {
            message: e.to_string(),
        })?;

        answer.map_err(|e| OAuthError::Prompt {
            message: e.to_string(),
        })
    }
}
