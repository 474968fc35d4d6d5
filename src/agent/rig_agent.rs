use anyhow::Result;
use async_trait::async_trait;
use rig::{client::CompletionClient, completion::Prompt};
use tracing::info;

const MAX_TOKENS: u64 = 4096;

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, system_prompt: &str, prompt: &str) -> Result<String>;
}

pub struct RigGenerator<C: CompletionClient> {
    model: String,
    client: C,
}

impl<C: CompletionClient> RigGenerator<C> {
    pub fn new(model: impl Into<String>, client: C) -> Self {
        Self {
            model: model.into(),
            client,
        }
    }
}

#[async_trait]
impl<C> Generator for RigGenerator<C>
where
    C: CompletionClient + Send + Sync,
    C::CompletionModel: 'static,
{
    async fn generate(&self, system_prompt: &str, prompt: &str) -> Result<String> {
        let agent = self
            .client
            .agent(&self.model)
            .preamble(system_prompt)
            .max_tokens(MAX_TOKENS)
            .build();

        let response = agent.prompt(prompt).await?.to_string();
        let response = response.trim().to_string();
        info!("Model response received ({} chars)", response.chars().count());
        Ok(response)
    }
}
