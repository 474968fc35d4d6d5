use crate::config::Config;
use anyhow::Result;
pub use preamble::{build_system_prompt, determine_active_prompt};
use rig::providers::{anthropic, gemini, openai};
pub use rig_agent::Generator;
use rig_agent::RigGenerator;
use std::sync::Arc;

mod preamble;
mod rig_agent;

pub fn create_generator(config: &Config) -> Result<Arc<dyn Generator>> {
    match config.api_provider.as_str() {
        "openai" => {
            let client: openai::CompletionsClient = openai::CompletionsClient::builder()
                .api_key(&config.api_key)
                .base_url(&config.api_url)
                .build()?;
            Ok(Arc::new(RigGenerator::new(&config.model, client)))
        }
        "gemini" => {
            let client = gemini::Client::new(&config.api_key)?;
            Ok(Arc::new(RigGenerator::new(&config.model, client)))
        }
        _ => {
            let client: anthropic::Client = anthropic::Client::builder()
                .api_key(&config.api_key)
                .base_url(&config.api_url)
                .build()?;
            Ok(Arc::new(RigGenerator::new(&config.model, client)))
        }
    }
}
