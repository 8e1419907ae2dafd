//! Prompting a language model to sort followed profiles into lists

use std::sync::Arc;
use tracing::{debug, info};

use crate::llm::{ChatRequest, LlmProvider, LlmResult, Message};

const CURATOR_INSTRUCTIONS: &str = "You help a Bluesky user organize the profiles they follow \
into the lists they already own. A profile may belong to several lists. Leave out profiles \
that fit no list and name them separately at the end. Do not invent new lists. Answer with \
one section per list: the list name in bold followed by one profile name per line.";

pub struct ListCurator {
    provider: Arc<dyn LlmProvider>,
    temperature: f32,
}

impl ListCurator {
    pub fn new(provider: Arc<dyn LlmProvider>, temperature: f32) -> Self {
        Self {
            provider,
            temperature,
        }
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// Ask for a distribution of `users_json` profiles over the `lists_json` lists
    pub async fn suggest(&self, users_json: &str, lists_json: &str) -> LlmResult<String> {
        let request = ChatRequest::new(vec![
            Message::new_system(CURATOR_INSTRUCTIONS),
            Message::new_user(format!(
                "These are the profiles I follow: {}. These are my lists: {}. \
                 Please sort the profiles into the lists.",
                users_json, lists_json
            )),
        ])
        .with_temperature(self.temperature);

        debug!(
            "Requesting suggestions from {} ({})",
            self.provider.name(),
            self.provider.model()
        );
        let response = self.provider.chat_completion(request).await?;
        info!("Received suggestions ({} tokens)", response.usage.total_tokens);

        Ok(response.content)
    }
}
