//! Structured (JSON) output mode on top of plain chat completion

use super::{ChatMessage, LLMClient};
use crate::error::{RagError, Result};
use serde::de::DeserializeOwned;

/// Pull the JSON object out of a model reply.
///
/// A reply wrapped in a ``` fence is unwrapped first; otherwise the outermost
/// `{..}` is taken as is, so fences inside string values survive.
pub fn extract_json(response: &str) -> Option<&str> {
    let trimmed = response.trim();
    let body = match trimmed.strip_prefix("```") {
        Some(rest) => {
            // Drop the language tag line and the closing fence
            let rest = rest.split_once('\n').map_or(rest, |(_, tail)| tail);
            rest.rfind("```").map_or(rest, |end| &rest[..end])
        }
        None => trimmed,
    };

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| body[start..=end].trim())
}

/// Parse a model reply into `T`
pub fn parse_structured<T: DeserializeOwned>(response: &str) -> Result<T> {
    let json = extract_json(response)
        .ok_or_else(|| RagError::Llm("No JSON object in model response".to_string()))?;

    serde_json::from_str(json).map_err(|e| {
        tracing::debug!("Response was: {}", response);
        RagError::Llm(format!("Invalid structured output: {}", e))
    })
}

/// Ask the model for a JSON value matching `T`.
///
/// The schema lives in the system prompt; the reply is parsed leniently.
pub async fn structured_completion<T: DeserializeOwned>(
    client: &dyn LLMClient,
    system: &str,
    user: String,
) -> Result<T> {
    let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
    let response = client.chat_completion(messages).await?;
    parse_structured(&response)
}
