use crate::store::StoredConversation;
use crate::utils::extract_directive;
use tracing::info;

const ROLE_PLAY_TEMPLATE: &str = "You are an AI assistant playing the character described below.\n\
                                  Follow the character settings completely and stay in character for the whole conversation.\n\
                                  Keep the conversation natural, the way this character would talk.\n\
                                  Reply in plain text without Markdown, in the language the other person uses.\n\n\
                                  # Character\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePrompt {
    /// Character text in force for this reply.
    pub prompt: String,
    /// Directive found in the incoming post, if any.
    pub new_directive: Option<String>,
}

/// Directive in the mention, then the conversation's recorded directive, then
/// its recorded prompt, then the configured default character.
pub fn determine_active_prompt(
    text: &str,
    history: Option<&StoredConversation>,
    default_character: &str,
) -> ActivePrompt {
    if let Some(directive) = extract_directive(text) {
        info!("Custom directive detected: {}", directive);
        return ActivePrompt {
            prompt: directive.clone(),
            new_directive: Some(directive),
        };
    }

    let recorded_directive = history
        .and_then(|h| h.custom_directive.as_deref())
        .filter(|s| !s.is_empty());
    let recorded_prompt = history
        .and_then(|h| h.active_prompt.as_deref())
        .filter(|s| !s.is_empty());

    let prompt = if let Some(directive) = recorded_directive {
        info!("Using existing custom directive: {}", directive);
        directive.to_string()
    } else if let Some(prompt) = recorded_prompt {
        info!("Using existing saved prompt");
        prompt.to_string()
    } else {
        info!("Using default character prompt");
        default_character.to_string()
    };

    ActivePrompt {
        prompt,
        new_directive: None,
    }
}

pub fn build_system_prompt(character: &str) -> String {
    let mut preamble = String::with_capacity(ROLE_PLAY_TEMPLATE.len() + character.len());
    preamble.push_str(ROLE_PLAY_TEMPLATE);
    preamble.push_str(character);
    preamble
}
