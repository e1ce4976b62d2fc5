use std::future::Future;

use ghost_types::{IdentityId, Message};

pub const ASSISTANT_ID: &str = "the-oracle";
pub const ASSISTANT_NAME: &str = "The Oracle";
pub const ASSISTANT_COLOR: &str = "violet";
/// Mention that summons the assistant.
pub const SUMMON_TAG: &str = "@oracle";
/// Reply prefix when no model could be reached.
pub const FAILURE_SENTINEL: &str = "The Void rejects all frequencies.";

/// Distinct sender names passed along as context.
const CONTEXT_NAMES: usize = 8;

/// Text-in, text-out assistant. Implementations never fail: on error they
/// return a reply starting with [`FAILURE_SENTINEL`].
pub trait AssistantBridge: Send + Sync + 'static {
    fn ask(&self, prompt: String) -> impl Future<Output = String> + Send;
}

pub fn assistant_identity() -> IdentityId {
    IdentityId::new(ASSISTANT_ID)
}

/// Whether a message should wake the assistant.
pub fn is_summoned(text: &str, replying_to_assistant: bool) -> bool {
    replying_to_assistant || text.to_lowercase().contains(SUMMON_TAG)
}

/// Most recent distinct human sender names, newest first.
pub fn recent_names(messages: &[Message]) -> Vec<String> {
    let assistant = assistant_identity();
    let mut names: Vec<String> = Vec::new();
    for message in messages.iter().rev() {
        if message.is_from(&assistant) || message.sender_name.is_empty() {
            continue;
        }
        if !names.contains(&message.sender_name) {
            names.push(message.sender_name.clone());
        }
        if names.len() == CONTEXT_NAMES {
            break;
        }
    }
    names
}

/// Prompt sent across the bridge.
pub fn build_prompt(
    speaker: &str,
    text: &str,
    names: &[String],
    prior_reply: Option<&str>,
) -> String {
    let mut prompt = String::from(
        "You are \"The Oracle\", a laid-back digital spirit lurking in an anonymous group chat. \
         You are sarcastic but never cruel, you enjoy gossip, and you answer casually and \
         with a few emojis.\n\n\
         You may add at most one of these tokens to your reply:\n\
         - [POLL: \"Question\", \"Option 1\", \"Option 2\"] to start a group vote\n\
         - [VOTE_KICK: Name] when someone is genuinely wrecking the chat\n\
         - [GAME: DICE], [GAME: COIN] or [GAME: TOD] to start a quick game\n",
    );
    if !names.is_empty() {
        prompt.push_str(&format!("\nPeople in the chat: {}\n", names.join(", ")));
    }
    if let Some(prior) = prior_reply {
        prompt.push_str(&format!("\nYou previously said: \"{prior}\"\n"));
    }
    prompt.push_str(&format!("\n{speaker} said: \"{text}\"\n"));
    prompt
}
