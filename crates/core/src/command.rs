use std::sync::{Arc, PoisonError, RwLock};

/// Literal marker that turns a chat message into a generation command.
pub const DEFAULT_TRIGGER_PREFIX: &str = "/B ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandMatch<'a> {
    /// The message was written by the bot itself.
    SelfAuthored,
    NoTrigger,
    Command { argument: &'a str },
}

impl<'a> CommandMatch<'a> {
    pub fn argument(&self) -> Option<&'a str> {
        match self {
            Self::Command { argument } => Some(argument),
            Self::SelfAuthored | Self::NoTrigger => None,
        }
    }
}

/// The bot's own user id, shared between the gateway (which learns it when
/// the session becomes ready) and the command detector.
#[derive(Clone, Debug, Default)]
pub struct BotIdentity {
    user_id: Arc<RwLock<Option<String>>>,
}

impl BotIdentity {
    /// An empty id leaves the identity unknown.
    pub fn new(user_id: impl Into<String>) -> Self {
        let identity = Self::default();
        identity.set(user_id);
        identity
    }

    pub fn set(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        let mut slot = self.user_id.write().unwrap_or_else(PoisonError::into_inner);
        *slot = (!user_id.is_empty()).then_some(user_id);
    }

    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is(&self, author_id: &str) -> bool {
        self.user_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            .is_some_and(|user_id| user_id == author_id)
    }
}

impl From<&str> for BotIdentity {
    fn from(user_id: &str) -> Self {
        Self::new(user_id)
    }
}

impl From<String> for BotIdentity {
    fn from(user_id: String) -> Self {
        Self::new(user_id)
    }
}

#[derive(Clone, Debug)]
pub struct CommandDetector {
    trigger_prefix: String,
    identity: BotIdentity,
}

impl CommandDetector {
    pub fn new(trigger_prefix: impl Into<String>, identity: impl Into<BotIdentity>) -> Self {
        Self { trigger_prefix: trigger_prefix.into(), identity: identity.into() }
    }

    /// Returns the text after the trigger prefix, untrimmed. An empty
    /// remainder is still a command.
    pub fn detect<'a>(&self, author_id: &str, content: &'a str) -> CommandMatch<'a> {
        if self.identity.is(author_id) {
            return CommandMatch::SelfAuthored;
        }

        match content.strip_prefix(self.trigger_prefix.as_str()) {
            Some(argument) => CommandMatch::Command { argument },
            None => CommandMatch::NoTrigger,
        }
    }
}
