//! # Incoming messages and routed events.
//!
//! The transport and identity model live outside this crate; a [`Message`]
//! carries only what the continuation core needs:
//! - the sender identity and (optionally) the channel it was said in,
//! - the raw text handed to the router,
//! - an optional [`Reply`] capability used for diagnostics.
//!
//! A [`RoutedEvent`] is a message after routing: the pattern it matched and
//! the parameters extracted by the router.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Parameters extracted by the router (`:page` → `"2"`).
pub type Params = BTreeMap<String, String>;

/// Identity/channel context restricting who may resume a wait.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    /// A single user, wherever they speak.
    User(Arc<str>),
    /// Anyone speaking in a channel.
    Channel(Arc<str>),
}

impl Scope {
    /// User scope.
    pub fn user(name: impl Into<Arc<str>>) -> Self {
        Scope::User(name.into())
    }

    /// Channel scope.
    pub fn channel(name: impl Into<Arc<str>>) -> Self {
        Scope::Channel(name.into())
    }

    /// Returns the bare name.
    pub fn name(&self) -> &str {
        match self {
            Scope::User(n) | Scope::Channel(n) => n,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::User(n) => write!(f, "user:{n}"),
            Scope::Channel(n) => write!(f, "channel:{n}"),
        }
    }
}

/// Side-effecting reply capability provided by the transport.
pub trait Reply: Send + Sync + 'static {
    /// Sends `text` back to where the message came from.
    fn reply(&self, text: &str);
}

/// A raw incoming message.
#[derive(Clone)]
pub struct Message {
    sender: Arc<str>,
    channel: Option<Arc<str>>,
    text: Arc<str>,
    replier: Option<Arc<dyn Reply>>,
}

impl Message {
    /// Creates a private (query) message from `sender`.
    pub fn new(sender: impl Into<Arc<str>>, text: impl Into<Arc<str>>) -> Self {
        Self {
            sender: sender.into(),
            channel: None,
            text: text.into(),
            replier: None,
        }
    }

    /// Marks the message as said in `channel`.
    pub fn in_channel(mut self, channel: impl Into<Arc<str>>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Attaches a reply capability.
    pub fn with_reply(mut self, replier: Arc<dyn Reply>) -> Self {
        self.replier = Some(replier);
        self
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Scope of the sender.
    pub fn sender_scope(&self) -> Scope {
        Scope::User(Arc::clone(&self.sender))
    }

    /// Scope of the channel, `None` for private messages.
    pub fn channel_scope(&self) -> Option<Scope> {
        self.channel.as_ref().map(|c| Scope::Channel(Arc::clone(c)))
    }

    /// Scopes this message speaks for, channel first.
    pub fn scopes(&self) -> Vec<Scope> {
        let mut scopes = Vec::with_capacity(2);
        if let Some(channel) = self.channel_scope() {
            scopes.push(channel);
        }
        scopes.push(self.sender_scope());
        scopes
    }

    /// Replies through the transport; no-op without a reply capability.
    pub fn reply(&self, text: &str) {
        if let Some(r) = &self.replier {
            r.reply(text);
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("sender", &self.sender)
            .field("channel", &self.channel)
            .field("text", &self.text)
            .finish_non_exhaustive()
    }
}

/// A message after routing: matched pattern plus extracted parameters.
#[derive(Debug, Clone)]
pub struct RoutedEvent {
    message: Message,
    pattern: Arc<str>,
    params: Params,
}

impl RoutedEvent {
    pub fn new(message: Message, pattern: impl Into<Arc<str>>, params: Params) -> Self {
        Self {
            message,
            pattern: pattern.into(),
            params,
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// The pattern id the router matched.
    pub fn pattern(&self) -> &Arc<str> {
        &self.pattern
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Looks up one extracted parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Splits into the `(event, extracted parameters)` pair.
    pub fn into_parts(self) -> (Message, Params) {
        (self.message, self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Reply for Recorder {
        fn reply(&self, text: &str) {
            self.0.lock().push(text.to_string());
        }
    }

    #[test]
    fn test_scopes_put_channel_first() {
        let msg = Message::new("alice", "hi").in_channel("#rust");
        assert_eq!(
            msg.scopes(),
            vec![Scope::channel("#rust"), Scope::user("alice")]
        );

        let query = Message::new("alice", "hi");
        assert_eq!(query.scopes(), vec![Scope::user("alice")]);
        assert!(query.channel_scope().is_none());
    }

    #[test]
    fn test_scope_name_drops_kind() {
        assert_eq!(Scope::channel("#rust").name(), "#rust");
        assert_eq!(Scope::user("alice").name(), "alice");
        assert_eq!(Scope::user("alice").to_string(), "user:alice");
    }

    #[test]
    fn test_reply_goes_through_capability() {
        let rec = Arc::new(Recorder::default());
        let msg = Message::new("bob", "x").with_reply(rec.clone());
        msg.reply("pong");
        Message::new("bob", "y").reply("dropped");
        assert_eq!(*rec.0.lock(), vec!["pong".to_string()]);
    }

    #[test]
    fn test_routed_event_parts() {
        let mut params = Params::new();
        params.insert("page".into(), "2".into());
        let ev = RoutedEvent::new(Message::new("a", "page_to 2"), "page_to :page", params);
        assert_eq!(ev.param("page"), Some("2"));
        assert_eq!(&**ev.pattern(), "page_to :page");

        let (msg, params) = ev.into_parts();
        assert_eq!(msg.text(), "page_to 2");
        assert_eq!(params.len(), 1);
    }
}
