use wisp_store::ChatId;

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sender {
    User,
    Bot,
}

/// One rendered message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: Sender,
    pub content: String,
}

impl Message {
    pub fn new(sender: Sender, content: impl Into<String>) -> Self {
        Self {
            sender,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Sender::User, content)
    }

    pub fn bot(content: impl Into<String>) -> Self {
        Self::new(Sender::Bot, content)
    }

    /// Empty bot message appended when a turn starts, before any event lands.
    pub fn bot_placeholder() -> Self {
        Self::bot(String::new())
    }
}

/// Conversation aggregate owned by one chat session.
///
/// Rebuilt wholesale on each canonical refresh; mutated in place while a
/// turn streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    chat_id: ChatId,
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            messages: Vec::new(),
        }
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Appends a message and returns its index.
    pub fn push(&mut self, message: Message) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    /// Overwrites the bot message at `index` with the full replacement text.
    ///
    /// Out-of-range indices are ignored: a canonical refresh between event
    /// deliveries can only shrink the list for other chats' views, never for
    /// the streaming one, but the guard keeps a stale index harmless.
    pub fn replace_bot_content(&mut self, index: usize, content: impl Into<String>) {
        if let Some(message) = self.messages.get_mut(index) {
            *message = Message::bot(content);
        }
    }

    /// Replaces the entire message list with canonical history.
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }
}
