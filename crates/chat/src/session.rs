use std::time::Duration;

use snafu::{ResultExt, ensure};

use wisp_agent::{AgentService, StreamEvent, TurnRequest};
use wisp_store::{ChatId, ChatStore, ServiceAvailability, UserId};

use crate::bus::Invalidation;
use crate::error::{
    ChatResult, DecodeTranscriptSnafu, EmptyPromptSnafu, StoreSnafu, TurnInFlightSnafu,
};
use crate::message::{Conversation, Message};
use crate::transcript::decode_transcript;

/// Cadence of the per-character title reveal.
pub const TITLE_REVEAL_INTERVAL: Duration = Duration::from_millis(50);

/// Streaming gate for one conversation. At most one turn is ever in flight;
/// the captured bot index is only valid while the gate is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum TurnGate {
    #[default]
    Idle,
    Streaming {
        bot_index: usize,
    },
}

/// Timer-driven per-character reveal of a freshly fetched title.
///
/// Purely cosmetic: the full title is always available, and the reveal is
/// cancelled and restarted whenever the underlying value changes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TitleReveal {
    full: String,
    visible_chars: usize,
}

impl TitleReveal {
    /// Shows the whole title at once, skipping the animation.
    pub fn set_immediate(&mut self, title: impl Into<String>) {
        self.full = title.into();
        self.visible_chars = self.full.chars().count();
    }

    /// Starts revealing a new title from the first character. A restart with
    /// the current value is a no-op so polling cannot retrigger the effect.
    pub fn restart(&mut self, title: impl Into<String>) {
        let title = title.into();
        if title == self.full {
            return;
        }
        self.full = title;
        self.visible_chars = 0;
    }

    /// Reveals one more character. Returns true while characters remain.
    pub fn advance(&mut self) -> bool {
        let total = self.full.chars().count();
        if self.visible_chars < total {
            self.visible_chars += 1;
        }
        self.visible_chars < total
    }

    pub fn is_revealing(&self) -> bool {
        self.visible_chars < self.full.chars().count()
    }

    pub fn visible(&self) -> &str {
        match self.full.char_indices().nth(self.visible_chars) {
            Some((byte_index, _)) => &self.full[..byte_index],
            None => &self.full,
        }
    }

    pub fn full(&self) -> &str {
        &self.full
    }
}

/// Conversation reconciler for one open chat.
///
/// Sole writer of its `Conversation`: stream events mutate it in place, and
/// canonical refreshes replace it wholesale. The streaming gate keeps the two
/// from ever interleaving.
#[derive(Debug)]
pub struct ChatSession {
    conversation: Conversation,
    user_id: UserId,
    gate: TurnGate,
    thinking: Option<String>,
    title: TitleReveal,
    services: ServiceAvailability,
    loaded: bool,
    closed: bool,
    initial_turn_taken: bool,
}

impl ChatSession {
    pub fn new(chat_id: ChatId, user_id: UserId) -> Self {
        Self {
            conversation: Conversation::new(chat_id),
            user_id,
            gate: TurnGate::Idle,
            thinking: None,
            title: TitleReveal::default(),
            services: ServiceAvailability::default(),
            loaded: false,
            closed: false,
            initial_turn_taken: false,
        }
    }

    pub fn chat_id(&self) -> ChatId {
        self.conversation.chat_id()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn title(&self) -> &TitleReveal {
        &self.title
    }

    pub fn title_mut(&mut self) -> &mut TitleReveal {
        &mut self.title
    }

    pub fn services(&self) -> ServiceAvailability {
        self.services
    }

    /// Current status-line text while the agent is working, if any.
    pub fn thinking(&self) -> Option<&str> {
        self.thinking.as_deref()
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.gate, TurnGate::Streaming { .. })
    }

    /// True once the canonical chat for this id has been deleted; the owning
    /// view must navigate away instead of rendering an empty conversation.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn has_loaded(&self) -> bool {
        self.loaded
    }

    /// Opens a turn: appends the user message plus an empty bot placeholder
    /// and closes the streaming gate. The placeholder index is captured here
    /// and reused for every subsequent content overwrite of this turn.
    pub fn begin_turn(&mut self, prompt: &str) -> ChatResult<()> {
        ensure!(
            !self.is_streaming(),
            TurnInFlightSnafu {
                stage: "begin-turn",
                chat_id: self.chat_id(),
            }
        );
        ensure!(
            !prompt.trim().is_empty(),
            EmptyPromptSnafu { stage: "begin-turn" }
        );

        self.conversation.push(Message::user(prompt));
        let bot_index = self.conversation.push(Message::bot_placeholder());
        self.gate = TurnGate::Streaming { bot_index };
        self.thinking = None;
        Ok(())
    }

    /// Applies one stream event to the open turn, in arrival order.
    pub fn apply_event(&mut self, event: StreamEvent) {
        let TurnGate::Streaming { bot_index } = self.gate else {
            tracing::warn!(
                chat_id = %self.chat_id(),
                event = ?event,
                "dropping stream event with no turn in flight"
            );
            return;
        };

        match event {
            StreamEvent::Status(message) => {
                self.thinking = Some(message);
            }
            StreamEvent::Content(text) => {
                self.thinking = None;
                self.conversation.replace_bot_content(bot_index, text);
            }
            StreamEvent::Done => {
                self.thinking = None;
                self.gate = TurnGate::Idle;
            }
            StreamEvent::Error(message) => {
                self.thinking = None;
                self.conversation
                    .replace_bot_content(bot_index, format!("Error: {message}"));
                self.gate = TurnGate::Idle;
            }
        }
    }

    /// Reopens the gate if the stream ended without a terminal event.
    fn finish_turn(&mut self) {
        if self.is_streaming() {
            tracing::debug!(
                chat_id = %self.chat_id(),
                "agent stream ended without a terminal event"
            );
            self.thinking = None;
            self.gate = TurnGate::Idle;
        }
    }

    /// Runs one full turn: opens it, drives the agent's event stream to its
    /// terminal event (or exhaustion), and reopens the gate.
    pub async fn run_turn(&mut self, agent: &dyn AgentService, prompt: &str) -> ChatResult<()> {
        self.begin_turn(prompt)?;

        let request = TurnRequest::new(
            prompt,
            self.chat_id().to_string(),
            self.user_id.to_string(),
        );
        let mut events = agent.stream_turn(request).await;
        while let Some(event) = events.recv().await {
            self.apply_event(event);
            if !self.is_streaming() {
                break;
            }
        }

        self.finish_turn();
        Ok(())
    }

    /// Starts the turn for a chat opened with an initial prompt.
    ///
    /// Fires at most once, and only after the first canonical load confirmed
    /// the conversation is still empty.
    pub async fn take_initial_turn(
        &mut self,
        agent: &dyn AgentService,
        prompt: &str,
    ) -> ChatResult<bool> {
        if self.initial_turn_taken || !self.loaded || self.closed || !self.conversation.is_empty()
        {
            return Ok(false);
        }

        self.initial_turn_taken = true;
        self.run_turn(agent, prompt).await?;
        Ok(true)
    }

    /// Replaces local state with the store's current truth.
    ///
    /// Suppressed entirely while a turn is streaming: canonical history is
    /// stale during a turn and would overwrite in-flight content at the
    /// captured bot index.
    pub async fn refresh(&mut self, store: &dyn ChatStore) -> ChatResult<()> {
        if self.is_streaming() {
            tracing::debug!(
                chat_id = %self.chat_id(),
                "refresh suppressed while a turn is streaming"
            );
            return Ok(());
        }

        let chat_id = self.chat_id();
        let (record, services) = futures::join!(
            store.get_chat(self.user_id, chat_id),
            store.get_services(self.user_id),
        );
        let record = record.context(StoreSnafu {
            stage: "refresh-fetch-chat",
        })?;
        let services = services.context(StoreSnafu {
            stage: "refresh-fetch-services",
        })?;

        // A missing record is not an empty conversation: keep showing what we
        // have until a deletion invalidation closes this session.
        let Some(record) = record else {
            tracing::warn!(chat_id = %chat_id, "canonical refresh found no chat record");
            return Ok(());
        };

        let messages = decode_transcript(&record.messages).context(DecodeTranscriptSnafu {
            stage: "refresh-decode-transcript",
            chat_id,
        })?;

        self.conversation.replace_all(messages);
        self.services = services
            .map(|record| record.availability())
            .unwrap_or_default();
        self.apply_fetched_title(record.title);
        self.loaded = true;
        Ok(())
    }

    fn apply_fetched_title(&mut self, title: String) {
        if self.loaded {
            self.title.restart(title);
        } else {
            // First load shows the title without the reveal effect.
            self.title.set_immediate(title);
        }
    }

    /// Reacts to a bus event. Events for other chats are ignored; duplicates
    /// are harmless.
    pub async fn handle_invalidation(
        &mut self,
        store: &dyn ChatStore,
        event: &Invalidation,
    ) -> ChatResult<()> {
        if event.chat_id() != self.chat_id() {
            return Ok(());
        }

        match event {
            Invalidation::TitleChanged { new_title, .. } => {
                if let Some(title) = new_title {
                    self.title.restart(title.clone());
                }
                self.refresh(store).await
            }
            Invalidation::ChatDeleted { .. } => {
                self.closed = true;
                Ok(())
            }
        }
    }
}
