pub mod bus;
pub mod error;
pub mod message;
pub mod mutation;
pub mod scheduler;
pub mod search;
pub mod session;
pub mod settings;
pub mod sidebar;
pub mod transcript;

pub use bus::{Invalidation, InvalidationBus, InvalidationSubscription};
pub use error::{ChatError, ChatResult};
pub use message::{Conversation, Message, Sender};
pub use mutation::{MutationKind, MutationManager, MutationState};
pub use scheduler::{
    CHAT_LIST_POLL_PERIOD, CONVERSATION_POLL_PERIOD, FetchGuard, FocusSignal, PollGate,
    PollScheduler, RefreshTrigger,
};
pub use search::{MAX_RESULTS, MIN_QUERY_CHARS, SearchResult, rank};
pub use session::{ChatSession, TITLE_REVEAL_INTERVAL, TitleReveal};
pub use settings::{SettingsError, SettingsStore, WispSettings};
pub use sidebar::{ChatList, ChatSummary};
pub use transcript::decode_transcript;
