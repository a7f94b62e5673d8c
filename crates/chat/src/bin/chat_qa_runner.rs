use std::env;

use snafu::{OptionExt, Snafu};

use wisp_agent::{AgentService, BoxFuture, EventStream, FrameDecoder, StreamEvent, TurnRequest};
use wisp_chat::{
    ChatError, ChatList, ChatSession, Invalidation, InvalidationBus, MutationManager,
    MutationState, rank,
};
use wisp_store::{ChatId, ChatRecord, ChatStore, InMemoryChatStore, NewChat, UserId};

#[derive(Debug, Clone)]
struct RunnerArgs {
    scenario: Scenario,
}

#[derive(Debug, Clone, Copy)]
enum Scenario {
    DecodeFragmentation,
    ReplaceSemantics,
    RefreshGate,
    RenameRollback,
    DeleteOptimistic,
    SearchRanking,
    EndToEndTurn,
    All,
}

impl Scenario {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "decode_fragmentation" => Some(Self::DecodeFragmentation),
            "replace_semantics" => Some(Self::ReplaceSemantics),
            "refresh_gate" => Some(Self::RefreshGate),
            "rename_rollback" => Some(Self::RenameRollback),
            "delete_optimistic" => Some(Self::DeleteOptimistic),
            "search_ranking" => Some(Self::SearchRanking),
            "end_to_end_turn" => Some(Self::EndToEndTurn),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::DecodeFragmentation => "decode_fragmentation",
            Self::ReplaceSemantics => "replace_semantics",
            Self::RefreshGate => "refresh_gate",
            Self::RenameRollback => "rename_rollback",
            Self::DeleteOptimistic => "delete_optimistic",
            Self::SearchRanking => "search_ranking",
            Self::EndToEndTurn => "end_to_end_turn",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Snafu)]
enum RunnerError {
    #[snafu(display("missing required --scenario argument"))]
    MissingScenario { stage: &'static str },
    #[snafu(display("missing value for argument '{arg}'"))]
    MissingArgumentValue {
        stage: &'static str,
        arg: &'static str,
    },
    #[snafu(display("unknown scenario '{raw}'"))]
    UnknownScenario { stage: &'static str, raw: String },
    #[snafu(display("unknown argument '{raw}'"))]
    UnknownArgument { stage: &'static str, raw: String },
    #[snafu(display("chat engine call failed: {source}"))]
    ChatValidation {
        stage: &'static str,
        source: ChatError,
    },
    #[snafu(display("scenario '{scenario}' failed: {reason}"))]
    ScenarioFailed {
        stage: &'static str,
        scenario: &'static str,
        reason: String,
    },
}

type RunnerResult<T> = Result<T, RunnerError>;

struct ScriptedAgent {
    events: Vec<StreamEvent>,
}

impl ScriptedAgent {
    fn new(events: impl IntoIterator<Item = StreamEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }
}

impl AgentService for ScriptedAgent {
    fn stream_turn(&self, _request: TurnRequest) -> BoxFuture<'_, EventStream> {
        let events = self.events.clone();
        Box::pin(async move { EventStream::from_events(events) })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(error) = run().await {
        println!("runner_ok=false");
        eprintln!("runner_error={error}");
        std::process::exit(1);
    }
}

async fn run() -> RunnerResult<()> {
    let args = parse_args(env::args().skip(1))?;
    println!("scenario={}", args.scenario.name());

    match args.scenario {
        Scenario::DecodeFragmentation => run_decode_fragmentation(),
        Scenario::ReplaceSemantics => run_replace_semantics().await,
        Scenario::RefreshGate => run_refresh_gate().await,
        Scenario::RenameRollback => run_rename_rollback().await,
        Scenario::DeleteOptimistic => run_delete_optimistic().await,
        Scenario::SearchRanking => run_search_ranking(),
        Scenario::EndToEndTurn => run_end_to_end_turn().await,
        Scenario::All => run_all().await,
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> RunnerResult<RunnerArgs> {
    let mut scenario = None;
    let mut pending = args.into_iter();

    // The parser is intentionally strict to keep scenario execution deterministic in CI.
    while let Some(argument) = pending.next() {
        match argument.as_str() {
            "--scenario" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-scenario-value",
                    arg: "--scenario",
                })?;

                let parsed = Scenario::parse(&value).context(UnknownScenarioSnafu {
                    stage: "parse-args-scenario",
                    raw: value,
                })?;
                scenario = Some(parsed);
            }
            _ => {
                return UnknownArgumentSnafu {
                    stage: "parse-args",
                    raw: argument,
                }
                .fail();
            }
        }
    }

    Ok(RunnerArgs {
        scenario: scenario.context(MissingScenarioSnafu {
            stage: "parse-args-scenario-required",
        })?,
    })
}

async fn run_all() -> RunnerResult<()> {
    run_decode_fragmentation()?;
    run_replace_semantics().await?;
    run_refresh_gate().await?;
    run_rename_rollback().await?;
    run_delete_optimistic().await?;
    run_search_ranking()?;
    run_end_to_end_turn().await?;

    println!("all_passed=true");
    Ok(())
}

fn seeded_record(user_id: UserId, title: &str, messages: &str) -> ChatRecord {
    ChatRecord {
        id: ChatId::new_v4(),
        user_id,
        title: title.to_string(),
        messages: messages.to_string(),
        updated_at_unix_seconds: 1_700_000_000,
        created_at_unix_seconds: 1_700_000_000,
    }
}

fn run_decode_fragmentation() -> RunnerResult<()> {
    let wire = concat!(
        "data: {\"type\":\"status\",\"message\":\"working\"}\n\n",
        "data: {\"type\":\"content\",\"content\":\"a\"}\n\n",
        "data: not-json\n\n",
        "data: {\"type\":\"content\",\"content\":\"ab\"}\n\n",
        "data: {\"type\":\"done\"}\n\n",
    );
    let expected = vec![
        StreamEvent::Status("working".to_string()),
        StreamEvent::Content("a".to_string()),
        StreamEvent::Content("ab".to_string()),
        StreamEvent::Done,
    ];

    let mut checked_splits = 0usize;
    for split in 0..=wire.len() {
        let mut decoder = FrameDecoder::new();
        let mut events = decoder.feed(wire[..split].as_bytes());
        events.extend(decoder.feed(wire[split..].as_bytes()));
        events.extend(decoder.finish());

        if events != expected {
            return ScenarioFailedSnafu {
                stage: "scenario-decode-fragmentation-compare",
                scenario: "decode_fragmentation",
                reason: format!("split at byte {split} produced {events:?}"),
            }
            .fail();
        }
        checked_splits += 1;
    }

    println!("checked_splits={checked_splits}");
    println!("malformed_frames_skipped=true");
    println!("runner_ok=true");
    Ok(())
}

async fn run_replace_semantics() -> RunnerResult<()> {
    let agent = ScriptedAgent::new([
        StreamEvent::Content("a".to_string()),
        StreamEvent::Content("ab".to_string()),
        StreamEvent::Content("abc".to_string()),
        StreamEvent::Done,
    ]);
    let mut session = ChatSession::new(ChatId::new_v4(), UserId::new_v4());

    session
        .run_turn(&agent, "count")
        .await
        .map_err(|source| RunnerError::ChatValidation {
            stage: "scenario-replace-semantics-turn",
            source,
        })?;

    let bot_content = session
        .conversation()
        .messages()
        .get(1)
        .map(|message| message.content.clone())
        .unwrap_or_default();
    println!("bot_content={bot_content}");

    if bot_content != "abc" {
        return ScenarioFailedSnafu {
            stage: "scenario-replace-semantics-assert",
            scenario: "replace_semantics",
            reason: format!("expected last-write-wins content 'abc', got '{bot_content}'"),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_refresh_gate() -> RunnerResult<()> {
    let store = InMemoryChatStore::new();
    let user_id = UserId::new_v4();
    let record = seeded_record(
        user_id,
        "Gate check",
        r#"[{"kind":"response","parts":[{"part_kind":"text","content":"stale history"}]}]"#,
    );
    let chat_id = record.id;
    store.seed_chat(record).await;

    let mut session = ChatSession::new(chat_id, user_id);
    session
        .begin_turn("hello")
        .map_err(|source| RunnerError::ChatValidation {
            stage: "scenario-refresh-gate-begin-turn",
            source,
        })?;

    let before = session.conversation().clone();
    session
        .refresh(&store)
        .await
        .map_err(|source| RunnerError::ChatValidation {
            stage: "scenario-refresh-gate-refresh",
            source,
        })?;

    let refresh_suppressed = session.conversation() == &before;
    println!("refresh_suppressed={refresh_suppressed}");

    if !refresh_suppressed {
        return ScenarioFailedSnafu {
            stage: "scenario-refresh-gate-assert",
            scenario: "refresh_gate",
            reason: "canonical refresh mutated a streaming conversation".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_rename_rollback() -> RunnerResult<()> {
    let store = InMemoryChatStore::new();
    let user_id = UserId::new_v4();
    let record = seeded_record(user_id, "canonical", "[]");
    let chat_id = record.id;
    store.seed_chat(record).await;

    let bus = std::sync::Arc::new(InvalidationBus::new());
    let mut subscription = bus.subscribe();
    let mut list = ChatList::new(user_id);
    list.refresh(&store)
        .await
        .map_err(|source| RunnerError::ChatValidation {
            stage: "scenario-rename-rollback-list-refresh",
            source,
        })?;

    let mut manager = MutationManager::new(bus);
    store.fail_next_update_title();
    manager
        .rename(&store, &mut list, chat_id, "optimistic")
        .await
        .map_err(|source| RunnerError::ChatValidation {
            stage: "scenario-rename-rollback-rename",
            source,
        })?;

    let rolled_back = matches!(manager.state(), MutationState::RolledBack(_));
    let listed_title = list
        .summaries()
        .first()
        .map(|summary| summary.title.clone())
        .unwrap_or_default();
    let refetch_signal = std::iter::from_fn(|| subscription.try_recv()).any(|event| {
        matches!(
            event,
            Invalidation::TitleChanged {
                new_title: None,
                ..
            }
        )
    });

    println!("rolled_back={rolled_back}");
    println!("listed_title={listed_title}");
    println!("refetch_signal={refetch_signal}");

    if !rolled_back || listed_title != "canonical" || !refetch_signal {
        return ScenarioFailedSnafu {
            stage: "scenario-rename-rollback-assert",
            scenario: "rename_rollback",
            reason: "optimistic rename did not reconcile to the canonical title".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_delete_optimistic() -> RunnerResult<()> {
    let store = InMemoryChatStore::new();
    let user_id = UserId::new_v4();
    let record = seeded_record(user_id, "doomed", "[]");
    let chat_id = record.id;
    store.seed_chat(record).await;

    let bus = std::sync::Arc::new(InvalidationBus::new());
    let mut list = ChatList::new(user_id);
    list.refresh(&store)
        .await
        .map_err(|source| RunnerError::ChatValidation {
            stage: "scenario-delete-optimistic-list-refresh",
            source,
        })?;

    // A mounted session for the deleted chat must observe closure.
    let mut session = ChatSession::new(chat_id, user_id);
    let mut subscription = {
        let mut manager = MutationManager::new(std::sync::Arc::clone(&bus));
        let subscription = bus.subscribe();
        manager
            .delete(&store, &mut list, chat_id)
            .await
            .map_err(|source| RunnerError::ChatValidation {
                stage: "scenario-delete-optimistic-delete",
                source,
            })?;
        subscription
    };

    while let Some(event) = subscription.try_recv() {
        session
            .handle_invalidation(&store, &event)
            .await
            .map_err(|source| RunnerError::ChatValidation {
                stage: "scenario-delete-optimistic-invalidation",
                source,
            })?;
    }

    let removed_from_list = list.summaries().is_empty();
    let session_closed = session.is_closed();
    println!("removed_from_list={removed_from_list}");
    println!("session_closed={session_closed}");

    if !removed_from_list || !session_closed {
        return ScenarioFailedSnafu {
            stage: "scenario-delete-optimistic-assert",
            scenario: "delete_optimistic",
            reason: "delete did not propagate to both the list and the open session".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

fn run_search_ranking() -> RunnerResult<()> {
    let user_id = UserId::new_v4();
    let chats = vec![
        seeded_record(user_id, "Meeting notes", "[]"),
        seeded_record(
            user_id,
            "Errands",
            r#"[{"kind":"request","parts":[{"part_kind":"user-prompt","content":"schedule a meeting tomorrow"}]}]"#,
        ),
        seeded_record(user_id, "Unrelated", "[]"),
    ];

    let results = rank(&chats, "meet");
    let top_title = results
        .first()
        .map(|result| result.title.clone())
        .unwrap_or_default();
    let top_score = results.first().map(|result| result.score).unwrap_or(0);
    let short_query_empty = rank(&chats, "a").is_empty();

    println!("result_count={}", results.len());
    println!("top_title={top_title}");
    println!("top_score={top_score}");
    println!("short_query_empty={short_query_empty}");

    if results.len() != 2 || top_title != "Meeting notes" || top_score < 150 || !short_query_empty
    {
        return ScenarioFailedSnafu {
            stage: "scenario-search-ranking-assert",
            scenario: "search_ranking",
            reason: format!(
                "unexpected ranking: count={}, top='{top_title}' score={top_score}",
                results.len()
            ),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_end_to_end_turn() -> RunnerResult<()> {
    let store = InMemoryChatStore::new();
    let user_id = UserId::new_v4();
    let record = store
        .create_chat(NewChat::empty(user_id, "Fresh chat"))
        .await
        .map_err(|source| RunnerError::ChatValidation {
            stage: "scenario-end-to-end-create-chat",
            source: ChatError::Store {
                stage: "create-chat",
                source,
            },
        })?;
    let chat_id = record.id;

    let mut session = ChatSession::new(chat_id, user_id);
    session
        .refresh(&store)
        .await
        .map_err(|source| RunnerError::ChatValidation {
            stage: "scenario-end-to-end-initial-refresh",
            source,
        })?;

    session
        .begin_turn("hello")
        .map_err(|source| RunnerError::ChatValidation {
            stage: "scenario-end-to-end-begin-turn",
            source,
        })?;
    let placeholder_before_events = session.conversation().len() == 2
        && session.conversation().messages()[0].content == "hello"
        && session.conversation().messages()[1].content.is_empty();

    for event in [
        StreamEvent::Status("thinking".to_string()),
        StreamEvent::Content("hi there".to_string()),
        StreamEvent::Done,
    ] {
        session.apply_event(event);
    }

    let final_content = session
        .conversation()
        .messages()
        .get(1)
        .map(|message| message.content.clone())
        .unwrap_or_default();
    let indicator_cleared = session.thinking().is_none() && !session.is_streaming();

    println!("placeholder_before_events={placeholder_before_events}");
    println!("final_content={final_content}");
    println!("indicator_cleared={indicator_cleared}");

    if !placeholder_before_events || final_content != "hi there" || !indicator_cleared {
        return ScenarioFailedSnafu {
            stage: "scenario-end-to-end-assert",
            scenario: "end_to_end_turn",
            reason: "turn lifecycle did not match the expected placeholder/stream/done flow"
                .to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}
