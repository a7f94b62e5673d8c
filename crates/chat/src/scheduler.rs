use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Poll period for an open conversation view.
pub const CONVERSATION_POLL_PERIOD: Duration = Duration::from_secs(5);
/// Poll period for the sidebar chat list.
pub const CHAT_LIST_POLL_PERIOD: Duration = Duration::from_secs(30);

/// Why a refresh was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Tick,
    FocusRegained,
}

/// Shared gate consulted before any poll trigger is emitted.
///
/// `pause`/`resume` follow the owning view's streaming state; the in-flight
/// flag stops a slow fetch from stacking up behind the next tick. Suppressed
/// triggers are dropped, never deferred: the next tick is the retry.
#[derive(Debug, Default)]
pub struct PollGate {
    paused: AtomicBool,
    in_flight: AtomicBool,
}

impl PollGate {
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        !self.paused.load(Ordering::SeqCst) && !self.in_flight.load(Ordering::SeqCst)
    }

    /// Marks a fetch as in flight for the lifetime of the returned guard.
    /// Returns `None` when one is already running.
    pub fn try_begin_fetch(self: &Arc<Self>) -> Option<FetchGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        Some(FetchGuard {
            gate: Arc::clone(self),
        })
    }
}

/// Scoped in-flight marker; releasing is unconditional on drop.
#[derive(Debug)]
pub struct FetchGuard {
    gate: Arc<PollGate>,
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        self.gate.in_flight.store(false, Ordering::SeqCst);
    }
}

/// Handle for reporting that the application regained focus.
#[derive(Debug, Clone)]
pub struct FocusSignal {
    sender: mpsc::UnboundedSender<()>,
}

impl FocusSignal {
    /// Returns false once the owning scheduler has been torn down.
    pub fn notify(&self) -> bool {
        self.sender.send(()).is_ok()
    }
}

/// One scheduler per view, owning its timer and focus listener.
///
/// Both tasks are aborted on drop so a navigated-away view cannot keep
/// polling in the background.
#[derive(Debug)]
pub struct PollScheduler {
    gate: Arc<PollGate>,
    triggers: mpsc::UnboundedReceiver<RefreshTrigger>,
    timer_task: JoinHandle<()>,
    focus_task: JoinHandle<()>,
}

impl PollScheduler {
    pub fn new(period: Duration) -> (Self, FocusSignal) {
        let gate = Arc::new(PollGate::default());
        let (trigger_sender, triggers) = mpsc::unbounded_channel();
        let (focus_sender, mut focus_receiver) = mpsc::unbounded_channel();

        let timer_task = tokio::spawn({
            let gate = Arc::clone(&gate);
            let trigger_sender = trigger_sender.clone();
            async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick completes immediately; the mount refresh
                // already covers it.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if gate.is_open() && trigger_sender.send(RefreshTrigger::Tick).is_err() {
                        break;
                    }
                }
            }
        });

        let focus_task = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move {
                while focus_receiver.recv().await.is_some() {
                    if gate.is_open()
                        && trigger_sender.send(RefreshTrigger::FocusRegained).is_err()
                    {
                        break;
                    }
                }
            }
        });

        (
            Self {
                gate,
                triggers,
                timer_task,
                focus_task,
            },
            FocusSignal {
                sender: focus_sender,
            },
        )
    }

    pub fn gate(&self) -> Arc<PollGate> {
        Arc::clone(&self.gate)
    }

    /// Ties the gate to the streaming state of the owning view.
    pub fn pause(&self) {
        self.gate.pause();
    }

    pub fn resume(&self) {
        self.gate.resume();
    }

    pub async fn next_trigger(&mut self) -> Option<RefreshTrigger> {
        self.triggers.recv().await
    }

    pub fn try_next_trigger(&mut self) -> Option<RefreshTrigger> {
        self.triggers.try_recv().ok()
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.timer_task.abort();
        self.focus_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_fire_once_per_period() {
        let (mut scheduler, _focus) = PollScheduler::new(Duration::from_secs(5));
        settle().await;
        assert_eq!(scheduler.try_next_trigger(), None);

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(scheduler.try_next_trigger(), Some(RefreshTrigger::Tick));
        assert_eq!(scheduler.try_next_trigger(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_gate_drops_ticks_instead_of_deferring() {
        let (mut scheduler, _focus) = PollScheduler::new(Duration::from_secs(5));
        scheduler.pause();

        tokio::time::advance(Duration::from_secs(15)).await;
        settle().await;
        assert_eq!(scheduler.try_next_trigger(), None);

        scheduler.resume();
        // Nothing was queued while paused; the next period fires normally.
        assert_eq!(scheduler.try_next_trigger(), None);
        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(scheduler.try_next_trigger(), Some(RefreshTrigger::Tick));
    }

    #[tokio::test(start_paused = true)]
    async fn focus_triggers_respect_the_gate() {
        let (mut scheduler, focus) = PollScheduler::new(Duration::from_secs(60));

        assert!(focus.notify());
        settle().await;
        assert_eq!(
            scheduler.try_next_trigger(),
            Some(RefreshTrigger::FocusRegained)
        );

        scheduler.pause();
        assert!(focus.notify());
        settle().await;
        assert_eq!(scheduler.try_next_trigger(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_fetch_suppresses_ticks_until_released() {
        let (mut scheduler, _focus) = PollScheduler::new(Duration::from_secs(5));
        let gate = scheduler.gate();

        let guard = gate.try_begin_fetch().unwrap();
        assert!(gate.try_begin_fetch().is_none());

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(scheduler.try_next_trigger(), None);

        drop(guard);
        assert!(gate.is_open());
        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(scheduler.try_next_trigger(), Some(RefreshTrigger::Tick));
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_cancels_timer_and_focus_listener() {
        let (scheduler, focus) = PollScheduler::new(Duration::from_secs(5));
        drop(scheduler);
        settle().await;
        assert!(!focus.notify());
    }
}
