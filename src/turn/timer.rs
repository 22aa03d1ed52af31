//! Cancellable per-session timers.
//!
//! `TimerScheduler::schedule` spawns a sleeping task that, when it wakes,
//! posts a `TimerEvent` back to the engine loop. The returned `TimerHandle`
//! aborts that task when cancelled or dropped, so replacing a handle on the
//! session (or deleting the session) cancels the old timer.
//!
//! Every event carries the token of the handle that produced it. The engine
//! ignores events whose token no longer matches the handle stored on the
//! session, which covers the window between a task waking and its abort.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::SessionId;

/// Which session timer fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Turn time limit.
    Turn,
    /// No accepted action for the inactivity window.
    Inactivity,
    /// Delayed AI opponent move.
    AiAction,
}

/// Identity of one scheduled timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

/// Posted to the engine when a timer elapses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerEvent {
    pub session: SessionId,
    pub kind: TimerKind,
    pub token: TimerToken,
}

/// Cancellable handle for a scheduled timer. Dropping it cancels the timer.
#[derive(Debug)]
pub struct TimerHandle {
    token: TimerToken,
    kind: TimerKind,
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Token carried by this timer's event.
    #[must_use]
    pub fn token(&self) -> TimerToken {
        self.token
    }

    #[must_use]
    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    /// Cancel the timer.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns timers that report back over a channel.
#[derive(Debug)]
pub struct TimerScheduler {
    tx: mpsc::UnboundedSender<TimerEvent>,
    next_token: u64,
}

impl TimerScheduler {
    /// Create a scheduler and the receiver its events arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, next_token: 0 }, rx)
    }

    /// Schedule `kind` for `session` after `after`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&mut self, session: SessionId, kind: TimerKind, after: Duration) -> TimerHandle {
        self.next_token += 1;
        let token = TimerToken(self.next_token);
        let tx = self.tx.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // Receiver gone means the engine stopped.
            let _ = tx.send(TimerEvent {
                session,
                kind,
                token,
            });
        });

        TimerHandle { token, kind, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_duration() {
        let (mut scheduler, mut rx) = TimerScheduler::new();
        let session = SessionId::generate();

        let handle = scheduler.schedule(session, TimerKind::Turn, Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let event = rx.try_recv().unwrap();
        assert_eq!(event.session, session);
        assert_eq!(event.kind, TimerKind::Turn);
        assert_eq!(event.token, handle.token());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_event() {
        let (mut scheduler, mut rx) = TimerScheduler::new();
        let handle = scheduler.schedule(SessionId::generate(), TimerKind::AiAction, Duration::from_secs(2));

        handle.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacing_handle_cancels_previous() {
        let (mut scheduler, mut rx) = TimerScheduler::new();
        let session = SessionId::generate();

        let mut slot = Some(scheduler.schedule(session, TimerKind::Inactivity, Duration::from_secs(10)));
        tokio::time::sleep(Duration::from_secs(5)).await;
        let replaced = slot.replace(scheduler.schedule(session, TimerKind::Inactivity, Duration::from_secs(10)));
        drop(replaced);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(rx.try_recv().is_err(), "first timer should have been aborted");

        tokio::time::sleep(Duration::from_secs(5)).await;
        let event = rx.try_recv().unwrap();
        assert_eq!(Some(event.token), slot.as_ref().map(TimerHandle::token));
    }

    #[tokio::test]
    async fn test_tokens_are_unique() {
        let (mut scheduler, _rx) = TimerScheduler::new();
        let session = SessionId::generate();
        let a = scheduler.schedule(session, TimerKind::Turn, Duration::from_secs(1));
        let b = scheduler.schedule(session, TimerKind::Turn, Duration::from_secs(1));
        assert_ne!(a.token(), b.token());
        assert_eq!(a.kind(), TimerKind::Turn);
    }
}
