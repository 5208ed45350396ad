//! Reconciliation triggers
//!
//! Everything that can cause a reconciliation pass is folded into one
//! abstraction: a fine periodic tick, a coarse wake tick (catching up after
//! the process was suspended), and explicitly injected triggers (a check-now
//! command, a wake signal from the host). All triggers have the identical
//! effect; none is assumed to fire at a precise time.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Why a reconciliation pass is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Fine-grained periodic timer fired
    Tick,
    /// Coarse wake timer fired, or the host signalled a wake-up
    Wake,
    /// An explicit check-now command arrived
    Command,
}

/// Cloneable handle for injecting explicit triggers from other tasks or
/// signal handlers.
#[derive(Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<Trigger>,
}

impl TriggerHandle {
    /// Inject a trigger, awaiting channel capacity.
    pub async fn fire(&self, trigger: Trigger) -> bool {
        self.tx.send(trigger).await.is_ok()
    }

    /// Inject a trigger without awaiting; usable from non-async contexts
    /// such as signal handler threads. A full channel drops the trigger,
    /// which is harmless: a pass is already pending.
    pub fn try_fire(&self, trigger: Trigger) -> bool {
        self.tx.try_send(trigger).is_ok()
    }
}

/// Combined trigger source for the scheduler loop.
pub struct Triggers {
    tick: Interval,
    wake: Interval,
    rx: mpsc::Receiver<Trigger>,
    // Keeps the channel open even when the caller drops every handle.
    _handle: TriggerHandle,
}

impl Triggers {
    /// Create a trigger source and a handle for explicit triggers.
    ///
    /// Both intervals fire immediately on the first `next()` call, which
    /// gives the loop a reconciliation pass at startup.
    pub fn new(poll_interval: Duration, wake_interval: Duration) -> (Self, TriggerHandle) {
        let mut tick = interval(poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut wake = interval(wake_interval);
        wake.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let (tx, rx) = mpsc::channel(16);
        let handle = TriggerHandle { tx };

        (
            Self {
                tick,
                wake,
                rx,
                _handle: handle.clone(),
            },
            handle,
        )
    }

    /// Wait for the next trigger from any source.
    pub async fn next(&mut self) -> Trigger {
        tokio::select! {
            _ = self.tick.tick() => Trigger::Tick,
            _ = self.wake.tick() => Trigger::Wake,
            injected = self.rx.recv() => injected.unwrap_or(Trigger::Tick),
        }
    }
}
