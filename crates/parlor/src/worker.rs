//! The task that turns wake-ups into drains and fired timers into
//! `timeout` envelopes.

use parlor_protocol::Envelope;
use parlor_store::{MailboxKeys, RoomStore};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::{Coordinator, EventBus};

/// Drives a [`Coordinator`]: one drain per wake-up, one submit per fired
/// turn timer.
///
/// Drains of different rooms run concurrently. Two drains of the same room
/// are harmless: the mailbox lets only one of them work.
pub struct DrainWorker<S, B> {
    coordinator: Coordinator<S, B>,
    wakes: mpsc::UnboundedReceiver<MailboxKeys>,
    timeouts: mpsc::UnboundedReceiver<Envelope>,
}

impl<S: RoomStore, B: EventBus> DrainWorker<S, B> {
    pub(crate) fn new(
        coordinator: Coordinator<S, B>,
        wakes: mpsc::UnboundedReceiver<MailboxKeys>,
        timeouts: mpsc::UnboundedReceiver<Envelope>,
    ) -> Self {
        Self {
            coordinator,
            wakes,
            timeouts,
        }
    }

    /// Runs until the task is aborted.
    pub async fn run(mut self) {
        info!("drain worker started");
        loop {
            tokio::select! {
                Some(keys) = self.wakes.recv() => {
                    let coordinator = self.coordinator.clone();
                    tokio::spawn(async move {
                        let processed = coordinator.drain(&keys).await;
                        debug!(
                            game = %keys.game,
                            room_id = %keys.room,
                            processed,
                            "drain finished"
                        );
                    });
                }
                Some(envelope) = self.timeouts.recv() => {
                    deliver(&self.coordinator, envelope).await;
                }
                else => break,
            }
        }
        info!("drain worker stopped");
    }

    /// Spawns [`run`](Self::run) on the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Drains inline until no wake-up is pending. Returns how many drains
    /// ran. Fired timers are not consumed.
    ///
    /// Meant for tests and single-threaded tools that want deterministic
    /// processing.
    pub async fn run_until_idle(&mut self) -> usize {
        let mut drains = 0;
        while let Ok(keys) = self.wakes.try_recv() {
            self.coordinator.drain(&keys).await;
            drains += 1;
        }
        drains
    }

    /// Waits for the next fired turn timer and submits it. Returns `false`
    /// once no timer can fire any more.
    pub async fn next_timeout(&mut self) -> bool {
        match self.timeouts.recv().await {
            Some(envelope) => {
                deliver(&self.coordinator, envelope).await;
                true
            }
            None => false,
        }
    }
}

async fn deliver<S: RoomStore, B: EventBus>(coordinator: &Coordinator<S, B>, envelope: Envelope) {
    let game = envelope.game.clone();
    if let Err(e) = coordinator.submit(envelope).await {
        error!(%game, error = %e, "failed to enqueue turn timeout");
    }
}
