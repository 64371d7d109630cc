//! The per-node state machine: holder/asked/using/queue,
//! the four message handlers, `assign_privilege`, `make_request`, and
//! crash/recovery.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use crate::error::NodeError;
use crate::message::{Message, NodeId};
use crate::metrics::Counters;
use crate::sentinel::ResourceSentinel;
use crate::transport::{MessageReceiver, Transport};

/// Per-neighbor scratch collected during recovery.
#[derive(Debug, Default)]
struct RecoveryScratch {
    neighbor_holder: HashMap<NodeId, NodeId>,
    in_neighbor_queue: HashMap<NodeId, bool>,
    neighbor_asked: HashMap<NodeId, bool>,
    advise_received: HashMap<NodeId, bool>,
}

impl RecoveryScratch {
    fn reset(&mut self, neighbors: &[NodeId]) {
        self.neighbor_holder.clear();
        self.in_neighbor_queue.clear();
        self.neighbor_asked.clear();
        self.advise_received = neighbors.iter().map(|&n| (n, false)).collect();
    }

    fn all_advised(&self, neighbors: &[NodeId]) -> bool {
        neighbors
            .iter()
            .all(|n| *self.advise_received.get(n).unwrap_or(&false))
    }
}

/// The mutable fields of a node, guarded by a single
/// mutex shared by the requester and receiver tasks.
struct NodeCore {
    /// Next hop toward the current token holder. `None` only while
    /// `in_recovery`, when the reference clears it along with everything
    /// else the recovering node used to know.
    holder: Option<NodeId>,
    asked: bool,
    using: bool,
    queue: VecDeque<NodeId>,
    in_recovery: bool,
    scratch: RecoveryScratch,
}

/// A handle to one node's fixed configuration plus its shared mutable
/// state. Cheap to clone: everything behind an `Arc` or plain `Copy` data.
pub struct Node {
    id: NodeId,
    neighbors: Vec<NodeId>,
    ask_rate: f64,
    cs_duration: Duration,
    downtime: Duration,
    transport: Transport,
    counters: Arc<Counters>,
    sentinel: Arc<ResourceSentinel>,
    shutdown: Arc<Notify>,
    core: Mutex<NodeCore>,
}

impl Node {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: NodeId,
        neighbors: Vec<NodeId>,
        initial_holder: NodeId,
        ask_rate: f64,
        cs_duration: Duration,
        downtime: Duration,
        transport: Transport,
        counters: Arc<Counters>,
        sentinel: Arc<ResourceSentinel>,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            id,
            neighbors,
            ask_rate,
            cs_duration,
            downtime,
            transport,
            counters,
            sentinel,
            shutdown,
            core: Mutex::new(NodeCore {
                holder: Some(initial_holder),
                asked: false,
                using: false,
                queue: VecDeque::new(),
                in_recovery: false,
                scratch: RecoveryScratch::default(),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub async fn is_in_recovery(&self) -> bool {
        self.core.lock().await.in_recovery
    }

    /// Spawns the requester loop and the receiver loop as independent
    /// tasks sharing `self`. `rx` is this node's registered
    /// transport channel.
    pub fn spawn(self: &Arc<Self>, rx: MessageReceiver) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(Arc::clone(self).receiver_loop(rx)),
            tokio::spawn(Arc::clone(self).requester_loop()),
        ]
    }

    /// The receiver activity: processes inbound messages until
    /// the transport channel closes or shutdown is signalled.
    async fn receiver_loop(self: Arc<Self>, mut rx: MessageReceiver) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.notified() => {
                    tracing::info!("node {} receiver loop shutting down", self.id);
                    break;
                }
                message = rx.recv() => {
                    match message {
                        Some(message) => self.handle_message(message).await,
                        None => {
                            tracing::info!("node {} transport channel closed", self.id);
                            break;
                        }
                    }
                }
            }
        }
    }

    /// The requester activity: periodically asks for the
    /// token, waiting out an `Exp(ask_rate)` inter-arrival time.
    async fn requester_loop(self: Arc<Self>) {
        if self.ask_rate <= 0.0 {
            return;
        }
        loop {
            let wait = exponential_duration(self.ask_rate);
            tokio::select! {
                biased;
                _ = self.shutdown.notified() => {
                    tracing::info!("node {} requester loop shutting down", self.id);
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            let should_request = {
                let mut core = self.core.lock().await;
                if core.in_recovery || core.queue.contains(&self.id) {
                    false
                } else {
                    core.queue.push_back(self.id);
                    true
                }
            };
            if should_request {
                self.counters.record_request_issued();
                tracing::debug!("node {} is asking for privilege", self.id);
                self.drive_if_not_recovering().await;
            }
        }
    }

    async fn handle_message(&self, message: Message) {
        let result = match message {
            Message::Request { from } => {
                self.on_request(from).await;
                Ok(())
            },
            Message::Assign { from } => self.on_assign(from).await,
            Message::Restart { from } => self.on_restart(from).await,
            Message::Advise {
                from,
                sender_holder,
                sender_in_my_queue,
                sender_asked,
            } => {
                self.on_advise(from, sender_holder, sender_in_my_queue, sender_asked)
                    .await
            },
        };

        if let Err(error) = result {
            tracing::error!("node {} protocol invariant violated: {error}", self.id);
            panic!("{error}");
        }

        self.drive_if_not_recovering().await;
    }

    async fn on_request(&self, from: NodeId) {
        tracing::trace!("node {} received REQUEST from {}", self.id, from);
        self.core.lock().await.queue.push_back(from);
    }

    async fn on_assign(&self, from: NodeId) -> Result<(), NodeError> {
        tracing::trace!("node {} received ASSIGN from {}", self.id, from);
        let mut core = self.core.lock().await;
        if core.holder == Some(self.id) {
            return Err(NodeError::AssignWhileHolder { id: self.id, from });
        }
        core.holder = Some(self.id);
        Ok(())
    }

    async fn on_restart(&self, from: NodeId) -> Result<(), NodeError> {
        tracing::trace!("node {} received RESTART from {}", self.id, from);
        if !self.neighbors.contains(&from) {
            return Err(NodeError::MessageFromNonNeighbor {
                id: self.id,
                from,
                kind: "RESTART",
            });
        }
        let (holder, sender_in_my_queue, sender_asked) = {
            let core = self.core.lock().await;
            (
                core.holder.unwrap_or(self.id),
                core.queue.contains(&from),
                core.asked,
            )
        };
        let advise = Message::Advise {
            from: self.id,
            sender_holder: holder,
            sender_in_my_queue,
            sender_asked,
        };
        self.send(from, advise).await;
        Ok(())
    }

    async fn on_advise(
        &self,
        from: NodeId,
        sender_holder: NodeId,
        sender_in_my_queue: bool,
        sender_asked: bool,
    ) -> Result<(), NodeError> {
        tracing::trace!("node {} received ADVISE from {}", self.id, from);
        if !self.neighbors.contains(&from) {
            return Err(NodeError::MessageFromNonNeighbor {
                id: self.id,
                from,
                kind: "ADVISE",
            });
        }
        let ready = {
            let mut core = self.core.lock().await;
            core.scratch.neighbor_holder.insert(from, sender_holder);
            core.scratch
                .in_neighbor_queue
                .insert(from, sender_in_my_queue);
            core.scratch.neighbor_asked.insert(from, sender_asked);
            core.scratch.advise_received.insert(from, true);
            core.scratch.all_advised(&self.neighbors)
        };
        if ready {
            self.recover().await;
        }
        Ok(())
    }

    /// Reconstructs `holder`, `asked`, and `queue` from the collected
    /// scratch once every neighbor has advised.
    async fn recover(&self) {
        let mut candidates = self.neighbors.clone();
        candidates.sort_unstable();

        let mut core = self.core.lock().await;

        let all_point_at_self = candidates
            .iter()
            .all(|k| core.scratch.neighbor_holder.get(k) == Some(&self.id));

        if all_point_at_self {
            core.holder = Some(self.id);
            core.asked = false;
        } else {
            for k in &candidates {
                if core.scratch.neighbor_holder.get(k) != Some(&self.id) {
                    core.holder = Some(*k);
                    core.asked = *core.scratch.in_neighbor_queue.get(k).unwrap_or(&false);
                    break;
                }
            }
        }

        // Rebuilt fresh from scratch rather than appended, so recover is
        // idempotent if it is ever driven twice off the same scratch.
        core.queue.clear();
        for k in &candidates {
            let points_here = core.scratch.neighbor_holder.get(k) == Some(&self.id);
            let was_asked = *core.scratch.neighbor_asked.get(k).unwrap_or(&false);
            if points_here && was_asked {
                core.queue.push_back(*k);
            }
        }

        core.in_recovery = false;
        core.scratch = RecoveryScratch::default();
        drop(core);

        tracing::info!("node {} left recovery mode", self.id);
        // Retry immediately rather than waiting on the next inbound message.
        self.drive().await;
    }

    /// Simulates a crash: wipes all pre-failure state, waits out the
    /// downtime, then broadcasts `RESTART` to every neighbor.
    pub async fn fail(&self) {
        {
            let mut core = self.core.lock().await;
            core.in_recovery = true;
            core.asked = false;
            core.using = false;
            core.queue.clear();
            core.holder = None;
            core.scratch.reset(&self.neighbors);
        }
        self.transport.set_alive(self.id, false).await;
        tracing::warn!("node {} failed", self.id);

        tokio::time::sleep(self.downtime).await;

        self.transport.set_alive(self.id, true).await;
        tracing::info!("node {} in recovery, broadcasting RESTART", self.id);
        for &neighbor in &self.neighbors {
            self.send(neighbor, Message::Restart { from: self.id }).await;
        }
    }

    /// Attempts `assign_privilege` then `make_request`, repeating until
    /// neither one's precondition holds. This is the loop-based
    /// restructuring of the reference's self-tail-calling, reentrant-locked
    /// version: each iteration releases and reacquires the per-node mutex
    /// instead of holding it recursively.
    async fn drive(&self) {
        loop {
            let assigned = self.try_assign_privilege().await;
            let requested = self.try_make_request().await;
            if !assigned && !requested {
                break;
            }
        }
    }

    async fn drive_if_not_recovering(&self) {
        if !self.core.lock().await.in_recovery {
            self.drive().await;
        }
    }

    /// Precondition: `holder == self ∧ ¬using ∧ queue non-empty`.
    async fn try_assign_privilege(&self) -> bool {
        let mut core = self.core.lock().await;
        if core.holder != Some(self.id) || core.using || core.queue.is_empty() {
            return false;
        }

        let next = core.queue.pop_front().expect("checked non-empty above");
        core.holder = Some(next);
        core.asked = false;

        if next == self.id {
            core.using = true;
            drop(core);

            tracing::info!("node {} entering critical section", self.id);
            {
                let _guard = self.sentinel.acquire();
                tokio::time::sleep(self.cs_duration).await;
            }
            tracing::info!("node {} leaving critical section", self.id);

            self.core.lock().await.using = false;
        } else {
            tracing::debug!("node {} assigning privilege to {}", self.id, next);
            drop(core);
            self.send(next, Message::Assign { from: self.id }).await;
        }
        true
    }

    /// Precondition: `holder != self ∧ queue non-empty ∧ ¬asked`.
    ///
    /// Holds the node's mutex across the `REQUEST` emission so that
    /// `asked ← true` is set after the message is sent but before the lock
    /// is released.
    async fn try_make_request(&self) -> bool {
        let mut core = self.core.lock().await;
        let Some(holder) = core.holder else {
            return false;
        };
        if holder == self.id || core.queue.is_empty() || core.asked {
            return false;
        }

        tracing::debug!("node {} sending REQUEST to {}", self.id, holder);
        if let Err(error) = self.transport.send(holder, Message::Request { from: self.id }).await
        {
            tracing::error!("node {} failed to deliver REQUEST: {error}", self.id);
        } else {
            self.counters.record_message_sent();
        }
        core.asked = true;
        true
    }

    async fn send(&self, dest: NodeId, message: Message) {
        match self.transport.send(dest, message).await {
            Ok(()) => self.counters.record_message_sent(),
            Err(error) => tracing::error!("node {} failed to deliver message to {dest}: {error}", self.id),
        }
    }
}

/// Draws a duration from `Exp(rate)`, as the reference does with
/// `-ln(1 - U(0,1)) / rate`.
pub(crate) fn exponential_duration(rate: f64) -> Duration {
    debug_assert!(rate > 0.0, "exponential rate must be positive");
    let u: f64 = rand::thread_rng().gen_range(f64::EPSILON..1.0);
    Duration::from_secs_f64(-u.ln() / rate)
}
