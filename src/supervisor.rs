//! The network supervisor: builds the initial neighbor graph,
//! starts and stops every node, and drives failure injection.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::ConfigError;
use crate::message::NodeId;
use crate::metrics::Counters;
use crate::node::{exponential_duration, Node};
use crate::sentinel::ResourceSentinel;
use crate::transport::Transport;

/// Constructs nodes, maintains the neighbor graph, starts/stops all nodes,
/// and drives failure injection by exponential inter-arrival times.
pub struct Supervisor {
    config: Config,
    ids: Vec<NodeId>,
    holders: HashMap<NodeId, Option<NodeId>>,
    ask_rates: HashMap<NodeId, f64>,
    edges: HashMap<NodeId, Vec<NodeId>>,
    transport: Transport,
    counters: Arc<Counters>,
    sentinel: Arc<ResourceSentinel>,
    shutdown: Arc<Notify>,
    nodes: HashMap<NodeId, Arc<Node>>,
    handles: Vec<JoinHandle<()>>,
    failure_handle: Option<JoinHandle<()>>,
}

impl Supervisor {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            ids: Vec::new(),
            holders: HashMap::new(),
            ask_rates: HashMap::new(),
            edges: HashMap::new(),
            transport: Transport::new(),
            counters: Arc::new(Counters::new()),
            sentinel: Arc::new(ResourceSentinel::new()),
            shutdown: Arc::new(Notify::new()),
            nodes: HashMap::new(),
            handles: Vec::new(),
            failure_handle: None,
        }
    }

    /// Registers a node and, if `holder` is given, wires a symmetric edge
    /// to it. The first node added with
    /// `holder = None` is the root; a second one is rejected by every
    /// subsequent call needing a *known* holder, so at most one root can
    /// exist by construction.
    pub fn add_node(
        &mut self,
        id: NodeId,
        holder: Option<NodeId>,
        ask_rate: Option<f64>,
    ) -> Result<(), ConfigError> {
        if self.holders.contains_key(&id) {
            return Err(ConfigError::DuplicateNodeId(id));
        }
        if let Some(holder_id) = holder {
            if !self.holders.contains_key(&holder_id) {
                return Err(ConfigError::UnknownHolderId { id, holder: holder_id });
            }
        }

        self.ids.push(id);
        self.holders.insert(id, holder);
        self.ask_rates
            .insert(id, ask_rate.unwrap_or(self.config.activity_rate));
        self.edges.entry(id).or_default();
        if let Some(holder_id) = holder {
            self.edges.get_mut(&id).expect("just inserted").push(holder_id);
            self.edges
                .get_mut(&holder_id)
                .expect("checked above")
                .push(id);
        }
        Ok(())
    }

    /// Constructs every node, spawns its requester and receiver loops, and
    /// — if `failure_rate > 0` — spawns the failure-injection task.
    pub async fn start(&mut self) {
        for &id in &self.ids {
            let neighbors = self.edges[&id].clone();
            let initial_holder = self.holders[&id].unwrap_or(id);
            let ask_rate = self.ask_rates[&id];
            let rx = self.transport.register(id).await;

            let node = Arc::new(Node::new(
                id,
                neighbors,
                initial_holder,
                ask_rate,
                self.config.cs_duration,
                self.config.downtime,
                self.transport.clone(),
                Arc::clone(&self.counters),
                Arc::clone(&self.sentinel),
                Arc::clone(&self.shutdown),
            ));
            self.handles.extend(node.spawn(rx));
            self.nodes.insert(id, node);
        }

        if self.config.failure_rate > 0.0 {
            self.failure_handle = Some(tokio::spawn(Self::failure_injection_loop(
                self.nodes.clone(),
                self.config.failure_rate,
                Arc::clone(&self.shutdown),
            )));
        }
    }

    /// Picks a node uniformly at random and fails it, waiting `Exp(rate)`
    /// between attempts. Enforces "at most one recovery at a time" by
    /// awaiting each failure's full downtime-plus-RESTART-broadcast before
    /// drawing the next victim, rather than racing the next pick against a
    /// still-recovering node in the background.
    async fn failure_injection_loop(
        nodes: HashMap<NodeId, Arc<Node>>,
        failure_rate: f64,
        shutdown: Arc<Notify>,
    ) {
        let ids: Vec<NodeId> = nodes.keys().copied().collect();
        if ids.is_empty() {
            return;
        }

        loop {
            let wait = exponential_duration(failure_rate);
            tokio::select! {
                biased;
                _ = shutdown.notified() => return,
                _ = tokio::time::sleep(wait) => {}
            }

            let victim = ids[rand::thread_rng().gen_range(0..ids.len())];
            tracing::warn!("supervisor injecting failure into node {victim}");
            tokio::select! {
                biased;
                _ = shutdown.notified() => return,
                _ = nodes[&victim].fail() => {}
            }
        }
    }

    /// Fails a specific node by id, bypassing the random injection loop.
    /// Returns `false` if no such node is running. Exposed so tests and
    /// tooling can drive deterministic failure scenarios instead of the
    /// `Exp(failure_rate)` schedule used for organic runs.
    pub async fn fail_node(&self, id: NodeId) -> bool {
        match self.nodes.get(&id) {
            Some(node) => {
                node.fail().await;
                true
            },
            None => false,
        }
    }

    /// Looks up whether a running node is currently in its recovery window.
    pub async fn is_node_in_recovery(&self, id: NodeId) -> bool {
        match self.nodes.get(&id) {
            Some(node) => node.is_in_recovery().await,
            None => false,
        }
    }

    /// Broadcasts shutdown to every node, joins all tasks, and reports the
    /// final `(messages_sent, requests_issued)` counters.
    pub async fn stop(&mut self) -> (u64, u64) {
        tracing::info!("stopping network supervisor");
        self.shutdown.notify_waiters();

        if let Some(handle) = self.failure_handle.take() {
            let _ = handle.await;
        }
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }

        self.counters.snapshot()
    }
}

/// Declarative sugar over repeated [`Supervisor::add_node`] calls, so a
/// binary or test can describe a whole tree in one chained expression.
pub struct SupervisorBuilder {
    config: Config,
    nodes: Vec<(NodeId, Option<NodeId>, Option<f64>)>,
}

impl SupervisorBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            nodes: Vec::new(),
        }
    }

    pub fn with_node(mut self, id: NodeId, holder: Option<NodeId>, ask_rate: Option<f64>) -> Self {
        self.nodes.push((id, holder, ask_rate));
        self
    }

    pub fn build(self) -> Result<Supervisor, ConfigError> {
        let mut supervisor = Supervisor::new(self.config);
        for (id, holder, ask_rate) in self.nodes {
            supervisor.add_node(id, holder, ask_rate)?;
        }
        Ok(supervisor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_node_ids() {
        let mut supervisor = Supervisor::new(Config::default());
        supervisor.add_node(1, None, None).unwrap();
        assert_eq!(
            supervisor.add_node(1, None, None),
            Err(ConfigError::DuplicateNodeId(1))
        );
    }

    #[test]
    fn rejects_unknown_holder_ids() {
        let mut supervisor = Supervisor::new(Config::default());
        assert_eq!(
            supervisor.add_node(2, Some(1), None),
            Err(ConfigError::UnknownHolderId { id: 2, holder: 1 })
        );
    }

    #[test]
    fn wires_symmetric_edges() {
        let mut supervisor = Supervisor::new(Config::default());
        supervisor.add_node(3, None, None).unwrap();
        supervisor.add_node(4, Some(3), None).unwrap();
        supervisor.add_node(2, Some(3), None).unwrap();

        assert_eq!(supervisor.edges[&3], vec![4, 2]);
        assert_eq!(supervisor.edges[&4], vec![3]);
        assert_eq!(supervisor.edges[&2], vec![3]);
    }

    #[test]
    fn builder_wires_the_same_graph_as_add_node() {
        let supervisor = SupervisorBuilder::new(Config::default())
            .with_node(3, None, None)
            .with_node(4, Some(3), None)
            .with_node(2, Some(3), None)
            .build()
            .unwrap();

        assert_eq!(supervisor.edges[&3], vec![4, 2]);
    }
}
