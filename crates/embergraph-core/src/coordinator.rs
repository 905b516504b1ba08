//! # Transaction Coordinator
//!
//! Owns the committed state and serializes access to it:
//!
//! - hands out ids and binds each transaction to its calling thread
//! - serializes commits through a bounded-wait commit gate
//! - validates a transaction's changes against the current committed image
//! - appends the commit record, then publishes the new image
//! - runs the shutdown barrier for `close()`
//!
//! Readers never take the gate. They clone the current `Arc<StoreState>` and
//! read it without further locking.
//!
//! Locks here are never held while caller code runs, so a poisoned lock still
//! guards consistent data and is recovered rather than propagated.

use crate::config::StoreConfig;
use crate::mutation::{CommitRecord, Mutation};
use crate::storage::{RedbLog, StorageBackend, StoreState};
use crate::transaction::Transaction;
use crate::{Direction, GraphError, NodeId, RelationshipId, TransactionId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// COMMIT GATE
// =============================================================================

/// A mutual-exclusion gate with a bounded wait.
#[derive(Debug, Default)]
struct CommitGate {
    busy: Mutex<bool>,
    released: Condvar,
}

/// Held while a commit (or checkpoint) runs. Opens the gate on drop.
struct GatePermit<'a> {
    gate: &'a CommitGate,
}

impl CommitGate {
    fn acquire(&self, timeout: Duration) -> Result<GatePermit<'_>, GraphError> {
        let deadline = Instant::now() + timeout;
        let mut busy = lock(&self.busy);
        while *busy {
            let now = Instant::now();
            if now >= deadline {
                warn!(?timeout, "Commit gate wait expired");
                return Err(GraphError::Timeout(format!(
                    "commit gate not acquired within {:?}",
                    timeout
                )));
            }
            let (guard, _) = self
                .released
                .wait_timeout(busy, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            busy = guard;
        }
        *busy = true;
        Ok(GatePermit { gate: self })
    }
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        *lock(&self.gate.busy) = false;
        self.gate.released.notify_one();
    }
}

// =============================================================================
// COMMIT REQUEST
// =============================================================================

/// Everything the coordinator needs to validate and publish one transaction.
#[derive(Debug)]
pub(crate) struct CommitRequest {
    pub transaction: TransactionId,
    /// Sequence of the snapshot the transaction read from.
    pub start_sequence: u64,
    pub mutations: Vec<Mutation>,
    /// Pre-existing nodes the transaction modified or deleted.
    pub written_nodes: BTreeSet<NodeId>,
    /// Pre-existing relationships the transaction modified or deleted.
    pub written_relationships: BTreeSet<RelationshipId>,
}

// =============================================================================
// COORDINATOR
// =============================================================================

/// Shared core of a `GraphDatabase`.
#[derive(Debug)]
pub(crate) struct Coordinator {
    config: StoreConfig,
    state: RwLock<Arc<StoreState>>,
    /// `None` once the store is closed.
    backend: Mutex<Option<StorageBackend>>,
    gate: CommitGate,
    next_node_id: AtomicU64,
    next_relationship_id: AtomicU64,
    next_transaction_id: AtomicU64,
    /// Execution context -> its active transaction.
    contexts: Mutex<HashMap<ThreadId, TransactionId>>,
    /// Signalled whenever a transaction releases its context.
    idle: Condvar,
    closing: AtomicBool,
    closed: AtomicBool,
    commits_since_checkpoint: AtomicU64,
}

impl Coordinator {
    /// Open the backend named by `config` and recover its state.
    pub(crate) fn open(config: StoreConfig) -> Result<Arc<Self>, GraphError> {
        let (backend, state) = match &config.path {
            Some(path) => {
                let (log, state, _) = RedbLog::open(path)?;
                (StorageBackend::Persistent(log), state)
            }
            None => (StorageBackend::InMemory, StoreState::new()),
        };

        info!(
            persistent = backend.is_persistent(),
            nodes = state.graph.node_count(),
            relationships = state.graph.relationship_count(),
            last_sequence = state.last_sequence,
            "Store opened"
        );

        Ok(Arc::new(Self {
            next_node_id: AtomicU64::new(state.next_node_id),
            next_relationship_id: AtomicU64::new(state.next_relationship_id),
            next_transaction_id: AtomicU64::new(1),
            state: RwLock::new(Arc::new(state)),
            backend: Mutex::new(Some(backend)),
            gate: CommitGate::default(),
            contexts: Mutex::new(HashMap::new()),
            idle: Condvar::new(),
            closing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            commits_since_checkpoint: AtomicU64::new(0),
            config,
        }))
    }

    pub(crate) fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The current committed image.
    pub(crate) fn snapshot(&self) -> Arc<StoreState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    // =========================================================================
    // TRANSACTION LIFECYCLE
    // =========================================================================

    /// Start a transaction bound to the calling thread.
    pub(crate) fn begin(self: &Arc<Self>) -> Result<Transaction, GraphError> {
        let id = {
            let mut contexts = lock(&self.contexts);
            if self.closing.load(Ordering::SeqCst) || self.closed.load(Ordering::SeqCst) {
                return Err(GraphError::StoreClosed);
            }
            let thread = thread::current().id();
            if contexts.contains_key(&thread) {
                return Err(GraphError::TransactionInProgress);
            }
            let id = TransactionId(self.next_transaction_id.fetch_add(1, Ordering::SeqCst));
            contexts.insert(thread, id);
            id
        };

        debug!(transaction = %id, "Transaction started");
        Ok(Transaction::new(id, Arc::clone(self), self.snapshot()))
    }

    /// Unbind `id` from the calling thread.
    pub(crate) fn release(&self, id: TransactionId) {
        let mut contexts = lock(&self.contexts);
        let thread = thread::current().id();
        if contexts.get(&thread) == Some(&id) {
            contexts.remove(&thread);
        }
        self.idle.notify_all();
    }

    pub(crate) fn active_transactions(&self) -> usize {
        lock(&self.contexts).len()
    }

    pub(crate) fn allocate_node_id(&self) -> NodeId {
        NodeId(self.next_node_id.fetch_add(1, Ordering::SeqCst))
    }

    pub(crate) fn allocate_relationship_id(&self) -> RelationshipId {
        RelationshipId(self.next_relationship_id.fetch_add(1, Ordering::SeqCst))
    }

    // =========================================================================
    // COMMIT
    // =========================================================================

    /// Validate, log and publish one transaction. Returns its commit
    /// sequence. On error nothing has changed.
    pub(crate) fn commit(&self, request: CommitRequest) -> Result<u64, GraphError> {
        let _permit = self.gate.acquire(self.config.commit_timeout())?;

        let (record, next, current_sequence) = {
            let current = self.snapshot();
            if request.mutations.is_empty() {
                return Ok(current.last_sequence);
            }
            validate(&current, &request)?;
            let record = CommitRecord {
                sequence: current.last_sequence + 1,
                transaction: request.transaction,
                next_node_id: self.next_node_id.load(Ordering::SeqCst),
                next_relationship_id: self.next_relationship_id.load(Ordering::SeqCst),
                mutations: request.mutations,
            };
            let next = stage(&current, &record)?;
            (record, next, current.last_sequence)
        };

        {
            let backend = lock(&self.backend);
            let backend = backend.as_ref().ok_or(GraphError::StoreClosed)?;
            backend.append(&record)?;
        }

        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);

        debug!(
            transaction = %record.transaction,
            sequence = record.sequence,
            previous = current_sequence,
            mutations = record.mutations.len(),
            graph_mutations = record.graph_mutation_count(),
            "Transaction committed"
        );

        let interval = self.config.checkpoint_interval;
        if interval > 0
            && self.commits_since_checkpoint.fetch_add(1, Ordering::SeqCst) + 1 >= interval
        {
            if let Err(e) = self.checkpoint_locked() {
                warn!("Automatic checkpoint failed: {}", e);
            }
        }

        Ok(record.sequence)
    }

    /// Write a checkpoint now. Returns the number of log records folded in.
    pub(crate) fn checkpoint(&self) -> Result<u64, GraphError> {
        let _permit = self.gate.acquire(self.config.commit_timeout())?;
        self.checkpoint_locked()
    }

    /// Checkpoint while the caller holds the commit gate.
    fn checkpoint_locked(&self) -> Result<u64, GraphError> {
        let state = self.snapshot();
        let backend = lock(&self.backend);
        let backend = backend.as_ref().ok_or(GraphError::StoreClosed)?;
        let removed = backend.checkpoint(&state)?;
        self.commits_since_checkpoint.store(0, Ordering::SeqCst);
        Ok(removed)
    }

    pub(crate) fn pending_log_records(&self) -> Result<u64, GraphError> {
        let backend = lock(&self.backend);
        let backend = backend.as_ref().ok_or(GraphError::StoreClosed)?;
        backend.pending_records()
    }

    pub(crate) fn is_persistent(&self) -> bool {
        self.config.is_persistent()
    }

    // =========================================================================
    // SHUTDOWN
    // =========================================================================

    /// Stop accepting transactions, wait for in-flight ones, checkpoint if
    /// configured, and release the backend.
    pub(crate) fn close(&self) -> Result<(), GraphError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }

        let timeout = self.config.shutdown_timeout();
        {
            let mut contexts = lock(&self.contexts);
            if contexts.contains_key(&thread::current().id()) {
                return Err(GraphError::TransactionInProgress);
            }
            self.closing.store(true, Ordering::SeqCst);
            info!(in_flight = contexts.len(), "Closing store");

            let deadline = Instant::now() + timeout;
            while !contexts.is_empty() {
                let now = Instant::now();
                if now >= deadline {
                    self.closing.store(false, Ordering::SeqCst);
                    warn!(
                        in_flight = contexts.len(),
                        ?timeout,
                        "Close timed out waiting for transactions"
                    );
                    return Err(GraphError::Timeout(format!(
                        "{} transaction(s) still active after {:?}",
                        contexts.len(),
                        timeout
                    )));
                }
                let (guard, _) = self
                    .idle
                    .wait_timeout(contexts, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
                contexts = guard;
            }
        }

        let backend = lock(&self.backend).take();
        if let Some(backend) = backend {
            if self.config.checkpoint_on_close && backend.is_persistent() {
                let state = self.snapshot();
                if let Err(e) = backend.checkpoint(&state) {
                    warn!("Checkpoint on close failed, log kept intact: {}", e);
                }
            }
            drop(backend);
            info!("Store closed");
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Apply `record` to a private copy of `current`. Readers never see the copy
/// unless it is published, so a record that fails to apply leaves no trace.
fn stage(current: &StoreState, record: &CommitRecord) -> Result<StoreState, GraphError> {
    let mut next = current.clone();
    next.apply(record).map_err(|e| {
        warn!(sequence = record.sequence, "Validated record failed to apply: {}", e);
        e
    })?;
    Ok(next)
}

/// Check a transaction against the current committed image.
///
/// Write-write conflicts are detected on the entities the transaction wrote
/// and did not create. Referential integrity is then checked by walking the
/// mutations in order over a small delta on top of `current`, mirroring what
/// `StoreState::apply` will do.
fn validate(current: &StoreState, request: &CommitRequest) -> Result<(), GraphError> {
    for node in &request.written_nodes {
        match current.graph.node_version(*node) {
            None => {
                warn!(transaction = %request.transaction, %node, "Write conflict");
                return Err(GraphError::Conflict(format!(
                    "{} was deleted by a concurrent transaction",
                    node
                )));
            }
            Some(version) if version > request.start_sequence => {
                warn!(transaction = %request.transaction, %node, "Write conflict");
                return Err(GraphError::Conflict(format!(
                    "{} was modified by a concurrent transaction",
                    node
                )));
            }
            Some(_) => {}
        }
    }
    for rel in &request.written_relationships {
        match current.graph.relationship_version(*rel) {
            None => {
                warn!(transaction = %request.transaction, %rel, "Write conflict");
                return Err(GraphError::Conflict(format!(
                    "{} was deleted by a concurrent transaction",
                    rel
                )));
            }
            Some(version) if version > request.start_sequence => {
                warn!(transaction = %request.transaction, %rel, "Write conflict");
                return Err(GraphError::Conflict(format!(
                    "{} was modified by a concurrent transaction",
                    rel
                )));
            }
            Some(_) => {}
        }
    }

    // Existence overrides on top of `current`.
    let mut nodes: BTreeMap<NodeId, bool> = BTreeMap::new();
    let mut rels: BTreeMap<RelationshipId, Option<(NodeId, NodeId)>> = BTreeMap::new();
    let node_exists = |nodes: &BTreeMap<NodeId, bool>, id: NodeId| {
        nodes
            .get(&id)
            .copied()
            .unwrap_or_else(|| current.graph.contains_node(id))
    };
    let rel_exists = |rels: &BTreeMap<RelationshipId, Option<(NodeId, NodeId)>>,
                      id: RelationshipId| {
        rels.get(&id)
            .map(Option::is_some)
            .unwrap_or_else(|| current.graph.contains_relationship(id))
    };

    for mutation in &request.mutations {
        match mutation {
            Mutation::CreateNode { node } => {
                nodes.insert(*node, true);
            }
            Mutation::DeleteNode { node } => {
                let committed = current
                    .graph
                    .relationship_ids(*node, Direction::Both)
                    .into_iter()
                    .filter(|id| !matches!(rels.get(id), Some(None)))
                    .count();
                let staged = rels
                    .values()
                    .filter(|ends| matches!(ends, Some((s, e)) if s == node || e == node))
                    .count();
                if committed + staged > 0 {
                    return Err(GraphError::ConsistencyViolation(format!(
                        "{} still has {} relationship(s) at commit",
                        node,
                        committed + staged
                    )));
                }
                nodes.insert(*node, false);
            }
            Mutation::SetNodeProperty { node, .. } | Mutation::RemoveNodeProperty { node, .. } => {
                if !node_exists(&nodes, *node) {
                    return Err(GraphError::Conflict(format!(
                        "{} no longer exists",
                        node
                    )));
                }
            }
            Mutation::CreateRelationship {
                relationship,
                start,
                end,
                ..
            } => {
                for endpoint in [start, end] {
                    if !node_exists(&nodes, *endpoint) {
                        return Err(GraphError::ConsistencyViolation(format!(
                            "{} references {} which does not exist at commit",
                            relationship, endpoint
                        )));
                    }
                }
                rels.insert(*relationship, Some((*start, *end)));
            }
            Mutation::DeleteRelationship { relationship } => {
                if !rel_exists(&rels, *relationship) {
                    return Err(GraphError::Conflict(format!(
                        "{} no longer exists",
                        relationship
                    )));
                }
                rels.insert(*relationship, None);
            }
            Mutation::SetRelationshipProperty { relationship, .. }
            | Mutation::RemoveRelationshipProperty { relationship, .. } => {
                if !rel_exists(&rels, *relationship) {
                    return Err(GraphError::Conflict(format!(
                        "{} no longer exists",
                        relationship
                    )));
                }
            }
            Mutation::IndexAdd { index, node, .. } => {
                if !node_exists(&nodes, *node) {
                    return Err(GraphError::ConsistencyViolation(format!(
                        "index '{}' entry references {} which does not exist at commit",
                        index, node
                    )));
                }
            }
            Mutation::IndexRemove { .. } => {}
        }
    }
    Ok(())
}
