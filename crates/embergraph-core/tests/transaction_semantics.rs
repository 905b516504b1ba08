//! # Transaction Semantics Tests
//!
//! Isolation, atomicity, lifecycle and concurrency behaviour of the Graph API
//! against in-memory stores.
//!
//! ## Groups
//! - lifecycle: state machine, thread binding, finished transactions
//! - isolation: uncommitted writes, snapshots, read-your-own-writes
//! - graph_ops: nodes, relationships, properties, traversal
//! - indexes: opt-in entries, lookups, removal, purge on delete
//! - concurrency: conflicts, commit gate, shutdown barrier

use embergraph_core::{
    Direction, GraphDatabase, GraphError, GraphRead, PropertyValue, RelationshipType, StoreConfig,
    TransactionState,
};

fn memory_db() -> GraphDatabase {
    GraphDatabase::in_memory().expect("open in-memory store")
}

// =============================================================================
// LIFECYCLE
// =============================================================================

mod lifecycle {
    use super::*;

    #[test]
    fn commit_moves_to_committed() {
        let db = memory_db();
        let mut tx = db.begin().expect("begin");
        assert_eq!(tx.state(), TransactionState::Active);
        tx.create_node().expect("create");
        tx.commit().expect("commit");

        assert_eq!(tx.state(), TransactionState::Committed);
        assert_eq!(db.node_count(), 1);
    }

    #[test]
    fn finish_without_success_rolls_back() {
        let db = memory_db();
        let mut tx = db.begin().expect("begin");
        tx.create_node().expect("create");
        tx.finish().expect("finish");

        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert_eq!(db.node_count(), 0);
    }

    #[test]
    fn failure_clears_success_mark() {
        let db = memory_db();
        let mut tx = db.begin().expect("begin");
        tx.create_node().expect("create");
        tx.success().expect("success");
        tx.failure().expect("failure");
        tx.finish().expect("finish");

        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert_eq!(db.node_count(), 0);
    }

    #[test]
    fn drop_rolls_back_active_transaction() {
        let db = memory_db();
        {
            let mut tx = db.begin().expect("begin");
            tx.create_node().expect("create");
        }
        assert_eq!(db.node_count(), 0);
        // Context released: a new transaction can begin on this thread.
        assert!(db.begin().is_ok());
    }

    #[test]
    fn operations_after_finish_are_rejected() {
        let db = memory_db();
        let mut tx = db.begin().expect("begin");
        let node = tx.create_node().expect("create");
        tx.commit().expect("commit");

        assert!(matches!(
            tx.create_node(),
            Err(GraphError::TransactionNotActive(TransactionState::Committed))
        ));
        assert!(matches!(
            tx.node(node),
            Err(GraphError::TransactionNotActive(_))
        ));
        assert!(matches!(
            tx.finish(),
            Err(GraphError::TransactionNotActive(_))
        ));
        assert!(matches!(
            tx.rollback(),
            Err(GraphError::TransactionNotActive(_))
        ));
    }

    #[test]
    fn second_begin_on_same_thread_is_rejected() {
        let db = memory_db();
        let mut tx = db.begin().expect("begin");
        assert!(matches!(db.begin(), Err(GraphError::TransactionInProgress)));

        tx.finish().expect("finish");
        assert!(db.begin().is_ok());
    }

    #[test]
    fn execute_commits_on_ok_and_rolls_back_on_err() {
        let db = memory_db();
        let node = db
            .execute(|tx| {
                let node = tx.create_node()?;
                tx.set_node_property(node, "name", "kept")?;
                Ok(node)
            })
            .expect("execute");
        assert!(db.snapshot().contains_node(node));

        let result: Result<(), GraphError> = db.execute(|tx| {
            tx.create_node()?;
            Err(GraphError::InvalidInput("abort".into()))
        });
        assert!(matches!(result, Err(GraphError::InvalidInput(_))));
        assert_eq!(db.node_count(), 1);
    }

    #[test]
    fn empty_commit_is_a_noop() {
        let db = memory_db();
        let mut tx = db.begin().expect("begin");
        tx.commit().expect("commit");
        assert_eq!(db.stats().expect("stats").last_sequence, 0);
    }
}

// =============================================================================
// ISOLATION
// =============================================================================

mod isolation {
    use super::*;

    #[test]
    fn uncommitted_writes_are_invisible_to_snapshots() {
        let db = memory_db();
        let mut tx = db.begin().expect("begin");
        let node = tx.create_node().expect("create");

        assert!(tx.contains_node(node));
        assert!(!db.snapshot().contains_node(node));
        assert_eq!(db.node_count(), 0);

        tx.commit().expect("commit");
        assert!(db.snapshot().contains_node(node));
    }

    #[test]
    fn snapshot_is_frozen() {
        let db = memory_db();
        let before = db.snapshot();
        db.execute(|tx| tx.create_node().map(|_| ()))
            .expect("execute");

        assert_eq!(before.node_count(), 0);
        assert_eq!(db.snapshot().node_count(), 1);
        assert_eq!(before.sequence() + 1, db.snapshot().sequence());
    }

    #[test]
    fn transaction_reads_own_property_writes() {
        let db = memory_db();
        let node = db
            .execute(|tx| {
                let node = tx.create_node()?;
                tx.set_node_property(node, "username", "old")?;
                Ok(node)
            })
            .expect("seed");

        let mut tx = db.begin().expect("begin");
        tx.set_node_property(node, "username", "new").expect("set");
        assert_eq!(
            tx.node_property(node, "username").expect("read"),
            PropertyValue::from("new")
        );
        assert_eq!(
            db.snapshot().node_property(node, "username").expect("read"),
            PropertyValue::from("old")
        );

        let previous = tx.remove_node_property(node, "username").expect("remove");
        assert_eq!(previous, PropertyValue::from("new"));
        assert!(matches!(
            tx.node_property(node, "username"),
            Err(GraphError::PropertyNotFound(_))
        ));
        tx.rollback().expect("rollback");

        assert_eq!(
            db.snapshot().node_property(node, "username").expect("read"),
            PropertyValue::from("old")
        );
    }

    #[test]
    fn rollback_restores_counts() {
        let db = memory_db();
        db.execute(|tx| {
            let a = tx.create_node()?;
            let b = tx.create_node()?;
            tx.create_relationship(a, b, "KNOWS")?;
            Ok(())
        })
        .expect("seed");

        let mut tx = db.begin().expect("begin");
        let c = tx.create_node().expect("create");
        let a = embergraph_core::NodeId(0);
        tx.create_relationship(a, c, "KNOWS").expect("rel");
        assert_eq!(tx.node_count(), 3);
        assert_eq!(tx.relationship_count(), 2);
        tx.rollback().expect("rollback");

        assert_eq!(db.node_count(), 2);
        assert_eq!(db.relationship_count(), 1);
    }
}

// =============================================================================
// GRAPH OPERATIONS
// =============================================================================

mod graph_ops {
    use super::*;

    #[test]
    fn missing_entities_are_not_found() {
        let db = memory_db();
        let mut tx = db.begin().expect("begin");
        let ghost = embergraph_core::NodeId(99);

        assert!(matches!(tx.node(ghost), Err(GraphError::NodeNotFound(_))));
        assert!(matches!(
            tx.delete_node(ghost),
            Err(GraphError::NodeNotFound(_))
        ));
        assert!(matches!(
            tx.set_node_property(ghost, "k", 1),
            Err(GraphError::NodeNotFound(_))
        ));
        assert!(matches!(
            tx.delete_relationship(embergraph_core::RelationshipId(7)),
            Err(GraphError::RelationshipNotFound(_))
        ));

        let node = tx.create_node().expect("create");
        assert!(matches!(
            tx.create_relationship(node, ghost, "USER"),
            Err(GraphError::NodeNotFound(_))
        ));
        assert!(matches!(
            tx.node_property(node, "missing"),
            Err(GraphError::PropertyNotFound(_))
        ));
    }

    #[test]
    fn delete_node_with_relationships_is_conflict() {
        let db = memory_db();
        let mut tx = db.begin().expect("begin");
        let a = tx.create_node().expect("a");
        let b = tx.create_node().expect("b");
        let rel = tx.create_relationship(a, b, "USER").expect("rel");

        assert!(matches!(tx.delete_node(b), Err(GraphError::Conflict(_))));

        tx.delete_relationship(rel).expect("delete rel");
        tx.delete_node(b).expect("delete node");
        tx.commit().expect("commit");

        assert_eq!(db.node_count(), 1);
        assert_eq!(db.relationship_count(), 0);
    }

    #[test]
    fn traversal_by_direction_and_type() {
        let db = memory_db();
        let mut tx = db.begin().expect("begin");
        let hub = tx.create_node().expect("hub");
        let u1 = tx.create_node().expect("u1");
        let u2 = tx.create_node().expect("u2");
        let r1 = tx.create_relationship(hub, u1, "USER").expect("r1");
        let r2 = tx.create_relationship(hub, u2, "USER").expect("r2");
        let r3 = tx.create_relationship(u2, hub, "ADMIN").expect("r3");
        let looped = tx.create_relationship(hub, hub, "SELF").expect("loop");

        let out = tx
            .relationships(hub, Direction::Outgoing, &[])
            .expect("out");
        assert_eq!(out.ids().collect::<Vec<_>>(), vec![r1, r2, looped]);

        let users = tx
            .relationships(hub, Direction::Outgoing, &[RelationshipType::new("USER")])
            .expect("users");
        assert_eq!(users.other_nodes(hub).collect::<Vec<_>>(), vec![u1, u2]);

        let incoming = tx
            .relationships(hub, Direction::Incoming, &[])
            .expect("in");
        assert_eq!(incoming.ids().collect::<Vec<_>>(), vec![r3, looped]);

        let both = tx.relationships(hub, Direction::Both, &[]).expect("both");
        assert_eq!(both.len(), 4);
        tx.commit().expect("commit");

        // Same answer from committed state, and the sequence restarts.
        let snapshot = db.snapshot();
        let both = snapshot
            .relationships(hub, Direction::Both, &[])
            .expect("both");
        let first: Vec<_> = both.ids().collect();
        let second: Vec<_> = both.iter().map(|r| r.id).collect();
        assert_eq!(first, vec![r1, r2, r3, looped]);
        assert_eq!(first, second);
    }

    #[test]
    fn relationship_properties() {
        let db = memory_db();
        let mut tx = db.begin().expect("begin");
        let a = tx.create_node().expect("a");
        let b = tx.create_node().expect("b");
        let rel = tx.create_relationship(a, b, "KNOWS").expect("rel");
        tx.set_relationship_property(rel, "since", 2009).expect("set");
        tx.commit().expect("commit");

        let snapshot = db.snapshot();
        let stored = snapshot.relationship(rel).expect("rel");
        assert_eq!(stored.rel_type, RelationshipType::new("KNOWS"));
        assert_eq!(stored.start, a);
        assert_eq!(stored.end, b);
        assert_eq!(
            snapshot.relationship_property(rel, "since").expect("prop"),
            PropertyValue::Integer(2009)
        );

        let mut tx = db.begin().expect("begin");
        assert_eq!(
            tx.remove_relationship_property(rel, "since").expect("remove"),
            PropertyValue::Integer(2009)
        );
        tx.commit().expect("commit");
        assert!(matches!(
            db.snapshot().relationship_property(rel, "since"),
            Err(GraphError::PropertyNotFound(_))
        ));
    }

    #[test]
    fn invalid_input_rejected() {
        let db = memory_db();
        let mut tx = db.begin().expect("begin");
        let node = tx.create_node().expect("create");

        assert!(matches!(
            tx.set_node_property(node, "", 1),
            Err(GraphError::InvalidInput(_))
        ));
        assert!(matches!(
            tx.create_relationship(node, node, ""),
            Err(GraphError::InvalidInput(_))
        ));
        assert!(matches!(
            tx.index_add("", node, "k", 1),
            Err(GraphError::InvalidInput(_))
        ));
        // Rejected calls stage nothing.
        assert_eq!(tx.pending_mutations(), 1);
    }

    #[test]
    fn ids_are_never_reused() {
        let db = memory_db();
        let first = db
            .execute(|tx| {
                let node = tx.create_node()?;
                tx.delete_node(node)?;
                Ok(node)
            })
            .expect("first");
        let second = db.execute(|tx| tx.create_node()).expect("second");
        assert!(second > first);
    }
}

// =============================================================================
// INDEXES
// =============================================================================

mod indexes {
    use super::*;

    #[test]
    fn index_is_opt_in() {
        let db = memory_db();
        let node = db
            .execute(|tx| {
                let node = tx.create_node()?;
                tx.set_node_property(node, "username", "user1@embergraph.org")?;
                Ok(node)
            })
            .expect("seed");

        let value = PropertyValue::from("user1@embergraph.org");
        assert!(db.snapshot().index_get("nodes", "username", &value).is_empty());

        db.execute(|tx| tx.index_add("nodes", node, "username", value.clone()))
            .expect("index");
        let hits = db.snapshot().index_get("nodes", "username", &value);
        assert_eq!(hits.single().expect("single"), node);
        assert_eq!(db.index_names(), vec!["nodes".to_string()]);
    }

    #[test]
    fn index_entries_follow_transaction_scope() {
        let db = memory_db();
        let mut tx = db.begin().expect("begin");
        let node = tx.create_node().expect("create");
        tx.index_add("nodes", node, "username", "u").expect("add");

        let value = PropertyValue::from("u");
        assert_eq!(tx.index_get("nodes", "username", &value).len(), 1);
        assert!(db.snapshot().index_get("nodes", "username", &value).is_empty());
        tx.rollback().expect("rollback");

        assert!(db.snapshot().index_get("nodes", "username", &value).is_empty());
        assert!(db.index_names().is_empty());
    }

    #[test]
    fn remove_missing_entry_is_not_found() {
        let db = memory_db();
        let mut tx = db.begin().expect("begin");
        let node = tx.create_node().expect("create");
        assert!(matches!(
            tx.index_remove("nodes", node, "username", "u"),
            Err(GraphError::IndexEntryNotFound { .. })
        ));

        tx.index_add("nodes", node, "username", "u").expect("add");
        tx.index_remove("nodes", node, "username", "u").expect("remove");
        assert!(
            tx.index_get("nodes", "username", &PropertyValue::from("u"))
                .is_empty()
        );
    }

    #[test]
    fn single_reports_ambiguity() {
        let db = memory_db();
        let mut tx = db.begin().expect("begin");
        let a = tx.create_node().expect("a");
        let b = tx.create_node().expect("b");
        tx.index_add("nodes", a, "team", "core").expect("add");
        tx.index_add("nodes", b, "team", "core").expect("add");

        let hits = tx.index_get("nodes", "team", &PropertyValue::from("core"));
        assert!(matches!(hits.single(), Err(GraphError::AmbiguousResult(2))));
        assert_eq!(hits.iter().collect::<Vec<_>>(), vec![a, b]);

        let none = tx.index_get("nodes", "team", &PropertyValue::from("other"));
        assert!(matches!(
            none.single(),
            Err(GraphError::IndexEntryNotFound { .. })
        ));
        assert_eq!(none.single_or_none().expect("none"), None);
    }

    #[test]
    fn remove_by_node_and_key() {
        let db = memory_db();
        let node = db
            .execute(|tx| {
                let node = tx.create_node()?;
                tx.index_add("references", node, "reference", "users")?;
                tx.index_add("references", node, "reference", "admins")?;
                tx.index_add("references", node, "kind", "root")?;
                Ok(node)
            })
            .expect("seed");

        let mut tx = db.begin().expect("begin");
        assert_eq!(
            tx.index_remove_key("references", node, "reference")
                .expect("by key"),
            2
        );
        assert_eq!(
            tx.index_remove_node("references", node).expect("by node"),
            1
        );
        assert_eq!(
            tx.index_remove_node("references", node).expect("again"),
            0
        );
        tx.commit().expect("commit");

        assert_eq!(db.stats().expect("stats").indexes.get("references"), Some(&0));
    }

    #[test]
    fn deleting_node_purges_its_entries() {
        let db = memory_db();
        let node = db
            .execute(|tx| {
                let node = tx.create_node()?;
                tx.index_add("nodes", node, "username", "gone")?;
                Ok(node)
            })
            .expect("seed");

        let value = PropertyValue::from("gone");
        let mut tx = db.begin().expect("begin");
        tx.delete_node(node).expect("delete");
        assert!(tx.index_get("nodes", "username", &value).is_empty());
        tx.commit().expect("commit");

        assert!(db.snapshot().index_get("nodes", "username", &value).is_empty());
        assert_eq!(db.stats().expect("stats").indexes.get("nodes"), Some(&0));
    }
}

// =============================================================================
// CONCURRENCY
// =============================================================================

mod concurrency {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn concurrent_relationships_to_same_node_both_commit() {
        let db = memory_db();
        let hub = db.execute(|tx| tx.create_node()).expect("hub");

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let db = db.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let mut tx = db.begin().expect("begin");
                    let user = tx.create_node().expect("user");
                    tx.create_relationship(hub, user, "USER").expect("rel");
                    barrier.wait();
                    tx.commit()
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("join").expect("commit");
        }
        assert_eq!(db.relationship_count(), 2);
    }

    #[test]
    fn concurrent_deletes_of_same_node_one_conflicts() {
        let db = memory_db();
        let target = db.execute(|tx| tx.create_node()).expect("target");

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let db = db.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let mut tx = db.begin().expect("begin");
                    tx.delete_node(target).expect("delete");
                    barrier.wait();
                    tx.commit()
                })
            })
            .collect();

        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("join"))
            .collect();
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(GraphError::Conflict(_))))
            .count();
        assert_eq!((ok, conflicts), (1, 1));
        assert_eq!(db.node_count(), 0);
    }

    #[test]
    fn relationship_to_concurrently_deleted_node_is_violation() {
        let db = memory_db();
        let target = db.execute(|tx| tx.create_node()).expect("target");

        let mut tx = db.begin().expect("begin");
        let user = tx.create_node().expect("user");
        tx.create_relationship(user, target, "USER").expect("rel");

        let other = db.clone();
        thread::spawn(move || other.execute(|tx| tx.delete_node(target)))
            .join()
            .expect("join")
            .expect("delete");

        assert!(matches!(
            tx.commit(),
            Err(GraphError::ConsistencyViolation(_))
        ));
        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert_eq!(db.relationship_count(), 0);
        assert_eq!(db.node_count(), 0);
    }

    #[test]
    fn concurrent_property_writes_conflict() {
        let db = memory_db();
        let node = db.execute(|tx| tx.create_node()).expect("node");

        let mut tx = db.begin().expect("begin");
        tx.set_node_property(node, "name", "mine").expect("set");

        let other = db.clone();
        thread::spawn(move || other.execute(|tx| tx.set_node_property(node, "name", "theirs")))
            .join()
            .expect("join")
            .expect("other commit");

        let result = tx.commit();
        assert!(matches!(result, Err(GraphError::Conflict(_))));
        assert!(result.err().is_some_and(|e| e.is_retryable()));
        assert_eq!(
            db.snapshot().node_property(node, "name").expect("read"),
            PropertyValue::from("theirs")
        );
    }

    #[test]
    fn close_waits_for_in_flight_transaction() {
        let db = memory_db();
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let (finish_tx, finish_rx) = std::sync::mpsc::channel::<()>();

        let worker = {
            let db = db.clone();
            thread::spawn(move || {
                let mut tx = db.begin().expect("begin");
                tx.create_node().expect("create");
                started_tx.send(()).expect("signal");
                finish_rx.recv().expect("wait");
                tx.commit()
            })
        };

        started_rx.recv().expect("started");
        let closer = {
            let db = db.clone();
            thread::spawn(move || db.close())
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!db.is_closed());
        assert!(matches!(db.begin(), Err(GraphError::StoreClosed)));

        finish_tx.send(()).expect("release worker");
        worker.join().expect("join worker").expect("commit");
        closer.join().expect("join closer").expect("close");

        assert!(db.is_closed());
        assert_eq!(db.node_count(), 1);
        assert!(matches!(db.begin(), Err(GraphError::StoreClosed)));
        db.close().expect("second close is a no-op");
    }

    #[test]
    fn close_times_out_and_store_keeps_serving() {
        let config = StoreConfig::in_memory().with_shutdown_timeout(Duration::from_millis(30));
        let db = GraphDatabase::open_with(config).expect("open");
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let (finish_tx, finish_rx) = std::sync::mpsc::channel::<()>();

        let worker = {
            let db = db.clone();
            thread::spawn(move || {
                let mut tx = db.begin().expect("begin");
                started_tx.send(()).expect("signal");
                finish_rx.recv().expect("wait");
                tx.rollback()
            })
        };
        started_rx.recv().expect("started");

        assert!(matches!(db.close(), Err(GraphError::Timeout(_))));
        assert!(!db.is_closed());

        finish_tx.send(()).expect("release worker");
        worker.join().expect("join").expect("rollback");
        db.close().expect("retry close");
        assert!(db.is_closed());
    }

    #[test]
    fn close_from_thread_with_active_transaction_is_rejected() {
        let db = memory_db();
        let _tx = db.begin().expect("begin");
        assert!(matches!(db.close(), Err(GraphError::TransactionInProgress)));
    }
}
