use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use livesql::{
    ChangeEvent, ConnectionError, LiveConfig, LiveEngine, LiveResult, LiveSelect, LiveUpdate,
    MemoryConnection, MemoryReader, ReplicationReader, Row, SqlConnection, Trigger,
};

fn row(v: serde_json::Value) -> Row {
    v.as_object().cloned().unwrap()
}

fn config() -> LiveConfig {
    LiveConfig::new("localhost", "root")
        .with_database("app")
        .with_server_id(42)
        .with_initial_load(false)
}

fn start(cfg: LiveConfig) -> (LiveEngine, Arc<MemoryConnection>, Arc<MemoryReader>) {
    let conn = Arc::new(MemoryConnection::new());
    let reader = Arc::new(MemoryReader::new());
    let engine = LiveEngine::connect(
        cfg,
        Arc::clone(&conn) as Arc<dyn SqlConnection>,
        Arc::clone(&reader) as Arc<dyn ReplicationReader>,
    )
    .unwrap();
    engine.wait_ready().unwrap();
    (engine, conn, reader)
}

fn write(table: &str) -> ChangeEvent {
    ChangeEvent::write_rows("app", table, vec![row(json!({"id": 1}))])
}

#[test]
fn matching_event_updates_rows_and_unrelated_table_does_not() {
    let (engine, conn, reader) = start(config());
    conn.set_result("SELECT * FROM t", vec![row(json!({"id": 1, "name": "a"}))]);

    let live = engine.select("SELECT * FROM t", vec![Trigger::table("t")]).unwrap();
    assert!(live.rows().is_empty());

    assert!(reader.emit(write("t")).unwrap());
    engine.flush().unwrap();

    assert_eq!(conn.executions("SELECT * FROM t"), 1);
    assert_eq!(live.rows(), vec![row(json!({"id": 1, "name": "a"}))]);
    let LiveUpdate::Rows(update) = live.recv_timeout(Duration::from_secs(1)).unwrap() else {
        panic!("expected rows update");
    };
    assert_eq!(update.subscription_id, live.id());
    assert_eq!(update.rows.len(), 1);

    // The reader never decodes `u`; even a stray event for it is not matched.
    assert!(!reader.emit(write("u")).unwrap());
    reader.inject(write("u")).unwrap();
    engine.flush().unwrap();
    assert_eq!(conn.total_executions(), 1);
}

#[test]
fn database_mismatch_excludes_second_subscription() {
    let (engine, conn, reader) = start(config());
    conn.set_result("SELECT * FROM t", vec![row(json!({"id": 1}))]);

    let default_db = engine.select("SELECT * FROM t", vec![Trigger::table("t")]).unwrap();
    let other_db = engine
        .select("SELECT * FROM t", vec![Trigger::new("other", "t")])
        .unwrap();

    reader.emit(write("t")).unwrap();
    engine.flush().unwrap();

    assert_eq!(conn.executions("SELECT * FROM t"), 1);
    assert_eq!(default_db.rows().len(), 1);
    assert!(other_db.rows().is_empty());
    assert!(other_db.try_recv().unwrap().is_none());
}

#[test]
fn identical_query_text_executes_once_per_event() {
    let (engine, conn, reader) = start(config());
    conn.set_result("SELECT * FROM t", vec![row(json!({"id": 1})), row(json!({"id": 2}))]);
    conn.set_result("SELECT COUNT(*) AS n FROM t", vec![row(json!({"n": 2}))]);

    let selects: Vec<_> = (0..3)
        .map(|_| engine.select("SELECT * FROM t", vec![Trigger::table("t")]).unwrap())
        .collect();
    let count = engine
        .select("SELECT COUNT(*) AS n FROM t", vec![Trigger::table("t")])
        .unwrap();

    reader.emit(write("t")).unwrap();
    engine.flush().unwrap();

    assert_eq!(conn.executions("SELECT * FROM t"), 1);
    assert_eq!(conn.executions("SELECT COUNT(*) AS n FROM t"), 1);
    for live in &selects {
        assert_eq!(live.rows(), selects[0].rows());
        assert_eq!(live.rows().len(), 2);
    }
    assert_eq!(count.rows(), vec![row(json!({"n": 2}))]);

    // A second event runs the query again: the dedup cache is per event.
    reader.emit(write("t")).unwrap();
    engine.flush().unwrap();
    assert_eq!(conn.executions("SELECT * FROM t"), 2);
}

#[test]
fn failed_execution_is_retried_by_next_identical_subscription() {
    let (engine, conn, reader) = start(config());
    conn.set_result("SELECT * FROM t", vec![row(json!({"id": 1}))]);

    let first = engine.select("SELECT * FROM t", vec![Trigger::table("t")]).unwrap();
    let second = engine.select("SELECT * FROM t", vec![Trigger::table("t")]).unwrap();

    conn.fail_next("SELECT * FROM t", "Lock wait timeout exceeded");
    reader.emit(write("t")).unwrap();
    engine.flush().unwrap();

    assert_eq!(conn.executions("SELECT * FROM t"), 2);
    assert!(first.rows().is_empty());
    assert_eq!(second.rows().len(), 1);

    let LiveUpdate::QueryFailed { message, .. } = first.recv_timeout(Duration::from_secs(1)).unwrap() else {
        panic!("expected failure notice");
    };
    assert!(message.contains("Lock wait timeout"));
}

#[test]
fn query_failure_does_not_abort_sibling_subscriptions() {
    let (engine, conn, reader) = start(config());
    conn.set_result("SELECT * FROM t", vec![row(json!({"id": 1}))]);
    conn.set_result("SELECT id FROM t", vec![row(json!({"id": 1}))]);

    let failing = engine.select("SELECT * FROM t", vec![Trigger::table("t")]).unwrap();
    let healthy = engine.select("SELECT id FROM t", vec![Trigger::table("t")]).unwrap();

    conn.fail_next("SELECT * FROM t", "gone away");
    reader.emit(write("t")).unwrap();
    engine.flush().unwrap();

    assert!(failing.rows().is_empty());
    assert_eq!(healthy.rows().len(), 1);
}

#[test]
fn select_validation_fails_without_side_effects() {
    let (engine, conn, reader) = start(config());
    let pushes = reader.history().len();

    let err = engine.select("SELECT * FROM t", Vec::new()).unwrap_err();
    assert!(err.is_validation());

    let err = engine
        .select("SELECT * FROM t", vec![Trigger::table("t"), Trigger::new("app", "")])
        .unwrap_err();
    assert!(err.is_validation());

    assert_eq!(reader.history().len(), pushes);
    assert!(!reader.config().unwrap().admits("app", "t"));

    // Nothing was registered, so resume has nothing to refresh.
    engine.resume().unwrap();
    assert_eq!(conn.total_executions(), 0);
}

#[test]
fn trigger_without_database_needs_a_default() {
    let cfg = LiveConfig::new("localhost", "root")
        .with_server_id(42)
        .with_initial_load(false);
    let (engine, _conn, reader) = start(cfg);

    let err = engine.select("SELECT * FROM t", vec![Trigger::table("t")]).unwrap_err();
    assert_eq!(err.code(), "VALIDATION");
    assert!(format!("{err}").contains("No database selected"));

    engine
        .select("SELECT * FROM t", vec![Trigger::new("app", "t")])
        .unwrap();
    assert!(reader.config().unwrap().admits("app", "t"));
}

#[test]
fn register_widens_reader_filter() {
    let (engine, _conn, reader) = start(config());
    assert!(reader.history()[0].include_schema.is_empty());

    engine
        .select("SELECT * FROM t JOIN u", vec![Trigger::table("t"), Trigger::new("other", "u")])
        .unwrap();
    engine.select("SELECT * FROM t", vec![Trigger::table("t")]).unwrap();

    let cfg = reader.config().unwrap();
    assert_eq!(cfg.server_id, 42);
    assert_eq!(cfg.include_schema["app"], vec!["t".to_string()]);
    assert_eq!(cfg.include_schema["other"], vec!["u".to_string()]);
}

#[test]
fn resume_refreshes_every_subscription_without_events() {
    let (engine, conn, _reader) = start(config());
    engine.select("SELECT * FROM t", vec![Trigger::table("t")]).unwrap();
    engine.select("SELECT * FROM t", vec![Trigger::table("t")]).unwrap();
    engine.select("SELECT * FROM u", vec![Trigger::table("u")]).unwrap();
    assert_eq!(conn.total_executions(), 0);

    engine.resume().unwrap();

    // No dedup on resume.
    assert_eq!(conn.executions("SELECT * FROM t"), 2);
    assert_eq!(conn.executions("SELECT * FROM u"), 1);
}

#[test]
fn pause_suppresses_updates_and_resume_restores_matching() {
    let (engine, conn, reader) = start(config());
    conn.set_result("SELECT * FROM t", vec![row(json!({"id": 1}))]);
    let live = engine.select("SELECT * FROM t", vec![Trigger::table("t")]).unwrap();

    engine.pause().unwrap();
    assert_eq!(engine.state(), livesql::LifecycleState::Paused);
    assert!(reader.config().unwrap().include_schema.is_empty());

    assert!(!reader.emit(write("t")).unwrap());
    reader.inject(write("t")).unwrap();
    engine.flush().unwrap();
    assert_eq!(conn.total_executions(), 0);
    assert!(live.try_recv().unwrap().is_none());

    engine.resume().unwrap();
    assert_eq!(engine.state(), livesql::LifecycleState::Ready);
    assert_eq!(conn.executions("SELECT * FROM t"), 1);
    assert!(live.try_recv().unwrap().is_some());

    conn.set_result("SELECT * FROM t", vec![row(json!({"id": 1})), row(json!({"id": 2}))]);
    assert!(reader.emit(write("t")).unwrap());
    engine.flush().unwrap();
    assert_eq!(conn.executions("SELECT * FROM t"), 2);
    assert_eq!(live.rows().len(), 2);
}

#[test]
fn table_map_events_never_reach_subscriptions() {
    let (engine, conn, reader) = start(config());
    engine.select("SELECT * FROM t", vec![Trigger::table("t")]).unwrap();

    assert!(reader.emit(ChangeEvent::table_map("app", "t")).unwrap());
    engine.flush().unwrap();

    assert_eq!(conn.total_executions(), 0);
    assert_eq!(engine.processed_events(), 0);
}

/// Numbers every execution so the order of passes is observable.
#[derive(Default)]
struct SequencedConnection {
    log: Mutex<Vec<String>>,
}

impl SqlConnection for SequencedConnection {
    fn connect(&self) -> Result<(), ConnectionError> {
        Ok(())
    }

    fn query(&self, sql: &str) -> LiveResult<Vec<Row>> {
        let mut log = self.log.lock().unwrap();
        log.push(sql.to_string());
        Ok(vec![row(json!({"seq": log.len()}))])
    }

    fn destroy(&self) {}
}

fn seqs(live: &LiveSelect) -> Vec<u64> {
    let mut seqs = Vec::new();
    while let Some(update) = live.try_recv().unwrap() {
        let LiveUpdate::Rows(update) = update else {
            panic!("expected rows update");
        };
        seqs.push(update.rows[0]["seq"].as_u64().unwrap());
    }
    seqs
}

#[test]
fn events_are_processed_in_arrival_order() {
    let conn = Arc::new(SequencedConnection::default());
    let reader = Arc::new(MemoryReader::new());
    let engine = LiveEngine::connect(
        config(),
        Arc::clone(&conn) as Arc<dyn SqlConnection>,
        Arc::clone(&reader) as Arc<dyn ReplicationReader>,
    )
    .unwrap();
    engine.wait_ready().unwrap();

    let a = engine.select("SELECT a", vec![Trigger::table("t")]).unwrap();
    let b = engine.select("SELECT b", vec![Trigger::table("t"), Trigger::table("u")]).unwrap();

    let tables = ["t", "u", "t", "t", "u"];
    for table in tables {
        assert!(reader.emit(write(table)).unwrap());
    }
    engine.flush().unwrap();
    assert_eq!(engine.processed_events(), 5);

    // Each pass finishes before the next event starts, in emission order.
    let expected: Vec<&str> = tables
        .iter()
        .flat_map(|table| match *table {
            "t" => vec!["SELECT a", "SELECT b"],
            _ => vec!["SELECT b"],
        })
        .collect();
    assert_eq!(*conn.log.lock().unwrap(), expected);

    assert_eq!(seqs(&a), vec![1, 4, 6]);
    assert_eq!(seqs(&b), vec![2, 3, 5, 7, 8]);
    assert_eq!(a.rows(), vec![row(json!({"seq": 6}))]);
    assert_eq!(b.rows(), vec![row(json!({"seq": 8}))]);
}

#[test]
fn row_condition_narrows_trigger() {
    let (engine, conn, reader) = start(config());
    conn.set_result("SELECT * FROM scores", vec![row(json!({"id": 1, "score": 10}))]);

    let live = engine
        .select(
            "SELECT * FROM scores",
            vec![Trigger::table("scores").with_condition(|before, after| match after {
                Some(after) => before["score"] != after["score"],
                None => true,
            })],
        )
        .unwrap();

    reader
        .emit(ChangeEvent::update_rows(
            "app",
            "scores",
            vec![(row(json!({"id": 1, "score": 10, "name": "a"})), row(json!({"id": 1, "score": 10, "name": "b"})))],
        ))
        .unwrap();
    engine.flush().unwrap();
    assert_eq!(conn.total_executions(), 0);

    reader
        .emit(ChangeEvent::update_rows(
            "app",
            "scores",
            vec![(row(json!({"id": 1, "score": 9})), row(json!({"id": 1, "score": 10})))],
        ))
        .unwrap();
    engine.flush().unwrap();
    assert_eq!(conn.total_executions(), 1);
    assert_eq!(live.rows().len(), 1);
}

#[test]
fn initial_load_populates_rows_on_select() {
    let (engine, conn, _reader) = start(config().with_initial_load(true));
    conn.set_result("SELECT * FROM t", vec![row(json!({"id": 1}))]);

    let live = engine.select("SELECT * FROM t", vec![Trigger::table("t")]).unwrap();
    assert_eq!(live.rows().len(), 1);
    assert_eq!(conn.executions("SELECT * FROM t"), 1);

    let LiveUpdate::Rows(update) = live.recv_timeout(Duration::from_secs(1)).unwrap() else {
        panic!("expected initial rows");
    };
    assert_eq!(update.diff.len(), 1);
}

#[test]
fn dropped_handle_counts_undelivered_updates() {
    let (engine, conn, reader) = start(config());
    conn.set_result("SELECT * FROM t", vec![row(json!({"id": 1}))]);
    let live = engine.select("SELECT * FROM t", vec![Trigger::table("t")]).unwrap();
    drop(live);

    reader.emit(write("t")).unwrap();
    engine.flush().unwrap();

    // The subscription stays registered and keeps its triggers watched.
    assert_eq!(conn.executions("SELECT * FROM t"), 1);
    assert_eq!(engine.dropped_updates(), 1);
    assert!(reader.config().unwrap().admits("app", "t"));
}
