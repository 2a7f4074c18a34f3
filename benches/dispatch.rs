use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use livesql::{
    ChangeEvent, LiveConfig, LiveEngine, LiveSelect, MemoryConnection, MemoryReader,
    ReplicationReader, Row, SqlConnection, Trigger,
};

fn make_engine(subscriptions: usize, distinct_queries: usize) -> (LiveEngine, Arc<MemoryReader>, Vec<LiveSelect>) {
    let conn = Arc::new(MemoryConnection::new());
    let reader = Arc::new(MemoryReader::new());

    // 64-row result sets so set_rows/diff cost is realistic.
    for q in 0..distinct_queries {
        let rows: Vec<Row> = (0..64)
            .map(|i| json!({"id": i, "bucket": q}).as_object().cloned().unwrap())
            .collect();
        conn.set_result(&format!("SELECT * FROM t WHERE bucket = {q}"), rows);
    }

    let cfg = LiveConfig::new("localhost", "bench")
        .with_database("app")
        .with_server_id(9)
        .with_initial_load(false);
    let engine = LiveEngine::connect(
        cfg,
        conn as Arc<dyn SqlConnection>,
        Arc::clone(&reader) as Arc<dyn ReplicationReader>,
    )
    .unwrap();
    engine.wait_ready().unwrap();

    let selects = (0..subscriptions)
        .map(|i| {
            engine
                .select(
                    format!("SELECT * FROM t WHERE bucket = {}", i % distinct_queries),
                    vec![Trigger::table("t")],
                )
                .unwrap()
        })
        .collect();

    (engine, reader, selects)
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/fan_out");
    group.throughput(Throughput::Elements(1));

    for (subscriptions, distinct) in [(1, 1), (64, 1), (64, 8), (64, 64)] {
        let (engine, reader, selects) = make_engine(subscriptions, distinct);
        let event = ChangeEvent::write_rows(
            "app",
            "t",
            vec![json!({"id": 1}).as_object().cloned().unwrap()],
        );

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{subscriptions}subs_{distinct}queries")),
            &event,
            |b, event| {
                b.iter(|| {
                    reader.emit(event.clone()).unwrap();
                    engine.flush().unwrap();
                    for live in &selects {
                        while let Ok(Some(_)) = live.try_recv() {}
                    }
                });
            },
        );
        engine.end().unwrap();
    }

    group.finish();
}

criterion_group!(benches, bench_fan_out);
criterion_main!(benches);
