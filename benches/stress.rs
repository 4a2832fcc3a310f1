use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ulid::Ulid;

use seatlock::{Config, Engine, EngineError, WalLedger};

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

fn bench_wal_path() -> PathBuf {
    let dir = std::env::temp_dir().join("seatlock_bench");
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(format!("{}.wal", Ulid::new()))
}

const RESOURCES: u64 = 10;
const WORKERS: u64 = 64;
const OPS_PER_WORKER: u64 = 200;

#[tokio::main]
async fn main() {
    seatlock::observability::init_tracing();
    let metrics_port = std::env::var("SEATLOCK_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    seatlock::observability::init(metrics_port);

    let path = bench_wal_path();
    let ledger = Arc::new(WalLedger::open(&path).unwrap());
    let engine = Arc::new(Engine::new(ledger, &Config::from_env()));

    let capacities = [1, 1, 1, 1, 1, 5, 5, 5, 10, 10];
    for (resource, capacity) in capacities.iter().enumerate() {
        engine
            .define_resource(resource as u64, *capacity)
            .await
            .unwrap();
    }
    println!("stress: {RESOURCES} resources, {WORKERS} workers, {OPS_PER_WORKER} ops each");

    let start = Instant::now();
    let mut handles = Vec::new();
    for worker in 0..WORKERS {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let mut lock_latencies = Vec::with_capacity(OPS_PER_WORKER as usize);
            let mut granted = 0u64;
            let mut rejected = 0u64;
            for op in 0..OPS_PER_WORKER {
                let resource = (worker + op) % RESOURCES;
                let holder = worker;
                let op_start = Instant::now();
                match engine.create_lock(resource, holder, None).await {
                    Ok(_) => {
                        granted += 1;
                        // Alternate between promoting and releasing the hold.
                        if op % 2 == 0 {
                            if let Ok(p) = engine.promote(resource, holder, 9_900).await {
                                let _ = engine.cancel_booking(p.booking_id, holder).await;
                            }
                        } else {
                            let _ = engine.cancel_lock(resource, holder).await;
                        }
                    }
                    Err(EngineError::ResourceFull(_)) | Err(EngineError::AlreadyLocked { .. }) => {
                        rejected += 1;
                    }
                    Err(e) => panic!("stress op failed: {e}"),
                }
                lock_latencies.push(op_start.elapsed());
            }
            (lock_latencies, granted, rejected)
        }));
    }

    let mut latencies = Vec::new();
    let mut granted = 0u64;
    let mut rejected = 0u64;
    for handle in handles {
        let (l, g, r) = handle.await.unwrap();
        latencies.extend(l);
        granted += g;
        rejected += r;
    }

    let elapsed = start.elapsed();
    let total_ops = WORKERS * OPS_PER_WORKER;
    println!(
        "  {total_ops} ops in {:.2}s ({:.0} ops/s), {granted} granted, {rejected} rejected",
        elapsed.as_secs_f64(),
        total_ops as f64 / elapsed.as_secs_f64(),
    );
    print_latency("reservation cycle", &mut latencies);

    let _ = std::fs::remove_file(&path);
}
