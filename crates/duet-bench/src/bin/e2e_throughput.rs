//! End-to-end throughput benchmark for Duet.
//!
//! Opens N rooms with two clients each. One client in every room sends as fast
//! as it can; the other counts relayed messages.

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const SERVER_URL: &str = "ws://127.0.0.1:3000/";
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let num_pairs = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(8);

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║          Duet End-to-End Relay Throughput Benchmark          ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Make sure the server is running: cargo run --release        ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    run_relay_benchmark(num_pairs).await;
}

async fn run_relay_benchmark(num_pairs: usize) {
    println!("📊 Relay Benchmark: {} rooms, {} clients", num_pairs, num_pairs * 2);
    println!("   Warmup: {}s, Measurement: {}s", WARMUP_SECS, BENCH_SECS);
    println!();

    let message_count = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(num_pairs + 1));

    let mut handles = Vec::new();

    for pair_id in 0..num_pairs {
        let msg_count = Arc::clone(&message_count);
        let barrier = Arc::clone(&barrier);

        let handle = tokio::spawn(async move {
            if let Err(e) = run_pair(pair_id, msg_count, barrier).await {
                eprintln!("Pair {} error: {}", pair_id, e);
            }
        });
        handles.push(handle);
    }

    // Wait for all pairs to connect
    barrier.wait().await;
    println!("✓ All {} rooms paired", num_pairs);

    println!("⏳ Warming up for {}s...", WARMUP_SECS);
    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;

    // Reset counter and start measurement
    message_count.store(0, Ordering::SeqCst);
    let start = Instant::now();

    println!("📈 Measuring for {}s...", BENCH_SECS);
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;

    let elapsed = start.elapsed();
    let total_messages = message_count.load(Ordering::SeqCst);

    let msgs_per_sec = total_messages as f64 / elapsed.as_secs_f64();
    let msgs_per_sec_per_room = msgs_per_sec / num_pairs as f64;

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                         RESULTS                              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!(
        "║  Rooms:                {:>10}                           ║",
        num_pairs
    );
    println!(
        "║  Duration:             {:>10.2}s                          ║",
        elapsed.as_secs_f64()
    );
    println!(
        "║  Total Relayed:        {:>10}                           ║",
        total_messages
    );
    println!(
        "║  Throughput:           {:>10.0} msg/s                    ║",
        msgs_per_sec
    );
    println!(
        "║  Per-Room:             {:>10.0} msg/s                    ║",
        msgs_per_sec_per_room
    );
    println!("╚══════════════════════════════════════════════════════════════╝");

    for handle in handles {
        handle.abort();
    }
}

async fn run_pair(
    pair_id: usize,
    message_count: Arc<AtomicU64>,
    barrier: Arc<Barrier>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let url = format!("{}?room=bench-{}", SERVER_URL, pair_id);

    let (sender_ws, _) = connect_async(url.as_str()).await?;
    let (receiver_ws, _) = connect_async(url.as_str()).await?;
    let (mut sender, _sender_rx) = sender_ws.split();
    let (_receiver_tx, mut receiver) = receiver_ws.split();

    // Give the server a moment to admit both members
    tokio::time::sleep(Duration::from_millis(100)).await;

    barrier.wait().await;

    let recv_count = Arc::clone(&message_count);
    let recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(_)) => {
                    recv_count.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    let payload = Message::Text(format!(r#"{{"pair":{},"data":"{}"}}"#, pair_id, "x".repeat(48)));

    // Send loop - no waiting, just blast messages
    loop {
        if sender.send(payload.clone()).await.is_err() {
            break;
        }
        // Small yield to not starve the receiver task
        tokio::task::yield_now().await;
    }

    recv_task.abort();
    Ok(())
}
