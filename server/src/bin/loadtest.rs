//! Load test for the RC car server.
//!
//! Spawns multiple fake WebSocket clients that:
//! - Join under a unique name (retrying with a new suffix on a duplicate)
//! - Send Update calls with randomised driver input at a fixed rate
//! - Measure round-trip latency of every call
//! - Say Bye on exit
//!
//! Usage: cargo run --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --clients N      Number of clients to spawn (default: 50)
//!   --duration S     Test duration in seconds (default: 30)
//!   --rate R         Updates per second per client (default: 30)
//!   --url URL        Server URL (default: ws://127.0.0.1:8080/ws)

use futures_util::{SinkExt, StreamExt};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rccar_shared::protocol::{Input, Method, Output, RpcRequest, RpcResponse};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Join attempts per client before giving up on finding a free name.
const MAX_JOIN_ATTEMPTS: u32 = 5;

// === Metrics ===

#[derive(Default)]
struct Metrics {
    connected: AtomicU64,
    joined: AtomicU64,
    duplicate_retries: AtomicU64,
    updates_sent: AtomicU64,
    responses: AtomicU64,
    errors: AtomicU64,
    others_seen: AtomicU64,
    latency_sum_us: AtomicU64,
    latency_max_us: AtomicU64,
}

impl Metrics {
    fn record_latency(&self, latency: Duration) {
        let us = latency.as_micros() as u64;
        self.latency_sum_us.fetch_add(us, Ordering::Relaxed);
        self.latency_max_us.fetch_max(us, Ordering::Relaxed);
        self.responses.fetch_add(1, Ordering::Relaxed);
    }

    fn avg_latency_us(&self) -> u64 {
        let count = self.responses.load(Ordering::Relaxed);
        if count == 0 {
            0
        } else {
            self.latency_sum_us.load(Ordering::Relaxed) / count
        }
    }
}

// === RPC over the socket ===

struct Client {
    ws: Socket,
    next_id: u64,
}

impl Client {
    async fn call(&mut self, method: Method, param: serde_json::Value) -> Result<RpcResponse, String> {
        self.next_id += 1;
        let id = self.next_id;
        let request = RpcRequest::new(method, param, id);
        let json = serde_json::to_string(&request).map_err(|e| e.to_string())?;
        self.ws
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| e.to_string())?;

        while let Some(msg) = self.ws.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let response: RpcResponse =
                        serde_json::from_str(&text).map_err(|e| e.to_string())?;
                    if response.id == serde_json::Value::from(id) {
                        return Ok(response);
                    }
                }
                Ok(Message::Close(frame)) => return Err(format!("closed: {:?}", frame)),
                Ok(_) => {}
                Err(e) => return Err(e.to_string()),
            }
        }
        Err("stream ended".to_string())
    }
}

// === Client task ===

async fn run_client(
    client_id: u32,
    url: String,
    rate: f64,
    duration: Duration,
    metrics: Arc<Metrics>,
) {
    let ws = match connect_async(&url).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            if client_id < 5 {
                eprintln!("Client {} failed to connect: {}", client_id, e);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };
    metrics.connected.fetch_add(1, Ordering::Relaxed);
    let mut client = Client { ws, next_id: 0 };
    let mut rng = ChaCha8Rng::seed_from_u64(client_id as u64);

    // Join, picking a new suffix whenever the name is taken
    let mut name = None;
    for attempt in 0..MAX_JOIN_ATTEMPTS {
        let candidate = if attempt == 0 {
            format!("load-{}", client_id)
        } else {
            format!("load-{}-{}", client_id, rng.gen::<u16>())
        };
        match client.call(Method::Join, serde_json::json!(candidate)).await {
            Ok(resp) if resp.error.is_none() => {
                name = Some(candidate);
                break;
            }
            Ok(resp) => {
                let error = resp.error.unwrap_or_default();
                if error.starts_with("duplicated name") {
                    metrics.duplicate_retries.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                if client_id < 3 {
                    eprintln!("Client {} join failed: {}", client_id, error);
                }
                break;
            }
            Err(e) => {
                if client_id < 3 {
                    eprintln!("Client {} join error: {}", client_id, e);
                }
                break;
            }
        }
    }

    let Some(name) = name else {
        metrics.errors.fetch_add(1, Ordering::Relaxed);
        metrics.connected.fetch_sub(1, Ordering::Relaxed);
        return;
    };
    metrics.joined.fetch_add(1, Ordering::Relaxed);

    let update_interval = if rate > 0.0 {
        Duration::from_secs_f64(1.0 / rate)
    } else {
        Duration::from_secs(1)
    };
    let mut update_timer = tokio::time::interval(update_interval);
    update_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let test_end = Instant::now() + duration;
    while Instant::now() < test_end {
        update_timer.tick().await;

        let input = Input {
            name: name.clone(),
            steering: rng.gen_range(-1.0..=1.0),
            accel: rng.gen_range(0.0..=1.0),
            brake: if rng.gen_bool(0.1) { 1.0 } else { 0.0 },
        };
        let param = match serde_json::to_value(&input) {
            Ok(param) => param,
            Err(_) => continue,
        };

        let sent = Instant::now();
        metrics.updates_sent.fetch_add(1, Ordering::Relaxed);
        match client.call(Method::Update, param).await {
            Ok(resp) => {
                metrics.record_latency(sent.elapsed());
                match serde_json::from_value::<Output>(resp.result) {
                    Ok(output) if output.self_vehicle.is_some() => {
                        metrics
                            .others_seen
                            .fetch_add(output.others.len() as u64, Ordering::Relaxed);
                    }
                    // Session gone (expired) or unreadable reply
                    _ => {
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            Err(e) => {
                if client_id < 3 {
                    eprintln!("Client {} update error: {}", client_id, e);
                }
                metrics.errors.fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }

    if client.call(Method::Bye, serde_json::json!(name)).await.is_err() {
        metrics.errors.fetch_add(1, Ordering::Relaxed);
    }
    let _ = client.ws.close(None).await;
    metrics.connected.fetch_sub(1, Ordering::Relaxed);
}

// === Main ===

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut num_clients: u32 = 50;
    let mut duration_secs: u64 = 30;
    let mut rate: f64 = 30.0;
    let mut url = "ws://127.0.0.1:8080/ws".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--clients" => {
                i += 1;
                num_clients = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(50);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(30);
            }
            "--rate" => {
                i += 1;
                rate = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(30.0);
            }
            "--url" => {
                i += 1;
                url = args.get(i).cloned().unwrap_or(url);
            }
            _ => {}
        }
        i += 1;
    }

    println!("=== RC Car Server Load Test ===");
    println!("Clients: {}", num_clients);
    println!("Duration: {}s", duration_secs);
    println!("Update rate: {}/s per client", rate);
    println!("URL: {}", url);
    println!();

    let metrics = Arc::new(Metrics::default());
    let duration = Duration::from_secs(duration_secs);

    let mut handles = Vec::with_capacity(num_clients as usize);

    println!("Spawning {} clients...", num_clients);
    let spawn_start = Instant::now();

    for client_id in 0..num_clients {
        let url = url.clone();
        let metrics = Arc::clone(&metrics);

        handles.push(tokio::spawn(async move {
            run_client(client_id, url, rate, duration, metrics).await;
        }));

        // Stagger spawns slightly to avoid thundering herd
        if client_id % 50 == 49 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    println!("All clients spawned in {:?}", spawn_start.elapsed());
    println!();

    // Print stats periodically
    let metrics_clone = Arc::clone(&metrics);
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        let start = Instant::now();

        loop {
            interval.tick().await;
            let elapsed = start.elapsed().as_secs();
            if elapsed >= duration_secs + 5 {
                break;
            }

            println!(
                "[{:3}s] connected={}, joined={}, updates={}, responses={}, errors={}, avg_latency={}us, max_latency={}us",
                elapsed,
                metrics_clone.connected.load(Ordering::Relaxed),
                metrics_clone.joined.load(Ordering::Relaxed),
                metrics_clone.updates_sent.load(Ordering::Relaxed),
                metrics_clone.responses.load(Ordering::Relaxed),
                metrics_clone.errors.load(Ordering::Relaxed),
                metrics_clone.avg_latency_us(),
                metrics_clone.latency_max_us.load(Ordering::Relaxed),
            );
        }
    });

    // Wait for all clients to finish
    for handle in handles {
        let _ = handle.await;
    }

    stats_handle.abort();

    // Final stats
    let joined = metrics.joined.load(Ordering::Relaxed);
    let updates = metrics.updates_sent.load(Ordering::Relaxed);
    let responses = metrics.responses.load(Ordering::Relaxed);
    let others = metrics.others_seen.load(Ordering::Relaxed);

    println!();
    println!("=== Final Results ===");
    println!("Clients joined: {}/{}", joined, num_clients);
    println!(
        "Duplicate-name retries: {}",
        metrics.duplicate_retries.load(Ordering::Relaxed)
    );
    println!("Total updates sent: {}", updates);
    println!("Total responses: {}", responses);
    println!("Total errors: {}", metrics.errors.load(Ordering::Relaxed));
    println!("Average latency: {}us", metrics.avg_latency_us());
    println!(
        "Max latency: {}us",
        metrics.latency_max_us.load(Ordering::Relaxed)
    );
    if responses > 0 {
        println!("Average others per reply: {:.1}", others as f64 / responses as f64);
    }

    let expected = joined as f64 * rate * duration_secs as f64;
    println!();
    println!("Updates/sec (total): {:.0}", updates as f64 / duration_secs.max(1) as f64);
    if expected > 0.0 {
        println!("Delivery rate: {:.1}%", responses as f64 / expected * 100.0);
    }
}
