use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::codec::encode_request;
use crate::stats::RequestEvent;

// ─── Synthetic request origins ───────────────────────────────────

const HOSTS: &[&str] = &["web1", "web2", "web3"];
const SERVERS: &[&str] = &["example.com", "api.example.com"];
const SCRIPTS: &[&str] = &["/index.php", "/search.php", "/api/v1/users.php", "/cart.php"];

// ─── Public entry point ──────────────────────────────────────────

/// Spawns `concurrency` Tokio tasks that send request datagrams to `target`
/// until the deadline or the `running` flag is set to false.
/// Returns how many datagrams were sent.
pub async fn run(
    running: Arc<AtomicBool>,
    target: SocketAddr,
    concurrency: u32,
    duration: Duration,
    seed: u64,
) -> u64 {
    let deadline = Instant::now() + duration;
    let sent = Arc::new(AtomicU64::new(0));

    running.store(true, Ordering::SeqCst);
    let mut handles = Vec::with_capacity(concurrency as usize);

    for worker_id in 0..concurrency {
        let running = running.clone();
        let sent = sent.clone();

        handles.push(tokio::spawn(async move {
            if let Err(e) = worker(worker_id, running, sent, target, deadline, seed).await {
                warn!(worker_id, error = %e, "sender failed");
            }
        }));
    }

    // Wait for all workers to finish
    for h in handles {
        let _ = h.await;
    }

    running.store(false, Ordering::SeqCst);
    sent.load(Ordering::Relaxed)
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(
    id: u32,
    running: Arc<AtomicBool>,
    sent: Arc<AtomicU64>,
    target: SocketAddr,
    deadline: Instant,
    seed: u64,
) -> std::io::Result<()> {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(id as u64));

    let local: SocketAddr = if target.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).await?;

    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
        let packet = encode_request(&random_event(&mut rng));

        match socket.send_to(&packet, target).await {
            Ok(_) => {
                sent.fetch_add(1, Ordering::Relaxed);
            }
            // Loss is fine; the collector never acknowledges anything.
            Err(e) => debug!(worker_id = id, error = %e, "send failed"),
        }

        tokio::task::yield_now().await;
    }

    Ok(())
}

/// One plausible PHP request.
pub fn random_event(rng: &mut impl Rng) -> RequestEvent {
    let request_time = rng.gen_range(0.001..2.0);
    let cpu_share = rng.gen_range(0.1..0.9);

    RequestEvent {
        hostname: HOSTS[rng.gen_range(0..HOSTS.len())].into(),
        server_name: SERVERS[rng.gen_range(0..SERVERS.len())].into(),
        script_name: SCRIPTS[rng.gen_range(0..SCRIPTS.len())].into(),
        request_time,
        ru_utime: request_time * cpu_share * 0.8,
        ru_stime: request_time * cpu_share * 0.2,
        document_size: rng.gen_range(512..256 * 1024),
        memory_peak: rng.gen_range(256 * 1024..64 * 1024 * 1024),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_request;

    #[test]
    fn test_random_event_is_well_formed() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let event = random_event(&mut rng);
            assert!(HOSTS.contains(&event.hostname.as_str()));
            assert!(SCRIPTS.contains(&event.script_name.as_str()));
            assert!(event.ru_utime + event.ru_stime <= event.request_time);
            assert!(decode_request(&encode_request(&event)).is_ok());
        }
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        assert_eq!(random_event(&mut a), random_event(&mut b));
    }

    #[tokio::test]
    async fn test_run_sends_until_deadline() {
        let sink = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = sink.local_addr().unwrap();

        let running = Arc::new(AtomicBool::new(false));
        let sent = run(running.clone(), target, 2, Duration::from_millis(50), 1).await;

        assert!(sent > 0);
        assert!(!running.load(Ordering::SeqCst));
    }
}
