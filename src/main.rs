//! Varcast Demo Binary
//!
//! Menjalankan skenario multi-publisher/multi-subscriber dengan validasi
//! integritas paket, lalu benchmark latency publish/read.
//!
//! Usage:
//!   cargo run --release --features demo --bin varcast_demo -- [OPTIONS]
//!
//! Log level diatur lewat `RUST_LOG` (contoh: `RUST_LOG=varcast=debug`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use varcast::{Channel, ChannelConfig, ChannelStats};

/// Demo configuration
struct DemoConfig {
    capacity: usize,
    publishers: usize,
    subscribers: usize,
    packets: usize,
    max_len: usize,
    verbose: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            capacity: 900 * 1024,
            publishers: 10,
            subscribers: 10,
            packets: 20,
            max_len: 20 * 1024,
            verbose: false,
        }
    }
}

/// Statistik sisi subscriber
struct DemoStats {
    received: AtomicU64,
    bytes_received: AtomicU64,
    corrupted: AtomicU64,
    skipped_bytes: AtomicU64,
}

impl DemoStats {
    fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            corrupted: AtomicU64::new(0),
            skipped_bytes: AtomicU64::new(0),
        }
    }
}

/// Header kecil di depan setiap payload: `[publisher: u32][seq: u32]`
const TAG_LEN: usize = 8;

fn encode_packet(buffer: &mut Vec<u8>, publisher: u32, seq: u32, len: usize) {
    buffer.clear();
    buffer.extend_from_slice(&publisher.to_le_bytes());
    buffer.extend_from_slice(&seq.to_le_bytes());
    buffer.extend((0..len).map(|i| i as u8));
}

fn is_intact(packet: &[u8]) -> bool {
    packet.len() >= TAG_LEN
        && packet[TAG_LEN..]
            .iter()
            .enumerate()
            .all(|(i, &b)| b == i as u8)
}

/// Panjang payload berikutnya dari LCG 64-bit, di range `1..=max_len`
fn next_len(state: &mut u64, max_len: usize) -> usize {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    1 + ((*state >> 33) as usize % max_len.max(1))
}

fn run_pub_sub(config: &DemoConfig) -> ChannelStats {
    println!("📡 Multi Pub/Sub Run");
    println!("--------------------");

    let channel = Channel::with_config(
        ChannelConfig::default()
            .with_capacity(config.capacity)
            .with_name("demo"),
    );
    println!(
        "  Capacity: {} bytes (requested {})",
        channel.capacity(),
        config.capacity
    );

    // Frame terbesar harus muat di ring
    let max_len = config
        .max_len
        .min(channel.capacity().saturating_sub(TAG_LEN + 4))
        .max(1);

    let stats = Arc::new(DemoStats::new());

    // Subscriber dibuat sebelum publisher mulai supaya tidak ada paket terlewat di awal
    let subscriber_threads: Vec<_> = (0..config.subscribers)
        .map(|_| {
            let mut subscriber = channel.subscriber();
            let stats = Arc::clone(&stats);
            thread::spawn(move || {
                while let Some(packet) = subscriber.read_timeout(Duration::from_millis(100)) {
                    stats.received.fetch_add(1, Ordering::Relaxed);
                    stats
                        .bytes_received
                        .fetch_add(packet.len() as u64, Ordering::Relaxed);
                    if !is_intact(packet) {
                        stats.corrupted.fetch_add(1, Ordering::Relaxed);
                    }
                }
                stats
                    .skipped_bytes
                    .fetch_add(subscriber.skipped_bytes(), Ordering::Relaxed);
            })
        })
        .collect();

    let start = Instant::now();
    let publisher_threads: Vec<_> = (0..config.publishers)
        .map(|id| {
            let publisher = channel.publisher();
            let packets = config.packets;
            thread::spawn(move || {
                let mut seed = id as u64 + 1;
                let mut buffer = Vec::new();
                for seq in 0..packets {
                    let len = next_len(&mut seed, max_len);
                    encode_packet(&mut buffer, id as u32, seq as u32, len);
                    if let Err(e) = publisher.publish(&buffer) {
                        warn!(error = %e, "publish failed");
                    }
                    thread::sleep(Duration::from_millis(1));
                }
            })
        })
        .collect();

    for handle in publisher_threads {
        handle.join().ok();
    }
    let publish_duration = start.elapsed();

    for handle in subscriber_threads {
        handle.join().ok();
    }

    let received = stats.received.load(Ordering::Relaxed);
    let corrupted = stats.corrupted.load(Ordering::Relaxed);
    let channel_stats = channel.stats();

    println!("  Publishers:    {}", config.publishers);
    println!("  Subscribers:   {}", config.subscribers);
    println!(
        "  Published:     {} packets in {:.1} ms",
        channel_stats.packets_written,
        publish_duration.as_secs_f64() * 1000.0
    );
    println!(
        "  Received:      {} packets ({} KB)",
        received,
        stats.bytes_received.load(Ordering::Relaxed) / 1024
    );
    println!(
        "  Skipped:       {} KB (lagging subscribers)",
        stats.skipped_bytes.load(Ordering::Relaxed) / 1024
    );
    if corrupted > 0 {
        println!("  Corrupted:     {} ⚠️", corrupted);
    } else {
        println!("  Corrupted:     0 ✅");
    }
    println!();

    channel_stats
}

fn read_latency_line(read_ns: f64, reads: usize) -> String {
    format!(
        "  Read latency:    {:.2} ns/op ({:.3} μs/op, {} packets read)",
        read_ns,
        read_ns / 1000.0,
        reads
    )
}

fn benchmark_channel() {
    println!("📊 Channel Benchmark (single thread)");
    println!("------------------------------------");

    const ITERATIONS: usize = 1_000_000;
    const PAYLOAD_SIZE: usize = 64;

    let channel = Channel::new(1024 * 1024);
    let publisher = channel.publisher();
    let mut subscriber = channel.subscriber();
    let payload = [0xABu8; PAYLOAD_SIZE];

    // Warm up
    for _ in 0..1000 {
        publisher.publish(&payload).ok();
        subscriber.try_read();
    }

    let start = Instant::now();
    for _ in 0..ITERATIONS {
        publisher.publish(&payload).ok();
    }
    let publish_duration = start.elapsed();

    // Subscriber sudah jauh tertinggal: baca dulu sampai habis
    let start = Instant::now();
    let mut reads = 0usize;
    while subscriber.try_read().is_some() {
        reads += 1;
    }
    let read_duration = start.elapsed();

    let publish_ns = publish_duration.as_nanos() as f64 / ITERATIONS as f64;
    let read_ns = read_duration.as_nanos() as f64 / reads.max(1) as f64;

    println!("  Payload size: {} bytes", PAYLOAD_SIZE);
    println!("  Operations:   {}", ITERATIONS);
    println!(
        "  Publish latency: {:.2} ns/op ({:.3} μs/op)",
        publish_ns,
        publish_ns / 1000.0
    );
    println!("{}", read_latency_line(read_ns, reads));
    println!(
        "  Throughput:      {:.2} M packets/sec\n",
        ITERATIONS as f64 / publish_duration.as_secs_f64() / 1_000_000.0
    );
}

fn print_stats(stats: &ChannelStats) {
    println!("📈 Channel Stats");
    println!("----------------");
    println!("   Capacity:        {} bytes", stats.capacity);
    println!("   Used:            {} bytes", stats.used);
    println!("   Peak used:       {} bytes", stats.peak_used);
    println!("   Max packet:      {} bytes", stats.max_packet_len);
    println!("   Written:         {} KB", stats.bytes_written / 1024);
    println!(
        "   Dropped:         {} packets ({} KB, {:.1}%)",
        stats.dropped_packets,
        stats.dropped_bytes / 1024,
        stats.drop_ratio() * 100.0
    );
    println!("   Lag events:      {}", stats.lag_events);
}

fn parse_args() -> DemoConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = DemoConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--capacity" | "-c" => {
                if i + 1 < args.len() {
                    config.capacity = args[i + 1].parse().unwrap_or(config.capacity);
                    i += 1;
                }
            }
            "--publishers" | "-p" => {
                if i + 1 < args.len() {
                    config.publishers = args[i + 1].parse().unwrap_or(config.publishers);
                    i += 1;
                }
            }
            "--subscribers" | "-s" => {
                if i + 1 < args.len() {
                    config.subscribers = args[i + 1].parse().unwrap_or(config.subscribers);
                    i += 1;
                }
            }
            "--packets" | "-n" => {
                if i + 1 < args.len() {
                    config.packets = args[i + 1].parse().unwrap_or(config.packets);
                    i += 1;
                }
            }
            "--max-len" => {
                if i + 1 < args.len() {
                    config.max_len = args[i + 1].parse().unwrap_or(config.max_len);
                    i += 1;
                }
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--help" | "-h" => {
                println!("Varcast Demo - Lossy Broadcast Channel\n");
                println!("Usage: varcast_demo [OPTIONS]\n");
                println!("Options:");
                println!("  -c, --capacity <BYTES>  Ring size, rounded to power of 2 (default: 921600)");
                println!("  -p, --publishers <N>    Publisher threads (default: 10)");
                println!("  -s, --subscribers <N>   Subscriber threads (default: 10)");
                println!("  -n, --packets <N>       Packets per publisher (default: 20)");
                println!("      --max-len <BYTES>   Max payload length (default: 20480)");
                println!("  -v, --verbose           Debug logging when RUST_LOG is unset");
                println!("  -h, --help              Show this help");
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    config
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "varcast=debug" } else { "varcast=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() {
    let config = parse_args();
    init_tracing(config.verbose);

    println!("🚀 Varcast - Lossy Broadcast Channel");
    println!("====================================\n");
    info!(
        capacity = config.capacity,
        publishers = config.publishers,
        subscribers = config.subscribers,
        "starting demo"
    );

    let stats = run_pub_sub(&config);
    benchmark_channel();
    print_stats(&stats);

    println!("\n✅ Demo complete!");
}
