use async_icmp_probe::{resolve_ipv4, PingConfigBuilder, Pinger};
use clap::Parser;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Send ICMP echo requests to a host
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The host to ping
    host: String,
    /// Stop after sending this many requests
    #[arg(short = 'c')]
    count: Option<u64>,
    /// Seconds to wait between requests
    #[arg(short = 'i', default_value_t = 1.0)]
    interval: f64,
    /// Number of data bytes to send after the timestamp
    #[arg(short = 's', default_value_t = 56)]
    size: usize,
    /// Seconds before ping exits regardless of how many replies were received
    #[arg(short = 't')]
    deadline: Option<u64>,
    /// Seconds to wait for each reply
    #[arg(short = 'W', default_value_t = 1.0)]
    timeout: f64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let destination = resolve_ipv4(&args.host).await?;

    let mut builder = PingConfigBuilder::new()
        .with_interval(Duration::try_from_secs_f64(args.interval)?)
        .with_timeout(Duration::try_from_secs_f64(args.timeout)?)
        .with_payload_size(args.size);
    if let Some(count) = args.count {
        builder = builder.with_count(count);
    }
    if let Some(deadline) = args.deadline {
        builder = builder.with_deadline(Duration::from_secs(deadline));
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let pinger = Pinger::open(builder.build()?, destination, cancel)?;
    println!(
        "pinging {} [{}] with {} bytes of data:",
        args.host, destination, args.size
    );
    let stats = pinger
        .run(|report| match (report.result.round_trip_time, report.result.ttl) {
            (Some(rtt), Some(ttl)) => println!(
                "Reply from {}: bytes={} seq={} time={}ms TTL={}",
                destination,
                report.payload_size,
                report.identity.sequence,
                rtt.as_millis(),
                ttl
            ),
            _ => println!("Request timed out."),
        })
        .await?;

    println!("\nPing Statistics for {}:", destination);
    println!(
        "\tPackets: Sent = {}, Received = {}, Lost = {} ({:.2}% loss)",
        stats.counters.sent,
        stats.counters.received,
        stats.counters.lost(),
        stats.loss_percentage()
    );
    if let (Some(min), Some(max), Some(avg)) = (stats.min_rtt(), stats.max_rtt(), stats.average_rtt()) {
        println!("Approximate round trip times in milli-seconds:");
        println!(
            "\tMinimum = {}ms, Maximum = {}ms, Average = {}ms",
            min.as_millis(),
            max.as_millis(),
            avg.as_millis()
        );
    }
    Ok(())
}
