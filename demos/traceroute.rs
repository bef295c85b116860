use async_icmp_probe::{resolve_ipv4, HopRecord, TraceConfigBuilder, TraceOutcome, Tracer};
use clap::Parser;
use std::io::Write;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Print the route packets take to a host
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The destination host
    host: String,
    /// Number of probes per TTL
    #[arg(short = 'q', default_value_t = 3)]
    nqueries: usize,
    /// Print a summary of how many probes were not answered for each hop
    #[arg(short = 'S')]
    summary: bool,
    /// Maximum number of hops
    #[arg(short = 'm', default_value_t = 30)]
    max_hops: u8,
    /// Seconds to wait for each probe
    #[arg(short = 'w', default_value_t = 1.0)]
    wait: f64,
}

fn print_hop(hop: &HopRecord, summary: bool) {
    let mut stdout = std::io::stdout().lock();
    let address = hop
        .responding_address
        .map(|address| address.to_string())
        .unwrap_or_else(|| "*".into());
    write!(stdout, "{:>2}  {}", hop.ttl, address).unwrap();
    for attempt in &hop.attempts {
        match attempt.round_trip_time {
            Some(rtt) => write!(stdout, "  {:.3} ms", rtt.as_secs_f64() * 1000.0).unwrap(),
            None => write!(stdout, "  *").unwrap(),
        }
    }
    if summary && hop.unanswered() > 0 {
        write!(stdout, "  ({} unanswered)", hop.unanswered()).unwrap();
    }
    writeln!(stdout).unwrap();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let destination = resolve_ipv4(&args.host).await?;

    let config = TraceConfigBuilder::new()
        .with_max_hops(args.max_hops)
        .with_probes_per_hop(args.nqueries)
        .with_timeout(Duration::try_from_secs_f64(args.wait)?)
        .build()?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let tracer = Tracer::open(config, destination, cancel)?;
    println!(
        "traceroute to {} ({}), {} hops max",
        args.host, destination, args.max_hops
    );
    let summary = tracer.run(|hop| print_hop(hop, args.summary)).await?;

    if summary.outcome != TraceOutcome::DestinationReached {
        println!("{} not reached ({:?})", destination, summary.outcome);
    }
    if args.summary {
        println!("{} probes unanswered", summary.unanswered);
    }
    Ok(())
}
