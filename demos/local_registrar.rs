//! Local registrar demo - Several workloads sharing one identifier pool
//!
//! Run with: cargo run --example local_registrar -- [workloads] [max_targets]
//!
//! Starts one stream manager per simulated workload, all registering into
//! the same in-memory target registry, and prints every status change. With
//! more workloads than identifiers some of them stay UNAVAILABLE and keep
//! retrying until a slot frees up.
//!
//! Set `RUST_LOG=target_registrar=debug` to follow the allocation steps.

use std::sync::Arc;
use std::time::Duration;

use target_registrar::client::{MemoryTargetRegistry, StaticConduit};
use target_registrar::manager::{ConfiguredStream, ManagerConfig, StreamManager};
use target_registrar::registry::StatusRegistry;
use target_registrar::stream::{StreamIdentity, TargetStatus};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let workloads: usize = args.get(1).map(|s| s.parse()).transpose()?.unwrap_or(4);
    let max_targets: u32 = args.get(2).map(|s| s.parse()).transpose()?.unwrap_or(3);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("target_registrar=info".parse()?),
        )
        .init();

    let config = ManagerConfig::default()
        .entry_timeout(Duration::from_secs(10))
        .retry_delay(Duration::from_millis(500));

    // Lease outlasts the refresh interval plus RPC latency
    let lease = config.entry_timeout + Duration::from_secs(2);
    let registry =
        Arc::new(MemoryTargetRegistry::new(lease).with_latency(Duration::from_millis(20)));
    let expiry = registry.spawn_expiry_task(Duration::from_secs(1));
    let statuses = Arc::new(StatusRegistry::new());

    let stream = StreamIdentity::new("trench-a", "conduit-a", "stream-a");
    let mut managers = Vec::with_capacity(workloads);
    for n in 1..=workloads {
        let conduit = Arc::new(StaticConduit::new([format!("172.16.0.{}/24", n)]));
        let manager =
            StreamManager::new(config.clone(), registry.clone(), conduit, statuses.clone());
        manager
            .set_streams(vec![ConfiguredStream::new(stream.clone(), max_targets)])
            .await;
        manager.run().await;
        manager.add_stream(stream.clone()).await;
        managers.push(manager);
    }

    let filter = StreamIdentity::conduit_filter("trench-a", "conduit-a");
    let mut watcher = statuses.watch(Some(filter));
    let printer = tokio::spawn(async move {
        while let Some(entries) = watcher.recv().await {
            for entry in entries {
                println!("{} -> {}", entry.stream, entry.status);
            }
        }
    });

    tokio::time::sleep(Duration::from_secs(3)).await;
    for target in registry.targets() {
        let state = match target.status {
            TargetStatus::Enabled => "enabled",
            _ => "disabled",
        };
        println!(
            "{:?} identifier={} {}",
            target.ips,
            target.identifier().unwrap_or("-"),
            state
        );
    }

    // Free a slot and let a waiting workload take it
    if let Some(first) = managers.first() {
        first.remove_stream(&stream).await?;
    }
    tokio::time::sleep(Duration::from_secs(2)).await;
    let enabled = registry
        .targets()
        .iter()
        .filter(|t| t.status == TargetStatus::Enabled)
        .count();
    println!("enabled after release: {}", enabled);

    for manager in &managers {
        if let Err(e) = manager.stop().await {
            eprintln!("stop failed: {}", e);
        }
    }

    printer.abort();
    expiry.abort();
    Ok(())
}
