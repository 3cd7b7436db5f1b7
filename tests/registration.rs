//! End-to-end registration scenarios against the in-memory registry

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

use target_registrar::client::{MemoryTargetRegistry, StaticConduit, TargetRegistry};
use target_registrar::manager::{ConfiguredStream, ManagerConfig, StreamManager};
use target_registrar::registry::{StatusRegistry, StreamStatus};
use target_registrar::stream::{StreamIdentity, StreamSession, Target, TargetQuery, TargetStatus};
use target_registrar::{Error, Result};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn stream_a() -> StreamIdentity {
    StreamIdentity::new("trench-a", "conduit-a", "stream-a")
}

fn ip(n: usize) -> String {
    format!("172.16.0.{}/24", n)
}

fn session(registry: Arc<dyn TargetRegistry>, n: usize) -> StreamSession {
    StreamSession::new(stream_a(), registry, Arc::new(StaticConduit::new([ip(n)])))
}

/// Register a target owned by some other workload
async fn register_foreign(registry: &MemoryTargetRegistry, address: &str, identifier: u32) {
    let target = Target::new(stream_a(), vec![address.to_string()], TargetStatus::Enabled)
        .with_identifier(identifier);
    // Created disabled, enabled by the second call
    assert_ok!(registry.register(&target).await);
    assert_ok!(registry.register(&target).await);
}

fn enabled_identifiers(registry: &MemoryTargetRegistry) -> Vec<String> {
    registry
        .targets()
        .iter()
        .filter(|t| t.status == TargetStatus::Enabled)
        .filter_map(|t| t.identifier().map(str::to_string))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn concurrent_sessions_get_distinct_identifiers() {
    init_tracing();
    let registry = Arc::new(
        MemoryTargetRegistry::new(Duration::from_secs(60)).with_latency(Duration::from_millis(5)),
    );
    let token = CancellationToken::new();

    let sessions: Vec<StreamSession> = (1..=5).map(|n| session(registry.clone(), n)).collect();
    let results = join_all(sessions.iter().map(|s| s.open(&token, 8))).await;

    for result in results {
        assert_ok!(result);
    }

    let mut identifiers = HashSet::new();
    for s in &sessions {
        let identifier = s.identifier().await.expect("identifier assigned");
        assert!((1..=8).contains(&identifier));
        assert!(identifiers.insert(identifier), "duplicate identifier {identifier}");
    }

    let enabled = enabled_identifiers(&registry);
    assert_eq!(enabled.len(), 5);
    assert_eq!(enabled.iter().collect::<HashSet<_>>().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn pool_exhaustion() {
    let registry = Arc::new(MemoryTargetRegistry::new(Duration::from_secs(60)));
    let token = CancellationToken::new();

    let first = session(registry.clone(), 1);
    let second = session(registry.clone(), 2);
    let third = session(registry.clone(), 3);

    assert_ok!(first.open(&token, 2).await);
    assert_ok!(second.open(&token, 2).await);

    let err = third.open(&token, 2).await.unwrap_err();
    assert!(matches!(
        err,
        Error::IdentifierExhausted {
            in_use: 2,
            max_targets: 2
        }
    ));
    assert_eq!(third.identifier().await, None);
    assert!(!third.is_enabled().await);

    // Closing one frees a slot
    assert_ok!(first.close().await);
    assert_ok!(third.open(&token, 2).await);
    assert_ne!(third.identifier().await, second.identifier().await);
}

#[tokio::test(start_paused = true)]
async fn racing_supervisors_never_exceed_pool() {
    let registry = Arc::new(MemoryTargetRegistry::new(Duration::from_secs(60)));
    let config = ManagerConfig::default();

    let managers: Vec<StreamManager> = (1..=4)
        .map(|n| {
            StreamManager::new(
                config.clone(),
                registry.clone(),
                Arc::new(StaticConduit::new([ip(n)])),
                Arc::new(StatusRegistry::new()),
            )
        })
        .collect();

    for manager in &managers {
        manager
            .set_streams(vec![ConfiguredStream::new(stream_a(), 2)])
            .await;
        manager.run().await;
        manager.add_stream(stream_a()).await;
    }

    let count = |wanted: StreamStatus| {
        managers
            .iter()
            .filter(|m| m.status_registry().get(&stream_a()) == Some(wanted))
            .count()
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    let enabled = enabled_identifiers(&registry);
    assert_eq!(enabled.len(), 2);
    assert_ne!(enabled[0], enabled[1]);
    assert_eq!(count(StreamStatus::Open), 2);
    assert_eq!(count(StreamStatus::Unavailable), 2);

    // Losers keep retrying without taking anything over
    tokio::time::sleep(Duration::from_secs(200)).await;
    let later = enabled_identifiers(&registry);
    assert_eq!(later.len(), 2);
    assert_eq!(
        later.iter().collect::<HashSet<_>>(),
        enabled.iter().collect::<HashSet<_>>()
    );
    assert_eq!(count(StreamStatus::Open), 2);
    assert_eq!(count(StreamStatus::Unavailable), 2);

    for manager in &managers {
        assert_ok!(manager.stop().await);
    }
    assert!(registry.targets().is_empty());
}

/// Registry that makes a second workload grab the same identifier right
/// after the session under test registers it
struct RacingRegistry {
    inner: MemoryTargetRegistry,
    racer: Mutex<Option<u32>>,
    log: Mutex<Vec<String>>,
}

impl RacingRegistry {
    fn new(inner: MemoryTargetRegistry) -> Self {
        Self {
            inner,
            racer: Mutex::new(None),
            log: Mutex::new(Vec::new()),
        }
    }

    fn racer(&self) -> Option<u32> {
        *self.racer.lock().unwrap()
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl TargetRegistry for RacingRegistry {
    async fn register(&self, target: &Target) -> Result<()> {
        let identifier = target.identifier().unwrap_or("-").to_string();
        self.record(format!("register {:?} {}", target.status, identifier));
        self.inner.register(target).await?;

        let first = self.racer().is_none();
        if first && target.status == TargetStatus::Disabled {
            let picked: u32 = identifier.parse().unwrap();
            *self.racer.lock().unwrap() = Some(picked);
            let racer = Target::new(
                stream_a(),
                vec!["172.16.9.9/24".to_string()],
                TargetStatus::Disabled,
            )
            .with_identifier(picked);
            self.inner.register(&racer).await?;
        }
        Ok(())
    }

    async fn unregister(&self, target: &Target) -> Result<()> {
        let identifier = target.identifier().unwrap_or("-").to_string();
        self.record(format!("unregister {}", identifier));
        self.inner.unregister(target).await
    }

    async fn get_targets(&self, query: &TargetQuery) -> Result<Vec<Target>> {
        let targets = self.inner.get_targets(query).await?;
        let mut listed: Vec<&str> = targets.iter().filter_map(|t| t.identifier()).collect();
        listed.sort();
        self.record(format!("list {}", listed.join(",")));
        Ok(targets)
    }
}

#[tokio::test(start_paused = true)]
async fn collision_is_detected_and_corrected() {
    init_tracing();
    let memory = MemoryTargetRegistry::new(Duration::from_secs(60));
    register_foreign(&memory, "172.16.8.8/24", 1).await;

    let registry = Arc::new(RacingRegistry::new(memory));
    let token = CancellationToken::new();
    let a = session(registry.clone(), 1);

    assert_ok!(a.open(&token, 3).await);

    let racer = registry.racer().expect("racer picked");
    let mine = a.identifier().await.expect("identifier assigned");
    assert!(a.is_enabled().await);
    assert_eq!(
        [racer, mine].into_iter().collect::<HashSet<_>>(),
        HashSet::from([2, 3])
    );

    let log = registry.log();
    assert_eq!(
        log,
        vec![
            "list 1".to_string(),
            format!("register Disabled {racer}"),
            format!("list 1,{racer},{racer}"),
            format!("unregister {racer}"),
            format!("register Disabled {mine}"),
            format!("list 1,{racer},{mine}"),
            format!("register Enabled {mine}"),
        ]
        .into_iter()
        .map(|entry| sort_listing(&entry))
        .collect::<Vec<_>>()
    );
}

fn sort_listing(entry: &str) -> String {
    match entry.strip_prefix("list ") {
        Some(listed) => {
            let mut ids: Vec<&str> = listed.split(',').collect();
            ids.sort();
            format!("list {}", ids.join(","))
        }
        None => entry.to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn two_racers_converge() {
    let registry = Arc::new(
        MemoryTargetRegistry::new(Duration::from_secs(60)).with_latency(Duration::from_millis(3)),
    );
    register_foreign(&registry, "172.16.8.8/24", 1).await;

    let token = CancellationToken::new();
    let a = session(registry.clone(), 1);
    let b = session(registry.clone(), 2);

    let (ra, rb) = tokio::join!(a.open(&token, 3), b.open(&token, 3));
    assert_ok!(ra);
    assert_ok!(rb);

    let ids: HashSet<u32> = [a.identifier().await.unwrap(), b.identifier().await.unwrap()]
        .into_iter()
        .collect();
    assert_eq!(ids, HashSet::from([2, 3]));
}

#[tokio::test(start_paused = true)]
async fn conduit_down_suppresses_open() {
    let registry = Arc::new(MemoryTargetRegistry::new(Duration::from_secs(60)));
    let statuses = Arc::new(StatusRegistry::new());
    let manager = StreamManager::new(
        ManagerConfig::default(),
        registry.clone(),
        Arc::new(StaticConduit::new([ip(1)])),
        statuses.clone(),
    );
    let streams: Vec<StreamIdentity> = ["s1", "s2", "s3"]
        .iter()
        .map(|s| StreamIdentity::new("trench-a", "conduit-a", *s))
        .collect();

    manager
        .set_streams(
            streams
                .iter()
                .map(|s| ConfiguredStream::new(s.clone(), 10))
                .collect(),
        )
        .await;
    manager.run().await;
    for s in &streams {
        manager.add_stream(s.clone()).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    manager.conduit_down(true).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = {
        let seen = seen.clone();
        let mut watcher = statuses.watch(None);
        tokio::spawn(async move {
            while let Some(entries) = watcher.recv().await {
                seen.lock().unwrap().extend(entries.into_iter().map(|e| e.status));
            }
        })
    };

    // Several refresh rounds while down
    tokio::time::sleep(Duration::from_secs(150)).await;
    recorder.abort();

    let seen = seen.lock().unwrap().clone();
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|status| *status == StreamStatus::Unavailable));
    // Registrations were kept alive meanwhile
    assert_eq!(enabled_identifiers(&registry).len(), 3);

    manager.conduit_down(false).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    for s in &streams {
        assert_eq!(statuses.get(s), Some(StreamStatus::Open));
    }
}

#[tokio::test(start_paused = true)]
async fn watch_filters_by_conduit() {
    let registry = Arc::new(MemoryTargetRegistry::new(Duration::from_secs(60)));
    let statuses = Arc::new(StatusRegistry::new());

    let mut managers = Vec::new();
    for (n, conduit) in ["conduit-1", "conduit-2"].iter().enumerate() {
        let manager = StreamManager::new(
            ManagerConfig::default(),
            registry.clone(),
            Arc::new(StaticConduit::new([ip(n + 1)])),
            statuses.clone(),
        );
        let identities = [
            StreamIdentity::new("trench-a", *conduit, "s1"),
            StreamIdentity::new("trench-a", *conduit, "s2"),
        ];
        manager
            .set_streams(
                identities
                    .iter()
                    .map(|s| ConfiguredStream::new(s.clone(), 4))
                    .collect(),
            )
            .await;
        manager.run().await;
        for s in identities {
            manager.add_stream(s).await;
        }
        managers.push(manager);
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut conduit_watcher =
        statuses.watch(Some(StreamIdentity::conduit_filter("trench-a", "conduit-1")));
    let selected = conduit_watcher.recv().await.unwrap();
    assert_eq!(selected.len(), 2);
    assert!(selected.iter().all(|e| e.stream.conduit == "conduit-1"));
    assert!(selected.iter().all(|e| e.status == StreamStatus::Open));

    let mut all = statuses.watch(None);
    assert_eq!(all.recv().await.unwrap().len(), 4);

    // Removing a stream of the other conduit is invisible to the filtered watcher
    assert_ok!(
        managers[1]
            .remove_stream(&StreamIdentity::new("trench-a", "conduit-2", "s1"))
            .await
    );
    assert_eq!(all.recv().await.unwrap().len(), 3);
    let pending = tokio::time::timeout(Duration::from_millis(50), conduit_watcher.recv()).await;
    assert!(pending.is_err());
}

#[tokio::test(start_paused = true)]
async fn expired_target_is_reclaimed() {
    let registry = Arc::new(MemoryTargetRegistry::new(Duration::from_secs(60)));
    let expiry = registry.spawn_expiry_task(Duration::from_secs(1));
    let statuses = Arc::new(StatusRegistry::new());
    let manager = StreamManager::new(
        ManagerConfig::default(),
        registry.clone(),
        Arc::new(StaticConduit::new([ip(1)])),
        statuses.clone(),
    );

    manager
        .set_streams(vec![ConfiguredStream::new(stream_a(), 4)])
        .await;
    manager.run().await;
    manager.add_stream(stream_a()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Lost behind the manager's back
    registry.clear();
    assert!(registry.targets().is_empty());

    // Next refresh notices and allocates again
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(enabled_identifiers(&registry).len(), 1);
    assert_eq!(statuses.get(&stream_a()), Some(StreamStatus::Open));

    expiry.abort();
}
