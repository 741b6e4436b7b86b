use std::{net::IpAddr, time::Duration};

use serde_json::json;

use super::test_util::{TestAdapter, setup_test_logging, start_adapter};
use crate::{
    Error,
    adapter::{Adapter, AdapterOptions},
    config::{AdapterConfig, ConfigStore, MemoryConfigStore},
    stats::PersistenceStatus,
};

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

// Lets the wall clock move past the session start so the next poll counts.
async fn tick() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[tokio::test]
async fn test_startup_merges_crash_snapshot_once() {
    setup_test_logging();
    let TestAdapter { store, adapter, .. } = start_adapter(AdapterConfig {
        history_status: PersistenceStatus {
            total_download: 1000,
            ..Default::default()
        },
        session_status: Some(PersistenceStatus {
            total_download: 500,
            ..Default::default()
        }),
        ..Default::default()
    })
    .await;

    let stored = store.stored();
    assert_eq!(stored.history_status.total_download, 1500);
    assert_eq!(stored.session_status, None);
    assert_eq!(
        serde_json::to_value(&stored).unwrap()["session_status"],
        json!({})
    );
    assert_eq!(store.saves(), 1);
    assert_eq!(adapter.history_status().total_download, 1500);

    // Simulate another crash: the cleared document is loaded again.
    let TestAdapter {
        store: second_store,
        adapter: second,
        ..
    } = start_adapter(stored).await;
    assert_eq!(second_store.saves(), 0);
    assert_eq!(second.history_status().total_download, 1500);
}

#[tokio::test]
async fn test_disable_folds_session_into_history() {
    setup_test_logging();
    let TestAdapter {
        engine,
        store,
        adapter,
    } = start_adapter(AdapterConfig {
        history_status: PersistenceStatus {
            total_upload: 100,
            ..Default::default()
        },
        ..Default::default()
    })
    .await;

    adapter.filter().ban(["10.0.0.1", "10.0.0.2"]).unwrap();
    adapter.filter().unban(["10.0.0.2"]).unwrap();

    engine.counters.sent_bytes(400);
    engine.counters.sent_ip_overhead_bytes(100);
    tick().await;
    let totals = adapter.refresh_session_totals().await.unwrap();
    assert_eq!(totals.totals.total_upload, 600);

    adapter.disable().await.unwrap();
    let stored = store.stored();
    assert_eq!(stored.history_status.total_upload, 600);
    assert_eq!(stored.session_status, None);
    assert_eq!(stored.blocklist, vec!["10.0.0.1".to_owned()]);

    let saves = store.saves();
    adapter.disable().await.unwrap();
    assert_eq!(store.saves(), saves);
    assert_eq!(store.stored().history_status.total_upload, 600);

    // Polling is over.
    assert!(adapter.refresh_session_totals().await.is_err());
}

#[tokio::test]
async fn test_failed_disable_can_be_retried() {
    let TestAdapter {
        engine,
        store,
        adapter,
    } = start_adapter(Default::default()).await;
    engine.counters.recv_bytes(10);
    tick().await;
    adapter.refresh_session_totals().await.unwrap();

    store.fail_writes(true);
    assert!(matches!(
        adapter.disable().await,
        Err(Error::Persistence(_))
    ));
    assert_eq!(store.stored().history_status.total_download, 0);

    store.fail_writes(false);
    adapter.disable().await.unwrap();
    assert_eq!(store.stored().history_status.total_download, 10);
}

#[tokio::test]
async fn test_persisted_blocklist_is_restored() {
    let TestAdapter {
        engine, adapter, ..
    } = start_adapter(AdapterConfig {
        blocklist: vec!["10.0.0.1".into(), "garbage".into(), "2001:db8::7".into()],
        ..Default::default()
    })
    .await;

    assert!(engine.is_blocked(ip("10.0.0.1")));
    assert!(engine.is_blocked(ip("2001:db8::7")));
    assert!(!engine.is_blocked(ip("10.0.0.2")));
    assert_eq!(adapter.filter().snapshot().size, 2);
}

#[tokio::test]
async fn test_session_totals_returns_previous_view() {
    let TestAdapter {
        engine, adapter, ..
    } = start_adapter(AdapterConfig {
        history_status: PersistenceStatus {
            total_payload_download: 50,
            ..Default::default()
        },
        ..Default::default()
    })
    .await;

    engine.counters.recv_payload_bytes(7);
    tick().await;
    let stale = adapter.session_totals();
    assert_eq!(stale.totals.total_payload_download, 50);

    let fresh = adapter.refresh_session_totals().await.unwrap();
    assert_eq!(fresh.totals.total_payload_download, 57);
    assert_eq!(adapter.session_totals().totals.total_payload_download, 57);
    // History only moves on disable.
    assert_eq!(adapter.history_status().total_payload_download, 50);
}

#[tokio::test]
async fn test_set_config_saves_arbitrary_keys() {
    let TestAdapter { store, adapter, .. } = start_adapter(Default::default()).await;
    let patch = json!({"ui_refresh_secs": 5});
    adapter
        .set_config(patch.as_object().unwrap().clone())
        .await
        .unwrap();
    assert_eq!(store.stored().extra["ui_refresh_secs"], 5);

    let bad = json!({"history_status": "lots"});
    assert!(matches!(
        adapter.set_config(bad.as_object().unwrap().clone()).await,
        Err(Error::InvalidConfig(_))
    ));
    assert_eq!(store.stored().extra["ui_refresh_secs"], 5);
}

#[tokio::test]
async fn test_enable_fails_on_unreadable_store() {
    #[derive(Debug)]
    struct Broken;

    #[async_trait::async_trait]
    impl ConfigStore for Broken {
        async fn load(&self) -> anyhow::Result<AdapterConfig> {
            anyhow::bail!("no disk")
        }
        async fn save(&self, _: &AdapterConfig) -> anyhow::Result<()> {
            Ok(())
        }
    }

    let engine = std::sync::Arc::new(crate::engine::local::LocalEngine::default());
    let r = Adapter::enable(engine, std::sync::Arc::new(Broken), AdapterOptions::default()).await;
    assert!(matches!(r, Err(Error::Persistence(_))));

    // A store that can be read but not written only fails when recovery needs a save.
    let store = std::sync::Arc::new(MemoryConfigStore::new(AdapterConfig {
        session_status: Some(PersistenceStatus {
            total_upload: 1,
            ..Default::default()
        }),
        ..Default::default()
    }));
    store.fail_writes(true);
    let engine = std::sync::Arc::new(crate::engine::local::LocalEngine::default());
    assert!(
        Adapter::enable(engine, store.clone(), AdapterOptions::default())
            .await
            .is_err()
    );
    assert!(store.stored().session_status.is_some());
}
