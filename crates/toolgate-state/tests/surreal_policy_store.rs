//! SurrealPolicyStore against an in-memory SurrealDB instance.

use chrono::Utc;
use toolgate_state::storage_traits::PolicyStore;
use toolgate_state::{NetworkPolicy, PolicyMode, PolicyRule, PolicySyncStatus, SurrealPolicyStore};

#[tokio::test]
async fn surreal_policy_round_trip_and_replace() {
    let store = SurrealPolicyStore::in_memory().await.expect("connect");

    assert!(store.load_policy("agent-a").await.unwrap().is_none());

    let mut first = NetworkPolicy::new(
        PolicyMode::AllowList,
        vec![PolicyRule::allow("github.com"), PolicyRule::deny("*")],
    );
    first.preset_id = Some("github-only".into());
    store.replace_policy("agent-a", first.clone()).await.unwrap();
    assert_eq!(store.load_policy("agent-a").await.unwrap(), Some(first));

    let second = NetworkPolicy::new(PolicyMode::DenyList, vec![PolicyRule::allow("*")]);
    store.replace_policy("agent-a", second.clone()).await.unwrap();
    assert_eq!(store.load_policy("agent-a").await.unwrap(), Some(second));
}

#[tokio::test]
async fn surreal_sync_status_and_pending_listing() {
    let store = SurrealPolicyStore::in_memory().await.expect("connect");
    let now = Utc::now();

    store
        .record_sync("agent-a", PolicySyncStatus::awaiting_push().failed(now, "unreachable"))
        .await
        .unwrap();
    store
        .record_sync("agent-b", PolicySyncStatus::awaiting_push().succeeded(now))
        .await
        .unwrap();

    assert_eq!(store.pending_syncs().await.unwrap(), vec!["agent-a".to_string()]);

    let status = store.load_sync_status("agent-a").await.unwrap().unwrap();
    assert!(status.pending);
    assert_eq!(status.attempts, 1);
    assert_eq!(status.last_error.as_deref(), Some("unreachable"));

    store
        .record_sync("agent-a", status.succeeded(now))
        .await
        .unwrap();
    assert!(store.pending_syncs().await.unwrap().is_empty());
}
