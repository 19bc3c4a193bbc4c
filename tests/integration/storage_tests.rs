//! Admission over the shipped state stores

#[cfg(test)]
mod tests {
    use crate::common::fixtures::{self, Harness};
    use crate::common::DenialAssertions;
    use llm_admission::config::StorageConfig;
    use llm_admission::{MemoryStore, QuotaPeriod, Scope, StateStore, TieredStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_quota_state_is_stored_under_documented_key() {
        let harness = Harness::new(fixtures::team_config());
        harness.call(fixtures::user_request("alice", 10.0)).await.unwrap();

        let raw = harness
            .store
            .get("quota:user:alice:tokens:day")
            .await
            .unwrap()
            .expect("quota state is persisted");
        let state: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(state["used"], 10.0);
        assert_eq!(state["reserved"], 0.0);

        assert!(harness
            .store
            .get("quota:group:research:tokens:day")
            .await
            .unwrap()
            .is_some());
        assert!(harness
            .store
            .get("ratelimit:per-user:user:alice")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_cache_tier_serves_same_decisions() {
        let durable: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let tiered = Arc::new(TieredStore::new(durable.clone(), &StorageConfig::default().cache));
        let harness = Harness::with_store(fixtures::team_config(), tiered.clone());

        harness.call(fixtures::user_request("bob", 60.0)).await.unwrap();

        // Losing the cache loses nothing
        tiered.clear_cache();
        harness
            .controller
            .admit(fixtures::user_request("bob", 60.0))
            .await
            .assert_quota_denied(Scope::User, QuotaPeriod::Day);

        // Both tiers use identical keys
        assert_eq!(
            durable.get("quota:user:bob:tokens:day").await.unwrap(),
            tiered.get("quota:user:bob:tokens:day").await.unwrap()
        );
    }

    #[cfg(feature = "redis")]
    #[tokio::test]
    #[ignore = "requires a running Redis (set REDIS_URL)"]
    async fn test_admission_over_live_redis() {
        crate::skip_without_env!("REDIS_URL");
        use llm_admission::config::RedisConfig;
        use llm_admission::storage::RedisStore;

        let config = RedisConfig {
            url: std::env::var("REDIS_URL").unwrap(),
            key_prefix: format!("llm-admission-test-{}", uuid::Uuid::new_v4()),
            ..RedisConfig::default()
        };
        let store = Arc::new(RedisStore::connect(&config).await.unwrap());
        let harness = Harness::with_store(
            fixtures::rate_only_config(
                "    - { name: per-user, scope: user, limit: 3, window_secs: 60 }",
            ),
            store,
        );

        for _ in 0..3 {
            harness
                .call(llm_admission::AdmissionRequest::user(
                    "alice",
                    "openai",
                    llm_admission::QuotaType::Requests,
                    1.0,
                ))
                .await
                .unwrap();
        }
        let denied = harness
            .controller
            .admit(llm_admission::AdmissionRequest::user(
                "alice",
                "openai",
                llm_admission::QuotaType::Requests,
                1.0,
            ))
            .await;
        assert!(denied.assert_rate_limited() >= 1);
    }
}
