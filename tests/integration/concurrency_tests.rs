//! Concurrent admission against shared state
//!
//! Two racers on the last unit must never both be admitted, whether they
//! share one controller, one store through separate controllers, or one
//! durable store behind separate cache tiers.

#[cfg(test)]
mod tests {
    use crate::common::fixtures::{self, T0};
    use futures::future::join_all;
    use llm_admission::config::StorageConfig;
    use llm_admission::{
        AdmissionController, AdmissionRequest, Config, ManualClock, MemoryStore, QuotaType,
        RateLimiter, Scope, StateStore, TieredStore,
    };
    use std::sync::Arc;

    fn capacity_five(strategy: &str) -> Config {
        fixtures::rate_only_config(&format!(
            "    - {{ name: five, scope: user, strategy: {}, limit: 5, window_secs: 3600 }}",
            strategy
        ))
    }

    fn request() -> AdmissionRequest {
        AdmissionRequest::user("alice", "openai", QuotaType::Requests, 1.0)
    }

    fn controller_on(config: &Config, store: Arc<dyn StateStore>) -> AdmissionController {
        AdmissionController::with_store(config, store, Arc::new(ManualClock::new(T0)))
    }

    /// Fire `n` admissions per controller at once and count the admitted ones
    async fn race(controllers: &[AdmissionController], n: usize) -> usize {
        let mut handles = Vec::new();
        for controller in controllers {
            for _ in 0..n {
                let controller = controller.clone();
                handles.push(tokio::spawn(async move {
                    match controller.admit(request()).await {
                        Ok(ticket) => {
                            controller.settle(ticket, 1.0).await.unwrap();
                            true
                        }
                        Err(e) => {
                            assert!(e.is_denial(), "unexpected error: {}", e);
                            false
                        }
                    }
                }));
            }
        }

        join_all(handles)
            .await
            .into_iter()
            .filter(|admitted| *admitted.as_ref().unwrap())
            .count()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_capacity_five_admits_exactly_five() {
        for strategy in ["token_bucket", "sliding_window", "fixed_window"] {
            let controller = controller_on(&capacity_five(strategy), Arc::new(MemoryStore::new()));
            assert_eq!(race(&[controller], 40).await, 5, "strategy {}", strategy);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_separate_controllers_share_one_store() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let config = capacity_five("token_bucket");
        let controllers = [
            controller_on(&config, store.clone()),
            controller_on(&config, store.clone()),
            controller_on(&config, store),
        ];
        assert_eq!(race(&controllers, 15).await, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_cache_tiers_over_one_durable_store() {
        let durable: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let cache = StorageConfig::default().cache;
        let config = capacity_five("sliding_window");

        let controllers = [
            controller_on(&config, Arc::new(TieredStore::new(durable.clone(), &cache))),
            controller_on(&config, Arc::new(TieredStore::new(durable, &cache))),
        ];
        assert_eq!(race(&controllers, 20).await, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_quota_reservations_never_overbook() {
        let config = Config::from_yaml_str(
            r#"
quota:
  scopes:
    user:
      default:
        requests:
          day: 5
"#,
        )
        .unwrap();
        let controller = controller_on(&config, Arc::new(MemoryStore::new()));

        let attempts = join_all((0..30).map(|_| {
            let controller = controller.clone();
            tokio::spawn(async move { controller.admit(request()).await })
        }))
        .await;

        let mut tickets = Vec::new();
        for attempt in attempts {
            if let Ok(ticket) = attempt.unwrap() {
                tickets.push(ticket);
            }
        }
        assert_eq!(tickets.len(), 5);

        for ticket in tickets {
            controller.settle(ticket, 1.0).await.unwrap();
        }
        let status = controller
            .quota()
            .quota_status(Scope::User, "alice", QuotaType::Requests)
            .await
            .unwrap();
        assert_eq!(status[0].used, 5.0);
        assert_eq!(status[0].reserved, 0.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_counter_only_store_falls_back_to_fixed_window() {
        let config = capacity_five("token_bucket");
        let limiter = RateLimiter::from_store(
            config.rate_limit().clone(),
            Arc::new(MemoryStore::without_compare_and_swap()),
            Arc::new(ManualClock::new(T0)),
        );

        let results = join_all((0..25).map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.check_limit(Scope::User, "alice", "openai", 1.0).await })
        }))
        .await;

        let admitted = results
            .into_iter()
            .filter(|result| result.as_ref().unwrap().is_ok())
            .count();
        assert_eq!(admitted, 5);
    }
}
