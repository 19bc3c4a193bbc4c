//! Tests for the quota manager

#[cfg(test)]
mod tests {
    use super::super::manager::QuotaManager;
    use super::super::provider::{QuotaConfigProvider, ScopeLimits};
    use super::super::types::QuotaKey;
    use crate::config::models::quota::QuotaConfig;
    use crate::core::clock::{Clock, ManualClock};
    use crate::core::notifications::{
        ChannelNotificationSink, NotificationLevel, NotificationSink, QuotaNotification,
    };
    use crate::core::scope::{QuotaPeriod, QuotaType, Scope};
    use crate::storage::{AtomicUpdater, DEFAULT_CAS_MAX_RETRIES, MemoryStore, StateStore};
    use crate::utils::error::{AdmissionError, Result};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::at(
            Utc.with_ymd_and_hms(2024, 3, 14, 10, 0, 0).unwrap(),
        ))
    }

    fn updater() -> Arc<AtomicUpdater> {
        Arc::new(AtomicUpdater::new(
            Arc::new(MemoryStore::new()),
            DEFAULT_CAS_MAX_RETRIES,
        ))
    }

    fn manager_with(config: QuotaConfig, clock: Arc<ManualClock>) -> QuotaManager {
        QuotaManager::from_config(config, updater(), clock)
    }

    fn user_tokens(limit: f64) -> QuotaConfig {
        QuotaConfig::default().with_limit(Scope::User, QuotaType::Tokens, QuotaPeriod::Day, limit)
    }

    fn with_receiver(
        manager: QuotaManager,
    ) -> (QuotaManager, UnboundedReceiver<QuotaNotification>) {
        let (sink, receiver) = ChannelNotificationSink::new();
        (manager.with_notifier(Arc::new(sink)), receiver)
    }

    // ==================== Check Tests ====================

    #[tokio::test]
    async fn test_check_within_headroom() {
        let manager = manager_with(user_tokens(100.0), clock());
        let check = manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 100.0, false)
            .await
            .unwrap();
        assert!(!check.reserved);
        assert_eq!(check.quotas.len(), 1);
        assert_eq!(check.quotas[0].remaining, 100.0);
    }

    #[tokio::test]
    async fn test_check_without_reserve_changes_nothing() {
        let manager = manager_with(user_tokens(10.0), clock());
        for _ in 0..5 {
            manager
                .check_quota(Scope::User, "alice", QuotaType::Tokens, 10.0, false)
                .await
                .unwrap();
        }
        let status = manager
            .quota_status(Scope::User, "alice", QuotaType::Tokens)
            .await
            .unwrap();
        assert_eq!(status[0].used, 0.0);
        assert_eq!(status[0].reserved, 0.0);
    }

    #[tokio::test]
    async fn test_reservations_count_against_headroom() {
        let manager = manager_with(user_tokens(100.0), clock());
        manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 60.0, true)
            .await
            .unwrap();

        let err = manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 50.0, true)
            .await
            .unwrap_err();
        match err {
            AdmissionError::QuotaExceeded {
                reserved, used, limit, ..
            } => {
                assert_eq!(reserved, 60.0);
                assert_eq!(used, 0.0);
                assert_eq!(limit, 100.0);
            }
            other => panic!("expected QuotaExceeded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_direct_config_fails_closed() {
        let manager = manager_with(user_tokens(100.0), clock());

        let err = manager
            .check_quota(Scope::Group, "research", QuotaType::Tokens, 1.0, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::Config(_)));

        let err = manager
            .check_quota(Scope::User, "alice", QuotaType::Cost, 1.0, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::Config(_)));
    }

    #[tokio::test]
    async fn test_invalid_cost() {
        let manager = manager_with(user_tokens(100.0), clock());
        let err = manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, -1.0, true)
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::Validation(_)));
    }

    #[tokio::test]
    async fn test_disabled_manager_admits_everything() {
        let mut config = user_tokens(1.0);
        config.enabled = false;
        let manager = manager_with(config, clock());
        let check = manager
            .check_quota(Scope::Site, "nowhere", QuotaType::Cost, 1e9, true)
            .await
            .unwrap();
        assert!(check.quotas.is_empty());
    }

    // ==================== Chain Tests ====================

    fn chain_config() -> QuotaConfig {
        let mut config = QuotaConfig::default()
            .with_limit(Scope::User, QuotaType::Tokens, QuotaPeriod::Day, 1_000.0)
            .with_limit(Scope::Group, QuotaType::Tokens, QuotaPeriod::Day, 50.0)
            .with_limit(Scope::Global, QuotaType::Tokens, QuotaPeriod::Month, 10_000.0);
        config
            .hierarchy
            .user_groups
            .insert("alice".to_string(), "research".to_string());
        config
            .hierarchy
            .group_sites
            .insert("research".to_string(), "eu".to_string());
        config
    }

    #[tokio::test]
    async fn test_most_restrictive_quota_in_chain_wins() {
        let manager = manager_with(chain_config(), clock());

        let err = manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 60.0, true)
            .await
            .unwrap_err();
        match err {
            AdmissionError::QuotaExceeded {
                scope, scope_id, ..
            } => {
                assert_eq!(scope, Scope::Group);
                assert_eq!(scope_id, "research");
            }
            other => panic!("expected QuotaExceeded, got {:?}", other),
        }

        // The user reservation taken before the group denied was rolled back
        let status = manager
            .quota_status(Scope::User, "alice", QuotaType::Tokens)
            .await
            .unwrap();
        assert!(status.iter().all(|q| q.reserved == 0.0));
    }

    #[tokio::test]
    async fn test_chain_order_and_skipped_ancestors() {
        let manager = manager_with(chain_config(), clock());
        let check = manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 10.0, true)
            .await
            .unwrap();

        // The site has no limits and is skipped
        let scopes: Vec<_> = check.quotas.iter().map(|q| q.scope).collect();
        assert_eq!(scopes, vec![Scope::User, Scope::Group, Scope::Global]);
        assert!(check.quotas.iter().all(|q| q.reserved == 10.0));
        assert_eq!(check.tightest().unwrap().scope, Scope::Group);
    }

    #[tokio::test]
    async fn test_reports_first_insufficient_quota() {
        let config = QuotaConfig::default()
            .with_limit(Scope::User, QuotaType::Requests, QuotaPeriod::Hour, 2.0)
            .with_limit(Scope::User, QuotaType::Requests, QuotaPeriod::Day, 1.0);
        let manager = manager_with(config, clock());

        let err = manager
            .check_quota(Scope::User, "a", QuotaType::Requests, 3.0, false)
            .await
            .unwrap_err();
        // Hour sorts before day
        assert!(matches!(
            err,
            AdmissionError::QuotaExceeded {
                period: QuotaPeriod::Hour,
                ..
            }
        ));
    }

    // ==================== Reservation Protocol Tests ====================

    #[tokio::test]
    async fn test_reservation_round_trip() {
        let manager = manager_with(user_tokens(1_000.0), clock());

        manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 200.0, true)
            .await
            .unwrap();
        let snapshots = manager
            .consume_quota(Scope::User, "alice", QuotaType::Tokens, 150.0, 200.0)
            .await
            .unwrap();

        assert_eq!(snapshots[0].used, 150.0);
        assert_eq!(snapshots[0].reserved, 0.0);
    }

    #[tokio::test]
    async fn test_release_returns_reservation() {
        let manager = manager_with(user_tokens(100.0), clock());
        manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 100.0, true)
            .await
            .unwrap();
        assert!(manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 1.0, false)
            .await
            .is_err());

        manager
            .release_quota(Scope::User, "alice", QuotaType::Tokens, 100.0)
            .await
            .unwrap();
        assert!(manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 100.0, false)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_release_and_consume_clamp_at_zero() {
        let manager = manager_with(user_tokens(100.0), clock());
        manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 10.0, true)
            .await
            .unwrap();
        manager
            .release_quota(Scope::User, "alice", QuotaType::Tokens, 50.0)
            .await
            .unwrap();
        let snapshots = manager
            .consume_quota(Scope::User, "alice", QuotaType::Tokens, 5.0, 30.0)
            .await
            .unwrap();
        assert_eq!(snapshots[0].reserved, 0.0);
        assert_eq!(snapshots[0].used, 5.0);
    }

    #[tokio::test]
    async fn test_consume_beyond_limit_marks_exceeded() {
        let manager = manager_with(user_tokens(100.0), clock());
        manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 50.0, true)
            .await
            .unwrap();
        let snapshots = manager
            .consume_quota(Scope::User, "alice", QuotaType::Tokens, 120.0, 50.0)
            .await
            .unwrap();
        assert!(snapshots[0].is_exceeded);
        assert_eq!(snapshots[0].remaining, 0.0);

        assert!(manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 0.5, false)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_decimal_costs_reach_limit() {
        let config =
            QuotaConfig::default().with_limit(Scope::User, QuotaType::Cost, QuotaPeriod::Day, 0.3);
        let manager = manager_with(config, clock());

        for _ in 0..3 {
            manager
                .check_quota(Scope::User, "alice", QuotaType::Cost, 0.1, true)
                .await
                .unwrap();
        }
        assert!(manager
            .check_quota(Scope::User, "alice", QuotaType::Cost, 0.1, false)
            .await
            .is_err());

        for _ in 0..3 {
            manager
                .consume_quota(Scope::User, "alice", QuotaType::Cost, 0.1, 0.1)
                .await
                .unwrap();
        }
        let status = manager
            .quota_status(Scope::User, "alice", QuotaType::Cost)
            .await
            .unwrap();
        assert_eq!(status[0].reserved, 0.0);
        assert!(status[0].is_exceeded);
    }

    #[tokio::test]
    async fn test_consume_on_books_only_named_quotas() {
        let config = user_tokens(1_000.0).with_limit(
            Scope::Global,
            QuotaType::Tokens,
            QuotaPeriod::Day,
            10_000.0,
        );
        let manager = manager_with(config, clock());
        manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 100.0, true)
            .await
            .unwrap();

        let user_day = QuotaKey::new(Scope::User, "alice", QuotaType::Tokens, QuotaPeriod::Day);
        let booking = manager
            .consume_quota_on(
                Scope::User,
                "alice",
                QuotaType::Tokens,
                80.0,
                100.0,
                Some(&[user_day.clone()]),
            )
            .await
            .unwrap();
        assert!(booking.is_complete());
        assert!(booking.failed.is_empty());
        assert_eq!(booking.snapshots.len(), 1);
        assert_eq!(booking.snapshots[0].key(), user_day);

        let status = manager
            .quota_status(Scope::User, "alice", QuotaType::Tokens)
            .await
            .unwrap();
        assert_eq!((status[0].used, status[0].reserved), (80.0, 0.0));
        assert_eq!((status[1].used, status[1].reserved), (0.0, 100.0));
    }

    #[tokio::test]
    async fn test_store_without_compare_and_swap() {
        let updater = Arc::new(AtomicUpdater::new(
            Arc::new(MemoryStore::without_compare_and_swap()),
            DEFAULT_CAS_MAX_RETRIES,
        ));
        let manager = QuotaManager::from_config(user_tokens(100.0), updater, clock());

        manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 60.0, true)
            .await
            .unwrap();
        assert!(manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 50.0, true)
            .await
            .is_err());
        manager
            .consume_quota(Scope::User, "alice", QuotaType::Tokens, 40.0, 60.0)
            .await
            .unwrap();
        manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 50.0, true)
            .await
            .unwrap();
        manager
            .release_quota(Scope::User, "alice", QuotaType::Tokens, 50.0)
            .await
            .unwrap();

        let status = manager
            .quota_status(Scope::User, "alice", QuotaType::Tokens)
            .await
            .unwrap();
        assert_eq!((status[0].used, status[0].reserved), (40.0, 0.0));
    }

    // ==================== Rollover Tests ====================

    #[tokio::test]
    async fn test_rollover_after_multiple_periods() {
        let clock = clock();
        let manager = manager_with(user_tokens(100.0), clock.clone());

        manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 100.0, true)
            .await
            .unwrap();
        manager
            .consume_quota(Scope::User, "alice", QuotaType::Tokens, 100.0, 100.0)
            .await
            .unwrap();
        assert!(manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 1.0, false)
            .await
            .is_err());

        // Three and a half days later
        clock.advance(3.5 * 86_400.0);
        let check = manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 1.0, false)
            .await
            .unwrap();
        let quota = &check.quotas[0];
        assert_eq!(quota.used, 0.0);
        assert_eq!(quota.reserved, 0.0);
        assert!(quota.period_end > clock.now_utc());
        assert!(quota.period_start <= clock.now_utc());
    }

    #[tokio::test]
    async fn test_denial_reports_period_end_as_reset() {
        let clock = clock();
        let manager = manager_with(user_tokens(1.0), clock.clone());
        manager
            .consume_quota(Scope::User, "alice", QuotaType::Tokens, 1.0, 0.0)
            .await
            .unwrap();

        let err = manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 1.0, false)
            .await
            .unwrap_err();
        assert_eq!(
            err.reset_at(),
            Some(Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_limit_changes_apply_to_existing_state() {
        let clock = clock();
        let updater = updater();
        let small = QuotaManager::from_config(user_tokens(10.0), updater.clone(), clock.clone());
        small
            .consume_quota(Scope::User, "alice", QuotaType::Tokens, 10.0, 0.0)
            .await
            .unwrap();
        assert!(small
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 1.0, false)
            .await
            .is_err());

        let raised = QuotaManager::from_config(user_tokens(20.0), updater, clock);
        assert!(raised
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 1.0, false)
            .await
            .is_ok());
    }

    // ==================== Admin Tests ====================

    #[tokio::test]
    async fn test_reset_quota_clears_leaked_reservation() {
        let manager = manager_with(user_tokens(100.0), clock());
        manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 100.0, true)
            .await
            .unwrap();

        manager
            .reset_quota(Scope::User, "alice", QuotaType::Tokens, None)
            .await
            .unwrap();

        let status = manager
            .quota_status(Scope::User, "alice", QuotaType::Tokens)
            .await
            .unwrap();
        assert_eq!(status[0].reserved, 0.0);
        assert_eq!(status[0].remaining, 100.0);
    }

    #[tokio::test]
    async fn test_unreadable_quota_state_fails_closed() {
        let store = Arc::new(MemoryStore::new());
        let updater = Arc::new(AtomicUpdater::new(store.clone(), DEFAULT_CAS_MAX_RETRIES));
        let manager = QuotaManager::from_config(user_tokens(100.0), updater, clock());

        let key = QuotaKey::new(Scope::User, "alice", QuotaType::Tokens, QuotaPeriod::Day)
            .storage_key();
        store.set(&key, "{\"used\":", None).await.unwrap();

        let err = manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 1.0, true)
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::Serialization(_)));
        assert!(manager
            .quota_status(Scope::User, "alice", QuotaType::Tokens)
            .await
            .is_err());
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("{\"used\":"));

        // An operator reset recovers the quota
        manager
            .reset_quota(Scope::User, "alice", QuotaType::Tokens, None)
            .await
            .unwrap();
        manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 1.0, true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_status_applies_rollover_view() {
        let clock = clock();
        let manager = manager_with(user_tokens(100.0), clock.clone());
        manager
            .consume_quota(Scope::User, "alice", QuotaType::Tokens, 40.0, 0.0)
            .await
            .unwrap();

        clock.advance(86_400.0);
        let status = manager
            .quota_status(Scope::User, "alice", QuotaType::Tokens)
            .await
            .unwrap();
        assert_eq!(status[0].used, 0.0);
    }

    // ==================== Notification Tests ====================

    #[tokio::test]
    async fn test_warning_sent_once_per_period() {
        let clock = clock();
        let (manager, mut receiver) = with_receiver(manager_with(user_tokens(100.0), clock.clone()));

        manager
            .consume_quota(Scope::User, "alice", QuotaType::Tokens, 85.0, 0.0)
            .await
            .unwrap();
        for _ in 0..3 {
            manager
                .check_quota(Scope::User, "alice", QuotaType::Tokens, 1.0, false)
                .await
                .unwrap();
        }

        let first = receiver.try_recv().unwrap();
        assert_eq!(first.level, NotificationLevel::Warning);
        assert_eq!(first.threshold, 80.0);
        assert!(receiver.try_recv().is_err());

        // A new period may warn again
        clock.advance(86_400.0);
        manager
            .consume_quota(Scope::User, "alice", QuotaType::Tokens, 85.0, 0.0)
            .await
            .unwrap();
        manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 1.0, false)
            .await
            .unwrap();
        assert_eq!(receiver.try_recv().unwrap().level, NotificationLevel::Warning);
    }

    #[tokio::test]
    async fn test_alert_sent_on_every_check() {
        let (manager, mut receiver) = with_receiver(manager_with(user_tokens(100.0), clock()));
        manager
            .consume_quota(Scope::User, "alice", QuotaType::Tokens, 96.0, 0.0)
            .await
            .unwrap();

        for _ in 0..3 {
            manager
                .check_quota(Scope::User, "alice", QuotaType::Tokens, 1.0, false)
                .await
                .unwrap();
        }

        for _ in 0..3 {
            assert_eq!(receiver.try_recv().unwrap().level, NotificationLevel::Alert);
        }
        assert!(receiver.try_recv().is_err());
    }

    #[derive(Debug)]
    struct FailingSink;

    impl NotificationSink for FailingSink {
        fn notify_quota_warning(&self, _notification: QuotaNotification) -> Result<()> {
            Err(AdmissionError::internal("pager is down"))
        }
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_affect_decision() {
        let manager =
            manager_with(user_tokens(100.0), clock()).with_notifier(Arc::new(FailingSink));
        manager
            .consume_quota(Scope::User, "alice", QuotaType::Tokens, 99.0, 0.0)
            .await
            .unwrap();
        assert!(manager
            .check_quota(Scope::User, "alice", QuotaType::Tokens, 1.0, true)
            .await
            .is_ok());
    }

    // ==================== Provider Tests ====================

    /// Provider whose limits come from somewhere other than the config file
    #[derive(Debug)]
    struct FixedProvider;

    #[async_trait]
    impl QuotaConfigProvider for FixedProvider {
        async fn get_limits(&self, scope: Scope, _scope_id: &str) -> Result<Option<ScopeLimits>> {
            if scope != Scope::User {
                return Ok(None);
            }
            let config = QuotaConfig::default().with_limit(
                Scope::User,
                QuotaType::Cost,
                QuotaPeriod::Month,
                5.0,
            );
            Ok(config.limits_for(Scope::User, "any").map(|limits| ScopeLimits {
                limits: limits.clone(),
                warn_threshold: 50.0,
                alert_threshold: 90.0,
            }))
        }
    }

    #[tokio::test]
    async fn test_custom_provider() {
        let static_config = Arc::new(crate::core::quota::StaticQuotaConfig::default());
        let manager = QuotaManager::new(Arc::new(FixedProvider), static_config, updater(), clock());

        manager
            .check_quota(Scope::User, "bob", QuotaType::Cost, 4.5, true)
            .await
            .unwrap();
        assert!(manager
            .check_quota(Scope::User, "bob", QuotaType::Cost, 1.0, true)
            .await
            .is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reservations_never_overbook() {
        let manager = Arc::new(manager_with(user_tokens(5.0), clock()));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager
                    .check_quota(Scope::User, "alice", QuotaType::Tokens, 1.0, true)
                    .await
                    .is_ok()
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
    }
}
