//! Admission scenarios combining rate limits and quotas

#[cfg(test)]
mod tests {
    use crate::common::fixtures::{self, Harness};
    use crate::common::DenialAssertions;
    use llm_admission::{
        AdmissionError, AdmissionRequest, NotificationLevel, QuotaPeriod, QuotaType, Scope,
    };

    fn requests(identifier: &str, provider: &str) -> AdmissionRequest {
        AdmissionRequest::user(identifier, provider, QuotaType::Requests, 1.0)
    }

    // ==================== Rate Limit Scenarios ====================

    #[tokio::test]
    async fn test_burst_of_ten_then_refill() {
        let harness = Harness::new(fixtures::rate_only_config(
            "    - { name: per-user, scope: user, limit: 10, window_secs: 10 }",
        ));

        for i in 0..10 {
            assert!(
                harness.call(requests("alice", "openai")).await.is_ok(),
                "request {} should be admitted",
                i + 1
            );
        }

        let eleventh = harness.controller.admit(requests("alice", "openai")).await;
        assert_eq!(eleventh.assert_rate_limited(), 1);

        harness.clock.advance(1.0);
        assert!(harness.call(requests("alice", "openai")).await.is_ok());

        // Other users have their own bucket
        assert!(harness.call(requests("bob", "openai")).await.is_ok());
    }

    #[tokio::test]
    async fn test_sliding_window_admits_exactly_three() {
        let harness = Harness::new(fixtures::rate_only_config(
            "    - { name: strict, scope: user, strategy: sliding_window, limit: 3, window_secs: 10 }",
        ));

        for _ in 0..3 {
            harness.call(requests("alice", "anthropic")).await.unwrap();
            harness.clock.advance(2.0);
        }

        // Requests at t=0, 2, 4; now t=6
        let retry = harness
            .controller
            .admit(requests("alice", "anthropic"))
            .await
            .assert_rate_limited();
        assert_eq!(retry, 5);

        harness.clock.advance(4.0);
        assert!(harness.call(requests("alice", "anthropic")).await.is_ok());
        assert!(harness
            .controller
            .admit(requests("alice", "anthropic"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_provider_limit_does_not_block_other_providers() {
        let harness = Harness::new(fixtures::team_config());

        for _ in 0..3 {
            harness
                .call(fixtures::user_request_to("alice", "anthropic", 10.0))
                .await
                .unwrap();
        }
        let denied = harness
            .controller
            .admit(fixtures::user_request_to("alice", "anthropic", 10.0))
            .await;
        assert!(denied.assert_rate_limited() > 0);

        assert!(harness.call(fixtures::user_request("alice", 10.0)).await.is_ok());
    }

    // ==================== Quota Scenarios ====================

    #[tokio::test]
    async fn test_most_restrictive_scope_wins() {
        let harness = Harness::new(fixtures::team_config());

        let ticket = harness
            .controller
            .admit(fixtures::user_request("alice", 1_000.0))
            .await
            .unwrap();
        harness.controller.settle(ticket, 9_000.0).await.unwrap();

        let ticket = harness
            .controller
            .admit(fixtures::user_request("carol", 1_000.0))
            .await
            .unwrap();
        harness.controller.settle(ticket, 6_000.0).await.unwrap();

        // Carol's own hour is exhausted first
        harness
            .controller
            .admit(fixtures::user_request("carol", 1.0))
            .await
            .assert_quota_denied(Scope::User, QuotaPeriod::Hour);

        // An hour later her own budgets have room but the shared group does
        // not
        harness.clock.advance(3_600.0);
        harness
            .controller
            .admit(fixtures::user_request("carol", 1.0))
            .await
            .assert_quota_denied(Scope::Group, QuotaPeriod::Day);

        // After midnight the group rolls over
        harness.clock.advance(3_600.0);
        assert!(harness.call(fixtures::user_request("carol", 1.0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_override_replaces_default_limits() {
        let harness = Harness::new(fixtures::team_config());

        harness
            .controller
            .admit(fixtures::user_request("bob", 101.0))
            .await
            .assert_quota_denied(Scope::User, QuotaPeriod::Day);
        assert!(harness.call(fixtures::user_request("bob", 100.0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_reservation_blocks_concurrent_estimate() {
        let harness = Harness::new(fixtures::team_config());

        let ticket = harness
            .controller
            .admit(fixtures::user_request("alice", 2_000.0))
            .await
            .unwrap();
        harness
            .controller
            .admit(fixtures::user_request("alice", 1.0))
            .await
            .assert_quota_denied(Scope::User, QuotaPeriod::Hour);

        harness.controller.cancel(ticket).await.unwrap();
        assert!(harness.call(fixtures::user_request("alice", 1.0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_unconfigured_scope_is_refused() {
        let harness = Harness::new(fixtures::team_config());
        let result = harness
            .controller
            .admit(AdmissionRequest::new(
                Scope::Site,
                "eu",
                "openai",
                QuotaType::Tokens,
                1.0,
            ))
            .await;
        assert!(matches!(result, Err(AdmissionError::Config(_))));
    }

    #[tokio::test]
    async fn test_warning_once_then_alerts() {
        let mut harness = Harness::new(fixtures::team_config());
        let controller = harness.controller.clone();

        let ticket = controller
            .admit(fixtures::user_request("alice", 1_000.0))
            .await
            .unwrap();
        controller.settle(ticket, 1_700.0).await.unwrap();
        assert!(harness.drain_notifications().is_empty());

        // 85% of the hourly budget
        let ticket = controller
            .admit(fixtures::user_request("alice", 1.0))
            .await
            .unwrap();
        let received = harness.drain_notifications();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].level, NotificationLevel::Warning);
        assert_eq!(received[0].quota.period, QuotaPeriod::Hour);
        controller.settle(ticket, 1.0).await.unwrap();

        let ticket = controller
            .admit(fixtures::user_request("alice", 1.0))
            .await
            .unwrap();
        assert!(harness.drain_notifications().is_empty());
        controller.settle(ticket, 250.0).await.unwrap();

        // 97.5%: alerts repeat on every check
        for _ in 0..2 {
            let ticket = controller
                .admit(fixtures::user_request("alice", 1.0))
                .await
                .unwrap();
            let received = harness.drain_notifications();
            assert_eq!(received.len(), 1);
            assert_eq!(received[0].level, NotificationLevel::Alert);
            controller.cancel(ticket).await.unwrap();
        }
    }

    // ==================== Denial Detail ====================

    #[tokio::test]
    async fn test_denials_carry_http_details() {
        let harness = Harness::new(fixtures::team_config());

        let err = harness
            .controller
            .admit(fixtures::user_request("bob", 500.0))
            .await
            .unwrap_err();
        let detail = err.denial_detail();
        assert_eq!(detail.code, "QUOTA_EXCEEDED");
        assert!(detail.retryable);

        let body = serde_json::to_value(&detail).unwrap();
        assert!(body.get("reset_at").is_some());
        assert!(body.get("retry_after_secs").is_none());

        let stats = harness.controller.stats();
        assert_eq!(stats.quota_denied, 1);
        assert_eq!(stats.admitted, 0);
    }
}
