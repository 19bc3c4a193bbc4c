//! Configuration loading and validation through the public API

#[cfg(test)]
mod tests {
    use crate::common::fixtures::{self, TEAM_CONFIG};
    use llm_admission::config::StorageBackend;
    use llm_admission::{AdmissionController, AdmissionError, Config, FailurePolicy, QuotaType, Scope};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const EXAMPLE: &str = include_str!("../../config/admission.example.yaml");

    // ==================== Loading ====================

    #[tokio::test]
    async fn test_controller_from_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(TEAM_CONFIG.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).await.unwrap();
        let controller = AdmissionController::from_config(&config).await.unwrap();

        let ticket = controller
            .admit(fixtures::user_request("alice", 100.0))
            .await
            .unwrap();
        assert_eq!(ticket.quota().quotas.len(), 4);
        controller.settle(ticket, 80.0).await.unwrap();
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = Config::from_yaml_str(EXAMPLE).unwrap();

        assert_eq!(config.storage().backend, StorageBackend::Memory);
        assert_eq!(config.failure_policy(), FailurePolicy::FailClosed);
        assert_eq!(config.rate_limit().rules.len(), 3);
        assert_eq!(config.rate_limit().rules[1].limit_for("batch-service"), 200.0);
        assert_eq!(config.quota().thresholds_for(Scope::Group), (70.0, 95.0));

        let batch = config.quota().limits_for(Scope::User, "batch-service").unwrap();
        assert!(batch.contains_key(&QuotaType::Tokens));
        assert!(!batch.contains_key(&QuotaType::Cost));
    }

    #[test]
    fn test_yaml_round_trip_preserves_rules() {
        let config = fixtures::team_config();
        let reparsed = Config::from_yaml_str(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(reparsed.rate_limit().rules, config.rate_limit().rules);
        assert_eq!(reparsed.quota().hierarchy.user_groups.len(), 2);
    }

    // ==================== Validation ====================

    fn assert_config_error(yaml: &str, needle: &str) {
        match Config::from_yaml_str(yaml) {
            Err(AdmissionError::Config(message)) => assert!(
                message.contains(needle),
                "expected '{}' in '{}'",
                needle,
                message
            ),
            other => panic!("Expected a configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        assert_config_error(
            r#"
quota:
  warn_threshold: 90
  alert_threshold: 80
"#,
            "threshold",
        );
    }

    #[test]
    fn test_duplicate_rule_names_rejected() {
        assert_config_error(
            r#"
rate_limit:
  rules:
    - { name: twice, scope: user, limit: 1 }
    - { name: twice, scope: global, limit: 1 }
"#,
            "twice",
        );
    }

    #[test]
    fn test_zero_window_rejected() {
        assert_config_error(
            r#"
rate_limit:
  rules:
    - { name: instant, scope: user, limit: 5, window_secs: 0 }
"#,
            "instant",
        );
    }

    #[test]
    fn test_malformed_yaml_rejected() {
        assert!(Config::from_yaml_str("rate_limit: [unclosed").is_err());
    }

    #[test]
    fn test_fail_open_must_be_explicit() {
        assert_eq!(Config::default().failure_policy(), FailurePolicy::FailClosed);

        let config = Config::from_yaml_str("failure_policy: fail_open").unwrap();
        assert_eq!(config.failure_policy(), FailurePolicy::FailOpen);
    }

    // ==================== Store Construction ====================

    #[cfg(feature = "redis")]
    #[tokio::test]
    async fn test_unreachable_redis_fails_construction() {
        let config = Config::from_yaml_str(
            r#"
storage:
  backend: redis
  redis:
    url: redis://127.0.0.1:1
    connection_timeout: 1
"#,
        )
        .unwrap();

        let err = AdmissionController::from_config(&config).await.unwrap_err();
        assert!(err.is_state_store_unavailable(), "unexpected error: {}", err);
    }
}
