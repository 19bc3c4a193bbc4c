//! Test fixtures
//!
//! Configurations are written as YAML so the fixtures exercise the same
//! parsing and validation path as deployments.

use llm_admission::{
    AdmissionController, AdmissionRequest, ChannelNotificationSink, Config, ManualClock,
    MemoryStore, QuotaNotification, QuotaType, StateStore,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// 2023-11-14T22:13:20Z, a Tuesday
pub const T0: f64 = 1_700_000_000.0;

/// A team deployment: per-user token bucket, strict per-provider sliding
/// window, global ceiling; user, group and global token budgets
pub const TEAM_CONFIG: &str = r#"
rate_limit:
  rules:
    - name: global
      scope: global
      limit: 1000
      window_secs: 60
    - name: per-user
      scope: user
      limit: 10
      window_secs: 10
    - name: anthropic-strict
      scope: user
      strategy: sliding_window
      limit: 3
      window_secs: 10
      per_provider: true
      providers: [anthropic]

quota:
  warn_threshold: 80
  alert_threshold: 95
  scopes:
    user:
      default:
        tokens:
          hour: 2000
          day: 10000
      overrides:
        bob:
          tokens:
            day: 100
    group:
      default:
        tokens:
          day: 15000
    global:
      default:
        tokens:
          month: 1000000
  hierarchy:
    user_groups:
      alice: research
      carol: research
    group_sites:
      research: eu

storage:
  backend: memory
"#;

pub fn team_config() -> Config {
    Config::from_yaml_str(TEAM_CONFIG).expect("team fixture is valid")
}

/// Config with only the given YAML rate-limit rules and a generous user
/// quota
pub fn rate_only_config(rules_yaml: &str) -> Config {
    let yaml = format!(
        r#"
rate_limit:
  rules:
{}
quota:
  scopes:
    user:
      default:
        requests:
          day: 1000000
"#,
        rules_yaml
    );
    Config::from_yaml_str(&yaml).expect("rate fixture is valid")
}

pub fn user_request(identifier: &str, tokens: f64) -> AdmissionRequest {
    user_request_to(identifier, "openai", tokens)
}

pub fn user_request_to(identifier: &str, provider: &str, tokens: f64) -> AdmissionRequest {
    AdmissionRequest::user(identifier, provider, QuotaType::Tokens, tokens)
}

/// Controller on a fresh in-memory store and a manual clock at [`T0`]
pub struct Harness {
    pub controller: AdmissionController,
    pub clock: Arc<ManualClock>,
    pub store: Arc<dyn StateStore>,
    pub notifications: UnboundedReceiver<QuotaNotification>,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(config: Config, store: Arc<dyn StateStore>) -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let (sink, notifications) = ChannelNotificationSink::new();
        let controller = AdmissionController::with_store(&config, store.clone(), clock.clone())
            .with_notifier(Arc::new(sink));
        Self {
            controller,
            clock,
            store,
            notifications,
        }
    }

    /// Admit and immediately settle at the estimate
    pub async fn call(&self, request: AdmissionRequest) -> llm_admission::Result<()> {
        let cost = request.estimated_cost;
        let ticket = self.controller.admit(request).await?;
        self.controller.settle(ticket, cost).await?;
        Ok(())
    }

    /// Drain notifications received so far
    pub fn drain_notifications(&mut self) -> Vec<QuotaNotification> {
        let mut received = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            received.push(notification);
        }
        received
    }
}
