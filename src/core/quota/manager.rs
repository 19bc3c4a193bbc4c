//! Hierarchical quota manager

use super::provider::{QuotaConfigProvider, ScopeHierarchy, StaticQuotaConfig};
use super::types::{QuotaBooking, QuotaCheck, QuotaKey, QuotaSnapshot, QuotaState};
use crate::config::models::quota::QuotaConfig;
use crate::core::clock::{Clock, seconds_to_utc};
use crate::core::notifications::{
    LoggingNotificationSink, NotificationLevel, NotificationSink, QuotaNotification,
};
use crate::core::scope::{GLOBAL_SCOPE_ID, QuotaPeriod, QuotaType, Scope, ScopeRef};
use crate::storage::{AtomicUpdater, Unreadable, Update};
use crate::utils::error::{AdmissionError, Result, validate_cost};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extra lifetime of quota state past its period end; an expired state reads
/// back exactly like a rolled-over one
const STATE_TTL_GRACE_SECS: u64 = 3600;

/// One quota of a resolved chain with its current configuration
#[derive(Debug, Clone)]
pub(super) struct ResolvedQuota {
    pub(super) key: QuotaKey,
    pub(super) limit: f64,
    pub(super) warn_threshold: f64,
    pub(super) alert_threshold: f64,
}

/// Budgets per scope × metric × period with reserve/consume/release
#[derive(Debug, Clone)]
pub struct QuotaManager {
    enabled: bool,
    limits: Arc<dyn QuotaConfigProvider>,
    hierarchy: Arc<dyn ScopeHierarchy>,
    updater: Arc<AtomicUpdater>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn NotificationSink>,
}

impl QuotaManager {
    pub fn new(
        limits: Arc<dyn QuotaConfigProvider>,
        hierarchy: Arc<dyn ScopeHierarchy>,
        updater: Arc<AtomicUpdater>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            enabled: true,
            limits,
            hierarchy,
            updater,
            clock,
            notifier: Arc::new(LoggingNotificationSink),
        }
    }

    /// Serve limits and hierarchy from configuration
    pub fn from_config(
        config: QuotaConfig,
        updater: Arc<AtomicUpdater>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let enabled = config.enabled;
        let provider = Arc::new(StaticQuotaConfig::new(config));
        let mut manager = Self::new(provider.clone(), provider, updater, clock);
        manager.enabled = enabled;
        manager
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Scope hierarchy used to build quota chains
    pub fn hierarchy(&self) -> &Arc<dyn ScopeHierarchy> {
        &self.hierarchy
    }

    /// Check `cost` against every quota in the scope chain.
    ///
    /// The first quota without headroom fails the check with
    /// `QuotaExceeded`. With `reserve`, `cost` is added to `reserved` on
    /// every quota of the chain, or on none of them if any check fails.
    pub async fn check_quota(
        &self,
        scope: Scope,
        scope_id: &str,
        quota_type: QuotaType,
        cost: f64,
        reserve: bool,
    ) -> Result<QuotaCheck> {
        validate_cost(cost, "quota cost")?;
        if !self.enabled {
            return Ok(QuotaCheck::default());
        }

        let chain = self.resolve_chain(scope, scope_id, quota_type).await?;
        let now = self.clock.now();
        let reserve = reserve && cost > 0.0;

        let mut reserved: Vec<&ResolvedQuota> = Vec::new();
        let mut passed: Vec<(&ResolvedQuota, QuotaState)> = Vec::with_capacity(chain.len());

        for quota in &chain {
            let outcome = self
                .update_state(&quota.key, |state| {
                    let mut state = current_state(state, quota, now)?;
                    if !state.admits(cost) {
                        return Ok(Update::Keep(Err(state)));
                    }
                    if reserve {
                        state.reserved += cost;
                        Ok(Update::Write(state.clone(), Ok(state)))
                    } else {
                        Ok(Update::Keep(Ok(state)))
                    }
                })
                .await;

            match outcome {
                Ok(Ok(state)) => {
                    if reserve {
                        reserved.push(quota);
                    }
                    passed.push((quota, state));
                }
                Ok(Err(state)) => {
                    debug!(
                        "Quota exceeded for {}: used {} + reserved {} + cost {} > limit {}",
                        quota.key, state.used, state.reserved, cost, state.limit
                    );
                    self.roll_back(&reserved, cost).await;
                    return Err(state.exceeded_error(&quota.key));
                }
                Err(e) => {
                    self.roll_back(&reserved, cost).await;
                    return Err(e);
                }
            }
        }

        let mut quotas = Vec::with_capacity(passed.len());
        for (quota, state) in passed {
            self.notify_thresholds(quota, &state, now).await;
            quotas.push(state.snapshot(&quota.key));
        }

        Ok(QuotaCheck {
            reserved: reserve,
            cost,
            quotas,
        })
    }

    /// Book actual usage and retire the matching reservation on every quota
    /// in the chain.
    ///
    /// Usage is booked even when it exceeds the limit; the next check is then
    /// denied. Every quota is attempted and the first failure is returned.
    pub async fn consume_quota(
        &self,
        scope: Scope,
        scope_id: &str,
        quota_type: QuotaType,
        actual_cost: f64,
        reserved_cost: f64,
    ) -> Result<Vec<QuotaSnapshot>> {
        self.consume_quota_on(scope, scope_id, quota_type, actual_cost, reserved_cost, None)
            .await?
            .into_result()
    }

    /// [`consume_quota`](Self::consume_quota) restricted to the chain quotas
    /// in `only`, reporting per quota which updates failed
    pub async fn consume_quota_on(
        &self,
        scope: Scope,
        scope_id: &str,
        quota_type: QuotaType,
        actual_cost: f64,
        reserved_cost: f64,
        only: Option<&[QuotaKey]>,
    ) -> Result<QuotaBooking> {
        validate_cost(actual_cost, "actual cost")?;
        validate_cost(reserved_cost, "reserved cost")?;
        if !self.enabled {
            return Ok(QuotaBooking::default());
        }

        let chain = self.resolve_subchain(scope, scope_id, quota_type, only).await?;
        let now = self.clock.now();
        let mut booking = QuotaBooking::default();

        for quota in &chain {
            let result = self
                .update_state(&quota.key, |state| {
                    let mut state = current_state(state, quota, now)?;
                    state.consume(actual_cost, reserved_cost);
                    let snapshot = state.snapshot(&quota.key);
                    Ok(Update::Write(state, snapshot))
                })
                .await;

            match result {
                Ok(snapshot) => {
                    if snapshot.is_exceeded {
                        info!(
                            "Quota {} is exhausted: used {} of {}",
                            quota.key, snapshot.used, snapshot.limit
                        );
                    }
                    booking.snapshots.push(snapshot);
                }
                Err(e) => {
                    warn!("Failed to consume quota {}: {}", quota.key, e);
                    booking.failed.push(quota.key.clone());
                    booking.error.get_or_insert(e);
                }
            }
        }

        Ok(booking)
    }

    /// Return an unused reservation on every quota in the chain
    pub async fn release_quota(
        &self,
        scope: Scope,
        scope_id: &str,
        quota_type: QuotaType,
        reserved_cost: f64,
    ) -> Result<()> {
        self.release_quota_on(scope, scope_id, quota_type, reserved_cost, None)
            .await?
            .into_result()
            .map(|_| ())
    }

    /// [`release_quota`](Self::release_quota) restricted to the chain quotas
    /// in `only`, reporting per quota which releases failed
    pub async fn release_quota_on(
        &self,
        scope: Scope,
        scope_id: &str,
        quota_type: QuotaType,
        reserved_cost: f64,
        only: Option<&[QuotaKey]>,
    ) -> Result<QuotaBooking> {
        validate_cost(reserved_cost, "reserved cost")?;
        if !self.enabled || reserved_cost == 0.0 {
            return Ok(QuotaBooking::default());
        }

        let chain = self.resolve_subchain(scope, scope_id, quota_type, only).await?;
        let mut booking = QuotaBooking::default();
        for quota in &chain {
            if let Err(e) = self.release_one(quota, reserved_cost).await {
                warn!("Failed to release reservation on {}: {}", quota.key, e);
                booking.failed.push(quota.key.clone());
                booking.error.get_or_insert(e);
            }
        }

        Ok(booking)
    }

    /// Current state of every quota in the chain, with rollover applied to
    /// the view only
    pub async fn quota_status(
        &self,
        scope: Scope,
        scope_id: &str,
        quota_type: QuotaType,
    ) -> Result<Vec<QuotaSnapshot>> {
        if !self.enabled {
            return Ok(Vec::new());
        }

        let chain = self.resolve_chain(scope, scope_id, quota_type).await?;
        let now = self.clock.now();
        let mut snapshots = Vec::with_capacity(chain.len());

        for quota in &chain {
            let stored = self
                .updater
                .load_with::<QuotaState>(&quota.key.storage_key(), Unreadable::Fail)
                .await?;
            let state = current_state(stored, quota, now)?;
            snapshots.push(state.snapshot(&quota.key));
        }

        Ok(snapshots)
    }

    /// Clear `used` and `reserved` of one scope member's quotas.
    ///
    /// Only the named member is touched, not its ancestors. The stored state
    /// is dropped and recreated on the next check, which also recovers state
    /// that no longer decodes. This is how reservations leaked by crashed
    /// callers are reclaimed before their period ends.
    pub async fn reset_quota(
        &self,
        scope: Scope,
        scope_id: &str,
        quota_type: QuotaType,
        period: Option<QuotaPeriod>,
    ) -> Result<()> {
        let scope_id = normalize_scope_id(scope, scope_id);

        for candidate in QuotaPeriod::ALL {
            if period.is_some_and(|p| p != candidate) {
                continue;
            }
            let key = QuotaKey::new(scope, scope_id, quota_type, candidate);
            self.updater.remove(&key.storage_key()).await?;
        }

        info!("Reset {} quotas for {}:{}", quota_type, scope, scope_id);
        Ok(())
    }

    /// The direct scope's quotas followed by those of its ancestors.
    ///
    /// The direct scope must have limits for `quota_type`; ancestors
    /// without any are skipped.
    pub(super) async fn resolve_chain(
        &self,
        scope: Scope,
        scope_id: &str,
        quota_type: QuotaType,
    ) -> Result<Vec<ResolvedQuota>> {
        let direct = ScopeRef::new(scope, normalize_scope_id(scope, scope_id));

        let mut chain = Vec::new();
        let found = self.push_scope_quotas(&direct, quota_type, &mut chain).await?;
        if !found {
            return Err(AdmissionError::config(format!(
                "no {} quota configured for {}",
                quota_type, direct
            )));
        }

        for ancestor in self.hierarchy.ancestors(scope, &direct.scope_id).await? {
            self.push_scope_quotas(&ancestor, quota_type, &mut chain)
                .await?;
        }

        Ok(chain)
    }

    /// [`resolve_chain`](Self::resolve_chain) narrowed to `only`
    async fn resolve_subchain(
        &self,
        scope: Scope,
        scope_id: &str,
        quota_type: QuotaType,
        only: Option<&[QuotaKey]>,
    ) -> Result<Vec<ResolvedQuota>> {
        let mut chain = self.resolve_chain(scope, scope_id, quota_type).await?;
        if let Some(keys) = only {
            chain.retain(|quota| keys.contains(&quota.key));
        }
        Ok(chain)
    }

    async fn push_scope_quotas(
        &self,
        member: &ScopeRef,
        quota_type: QuotaType,
        chain: &mut Vec<ResolvedQuota>,
    ) -> Result<bool> {
        let Some(scope_limits) = self.limits.get_limits(member.scope, &member.scope_id).await?
        else {
            return Ok(false);
        };
        let Some(periods) = scope_limits.limits.get(&quota_type) else {
            return Ok(false);
        };

        let mut periods: Vec<_> = periods.iter().map(|(p, l)| (*p, *l)).collect();
        periods.sort_by_key(|(period, _)| *period);

        for (period, limit) in periods {
            chain.push(ResolvedQuota {
                key: QuotaKey::new(member.scope, member.scope_id.clone(), quota_type, period),
                limit,
                warn_threshold: scope_limits.warn_threshold,
                alert_threshold: scope_limits.alert_threshold,
            });
        }
        Ok(true)
    }

    async fn release_one(&self, quota: &ResolvedQuota, cost: f64) -> Result<()> {
        let now = self.clock.now();
        self.update_state(&quota.key, |state| match state {
            None => Ok(Update::Keep(())),
            Some(mut state) => {
                // A rollover already dropped the reservation
                if state.roll_over(quota.key.period, now)? {
                    return Ok(Update::Write(state, ()));
                }
                if state.reserved == 0.0 {
                    return Ok(Update::Keep(()));
                }
                state.release(cost);
                Ok(Update::Write(state, ()))
            }
        })
        .await
    }

    /// Quota state is billed usage: unreadable state fails instead of being
    /// rebuilt empty
    async fn update_state<R, F>(&self, key: &QuotaKey, apply: F) -> Result<R>
    where
        F: FnMut(Option<QuotaState>) -> Result<Update<QuotaState, R>>,
    {
        self.updater
            .update_with(
                &key.storage_key(),
                Some(state_ttl(key.period)),
                Unreadable::Fail,
                apply,
            )
            .await
    }

    async fn roll_back(&self, reserved: &[&ResolvedQuota], cost: f64) {
        for quota in reserved.iter().rev() {
            if let Err(e) = self.release_one(quota, cost).await {
                warn!(
                    "Failed to roll back reservation of {} on {}: {}",
                    cost, quota.key, e
                );
            }
        }
    }

    /// Warning once per period, alert on every check at or above the alert
    /// threshold
    async fn notify_thresholds(&self, quota: &ResolvedQuota, state: &QuotaState, now: f64) {
        let percent = state.usage_percent();

        if percent >= quota.alert_threshold {
            self.send(NotificationLevel::Alert, quota.alert_threshold, quota, state, now);
            return;
        }
        if percent < quota.warn_threshold || !state.warning_pending() {
            return;
        }

        // Claim the warning for this period; only the winner sends it
        let claimed = self
            .update_state(&quota.key, |stored| match stored {
                Some(mut stored)
                    if stored.period_start == state.period_start && stored.warning_pending() =>
                {
                    stored.last_warning_sent = Some(now);
                    Ok(Update::Write(stored, true))
                }
                _ => Ok(Update::Keep(false)),
            })
            .await;

        match claimed {
            Ok(true) => self.send(
                NotificationLevel::Warning,
                quota.warn_threshold,
                quota,
                state,
                now,
            ),
            Ok(false) => {}
            Err(e) => warn!("Failed to record quota warning for {}: {}", quota.key, e),
        }
    }

    fn send(
        &self,
        level: NotificationLevel,
        threshold: f64,
        quota: &ResolvedQuota,
        state: &QuotaState,
        now: f64,
    ) {
        let notification = QuotaNotification {
            level,
            threshold,
            quota: state.snapshot(&quota.key),
            sent_at: seconds_to_utc(now),
        };
        if let Err(e) = self.notifier.notify_quota_warning(notification) {
            warn!("Quota {} notification for {} failed: {}", level, quota.key, e);
        }
    }
}

/// Stored state brought up to date: created if absent, configuration
/// refreshed, and rolled over if its period has ended
fn current_state(state: Option<QuotaState>, quota: &ResolvedQuota, now: f64) -> Result<QuotaState> {
    let mut state = match state {
        Some(state) => state,
        None => QuotaState::new(
            quota.key.period,
            quota.limit,
            quota.warn_threshold,
            quota.alert_threshold,
            now,
        )?,
    };
    state.roll_over(quota.key.period, now)?;
    state.refresh(quota.limit, quota.warn_threshold, quota.alert_threshold);
    Ok(state)
}

fn normalize_scope_id(scope: Scope, scope_id: &str) -> &str {
    if scope == Scope::Global {
        GLOBAL_SCOPE_ID
    } else {
        scope_id
    }
}

/// Longest possible length of the period plus a grace
fn state_ttl(period: QuotaPeriod) -> u64 {
    let longest = match period {
        QuotaPeriod::Hour => 3_600,
        QuotaPeriod::Day => 86_400,
        QuotaPeriod::Week => 7 * 86_400,
        QuotaPeriod::Month => 31 * 86_400,
    };
    longest + STATE_TTL_GRACE_SECS
}
