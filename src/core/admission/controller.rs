//! Combined rate and quota admission

use super::ticket::{AdmissionTicket, ReleaseGuard};
use super::types::{AdmissionRequest, AdmissionStats, AtomicAdmissionStats};
use crate::config::{Config, FailurePolicy};
use crate::core::clock::{Clock, SystemClock};
use crate::core::notifications::NotificationSink;
use crate::core::quota::{QuotaManager, QuotaSnapshot};
use crate::core::rate_limiter::{RateLimitDecision, RateLimiter};
use crate::core::scope::{Scope, ScopeRef};
use crate::storage::{AtomicUpdater, StateStore, build_state_store};
use crate::utils::error::{AdmissionError, Result, validate_cost};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Entry point for metered calls: admit, then settle or cancel
#[derive(Debug, Clone)]
pub struct AdmissionController {
    rate_limiter: RateLimiter,
    quota: QuotaManager,
    clock: Arc<dyn Clock>,
    failure_policy: FailurePolicy,
    stats: Arc<AtomicAdmissionStats>,
}

impl AdmissionController {
    pub fn new(
        rate_limiter: RateLimiter,
        quota: QuotaManager,
        clock: Arc<dyn Clock>,
        failure_policy: FailurePolicy,
    ) -> Self {
        if failure_policy == FailurePolicy::FailOpen {
            warn!("Admission runs fail-open: requests are admitted unmetered while the state store is down");
        }

        Self {
            rate_limiter,
            quota,
            clock,
            failure_policy,
            stats: Arc::new(AtomicAdmissionStats::default()),
        }
    }

    /// Build the configured state store and every component on top of it
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = build_state_store(config.storage()).await?;
        Ok(Self::with_store(config, store, Arc::new(SystemClock::new())))
    }

    /// Build the components over an existing store; limiters and quotas
    /// share one updater so local callers serialize on the same key locks
    pub fn with_store(config: &Config, store: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> Self {
        info!(
            "Initializing admission controller on '{}' store ({} rate limit rules)",
            store.name(),
            config.rate_limit().rules.len()
        );

        let updater = Arc::new(AtomicUpdater::new(store, config.storage().cas_max_retries));
        let rate_limiter =
            RateLimiter::new(config.rate_limit().clone(), updater.clone(), clock.clone());
        let quota = QuotaManager::from_config(config.quota().clone(), updater, clock.clone());

        Self::new(rate_limiter, quota, clock, config.failure_policy())
    }

    /// Deliver quota threshold notifications to `notifier`
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.quota = self.quota.with_notifier(notifier);
        self
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn quota(&self) -> &QuotaManager {
        &self.quota
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    pub fn stats(&self) -> AdmissionStats {
        self.stats.snapshot()
    }

    /// Run a request through every rate limiter of its scope chain and
    /// reserve its estimated cost on every quota of the chain.
    ///
    /// Denials come back as `RateLimitExceeded` or `QuotaExceeded`; nothing
    /// is left consumed or reserved when a request is denied.
    pub async fn admit(&self, request: AdmissionRequest) -> Result<AdmissionTicket> {
        match self.try_admit(&request).await {
            Ok(ticket) => {
                AtomicAdmissionStats::bump(&self.stats.admitted);
                debug!(
                    "Admitted {}:{} to {} (ticket {}, reserved {})",
                    request.scope,
                    request.identifier,
                    request.provider,
                    ticket.id(),
                    ticket.reserved_cost()
                );
                Ok(ticket)
            }
            Err(e) if e.is_denial() => {
                let counter = match &e {
                    AdmissionError::RateLimitExceeded { .. } => &self.stats.rate_limited,
                    _ => &self.stats.quota_denied,
                };
                AtomicAdmissionStats::bump(counter);
                warn!(
                    "Denied {}:{} to {}: {}",
                    request.scope, request.identifier, request.provider, e
                );
                Err(e)
            }
            Err(e) if e.is_state_store_unavailable() => {
                AtomicAdmissionStats::bump(&self.stats.store_failures);
                match self.failure_policy {
                    FailurePolicy::FailClosed => {
                        error!(
                            "State store unavailable, denying {}:{}: {}",
                            request.scope, request.identifier, e
                        );
                        Err(e)
                    }
                    FailurePolicy::FailOpen => {
                        error!(
                            "State store unavailable, admitting {}:{} to {} UNMETERED (fail-open): {}",
                            request.scope, request.identifier, request.provider, e
                        );
                        AtomicAdmissionStats::bump(&self.stats.fail_open_admissions);
                        AtomicAdmissionStats::bump(&self.stats.admitted);
                        Ok(AdmissionTicket::degraded(request, self.clock.now_utc()))
                    }
                }
            }
            Err(e) => {
                AtomicAdmissionStats::bump(&self.stats.errors);
                warn!(
                    "Admission of {}:{} failed: {}",
                    request.scope, request.identifier, e
                );
                Err(e)
            }
        }
    }

    async fn try_admit(&self, request: &AdmissionRequest) -> Result<AdmissionTicket> {
        validate_cost(request.estimated_cost, "estimated cost")?;
        validate_cost(request.rate_cost, "rate cost")?;

        let rate_limit = self.check_rate_limits(request).await?;

        let quota = match self
            .quota
            .check_quota(
                request.scope,
                &request.identifier,
                request.quota_type,
                request.estimated_cost,
                true,
            )
            .await
        {
            Ok(quota) => quota,
            Err(e) => {
                self.rate_limiter.refund(&rate_limit.grants).await;
                return Err(e);
            }
        };

        let guard = ReleaseGuard {
            quota: self.quota.clone(),
            stats: self.stats.clone(),
        };
        Ok(AdmissionTicket::granted(
            request.clone(),
            rate_limit,
            quota,
            self.clock.now_utc(),
            guard,
        ))
    }

    /// Check the rate limiters of every scope in the chain, broadest first.
    /// The first denial refunds what earlier scopes granted.
    async fn check_rate_limits(&self, request: &AdmissionRequest) -> Result<RateLimitDecision> {
        let mut decision = RateLimitDecision::default();
        if !self.rate_limiter.is_enabled() {
            return Ok(decision);
        }

        for member in self.scope_chain(request.scope, &request.identifier).await? {
            match self
                .rate_limiter
                .check_limit(
                    member.scope,
                    &member.scope_id,
                    &request.provider,
                    request.rate_cost,
                )
                .await
            {
                Ok(granted) => decision.merge(granted),
                Err(e) => {
                    self.rate_limiter.refund(&decision.grants).await;
                    return Err(e);
                }
            }
        }

        Ok(decision)
    }

    /// The request's own scope and every ancestor, global first
    async fn scope_chain(&self, scope: Scope, identifier: &str) -> Result<Vec<ScopeRef>> {
        let direct = if scope == Scope::Global {
            ScopeRef::global()
        } else {
            ScopeRef::new(scope, identifier)
        };

        let mut chain = self.quota.hierarchy().ancestors(scope, &direct.scope_id).await?;
        chain.push(direct);
        chain.sort_by_key(|member| member.scope.check_rank());
        chain.dedup();
        Ok(chain)
    }

    /// Book the actual cost of an admitted call and retire its reservation.
    ///
    /// Usage beyond the limit is still booked. Returns the quota states
    /// after booking. Quotas the booking could not reach keep the
    /// reservation, which the dropped ticket then releases in the
    /// background.
    pub async fn settle(
        &self,
        mut ticket: AdmissionTicket,
        actual_cost: f64,
    ) -> Result<Vec<QuotaSnapshot>> {
        validate_cost(actual_cost, "actual cost")?;
        ticket.mark_handled();

        let request = ticket.request();
        let only = ticket.checked_quotas();
        let booking = match self
            .quota
            .consume_quota_on(
                request.scope,
                &request.identifier,
                request.quota_type,
                actual_cost,
                ticket.reserved_cost(),
                only.as_deref(),
            )
            .await
        {
            Ok(booking) => booking,
            Err(e) => {
                return self
                    .tolerate_store_failure(e, &ticket, "settle")
                    .map(|()| Vec::new());
            }
        };

        ticket.retain_pending(&booking.failed);
        match booking.error {
            None => {
                AtomicAdmissionStats::bump(&self.stats.settled);
                debug!(
                    "Settled ticket {} with cost {} (estimated {})",
                    ticket.id(),
                    actual_cost,
                    ticket.request().estimated_cost
                );
                Ok(booking.snapshots)
            }
            Some(e) => self
                .tolerate_store_failure(e, &ticket, "settle")
                .map(|()| booking.snapshots),
        }
    }

    /// Return the reservation of a call that did not go through. Rate
    /// limiter consumption stands.
    pub async fn cancel(&self, mut ticket: AdmissionTicket) -> Result<()> {
        ticket.mark_handled();

        let request = ticket.request();
        let pending = ticket.pending_quotas().to_vec();
        let booking = match self
            .quota
            .release_quota_on(
                request.scope,
                &request.identifier,
                request.quota_type,
                ticket.reserved_cost(),
                Some(&pending),
            )
            .await
        {
            Ok(booking) => booking,
            Err(e) => return self.tolerate_store_failure(e, &ticket, "cancel"),
        };

        ticket.retain_pending(&booking.failed);
        match booking.error {
            None => {
                AtomicAdmissionStats::bump(&self.stats.cancelled);
                debug!("Cancelled ticket {}", ticket.id());
                Ok(())
            }
            Some(e) => self.tolerate_store_failure(e, &ticket, "cancel"),
        }
    }

    /// Under fail-open a store outage after admission only loses metering
    fn tolerate_store_failure(
        &self,
        e: AdmissionError,
        ticket: &AdmissionTicket,
        operation: &str,
    ) -> Result<()> {
        if e.is_state_store_unavailable() {
            AtomicAdmissionStats::bump(&self.stats.store_failures);
            if self.failure_policy == FailurePolicy::FailOpen {
                error!(
                    "State store unavailable during {} of ticket {}, usage is NOT metered (fail-open): {}",
                    operation,
                    ticket.id(),
                    e
                );
                return Ok(());
            }
        }

        warn!("Failed to {} ticket {}: {}", operation, ticket.id(), e);
        Err(e)
    }
}
