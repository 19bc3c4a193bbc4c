//! Admission tickets
//!
//! A ticket is proof that a request passed every rate limiter and quota in
//! its chain. It owns the quota reservation taken for the estimate until the
//! caller settles or cancels it. A ticket dropped while still holding a
//! reservation releases it in the background, including the quotas a failed
//! settle or cancel could not reach.

use super::types::{AdmissionRequest, AtomicAdmissionStats};
use crate::core::quota::{QuotaCheck, QuotaKey, QuotaManager};
use crate::core::rate_limiter::RateLimitDecision;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// What a dropped ticket needs to return its reservation
#[derive(Debug)]
pub(super) struct ReleaseGuard {
    pub(super) quota: QuotaManager,
    pub(super) stats: Arc<AtomicAdmissionStats>,
}

/// A granted admission
#[derive(Debug)]
#[must_use = "settle or cancel the ticket to book or return its reservation"]
pub struct AdmissionTicket {
    id: Uuid,
    request: AdmissionRequest,
    rate_limit: RateLimitDecision,
    quota: QuotaCheck,
    degraded: bool,
    issued_at: DateTime<Utc>,
    /// Quotas still holding this ticket's reservation
    pending: Vec<QuotaKey>,
    /// Whether a settle or cancel was attempted
    handled: bool,
    guard: Option<ReleaseGuard>,
}

impl AdmissionTicket {
    pub(super) fn granted(
        request: AdmissionRequest,
        rate_limit: RateLimitDecision,
        quota: QuotaCheck,
        issued_at: DateTime<Utc>,
        guard: ReleaseGuard,
    ) -> Self {
        let guard = quota.reserved.then_some(guard);
        let pending = if quota.reserved {
            quota.quotas.iter().map(|q| q.key()).collect()
        } else {
            Vec::new()
        };
        Self {
            id: Uuid::new_v4(),
            request,
            rate_limit,
            quota,
            degraded: false,
            issued_at,
            pending,
            handled: false,
            guard,
        }
    }

    /// Ticket for a request let through because the state store failed
    /// under a fail-open policy; nothing was consumed or reserved
    pub(super) fn degraded(request: AdmissionRequest, issued_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            rate_limit: RateLimitDecision::default(),
            quota: QuotaCheck::default(),
            degraded: true,
            issued_at,
            pending: Vec::new(),
            handled: false,
            guard: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request(&self) -> &AdmissionRequest {
        &self.request
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Whether the ticket was issued without any check under fail-open
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Rate limiter results, broadest scope first
    pub fn rate_limit(&self) -> &RateLimitDecision {
        &self.rate_limit
    }

    /// Quotas the estimate was checked against
    pub fn quota(&self) -> &QuotaCheck {
        &self.quota
    }

    /// Cost currently held as a reservation
    pub fn reserved_cost(&self) -> f64 {
        if self.quota.reserved {
            self.quota.cost
        } else {
            0.0
        }
    }

    /// Least quota headroom left after this admission
    pub fn remaining_quota(&self) -> Option<f64> {
        self.quota.tightest().map(|q| q.remaining)
    }

    /// Quotas to book a settle against; `None` books the whole chain
    pub(super) fn checked_quotas(&self) -> Option<Vec<QuotaKey>> {
        (!self.degraded).then(|| self.quota.quotas.iter().map(|q| q.key()).collect())
    }

    /// Quotas still holding this ticket's reservation
    pub fn pending_quotas(&self) -> &[QuotaKey] {
        &self.pending
    }

    pub(super) fn mark_handled(&mut self) {
        self.handled = true;
    }

    /// Keep the reservation only on the quotas in `failed`; the ticket is
    /// disarmed once no quota holds it
    pub(super) fn retain_pending(&mut self, failed: &[QuotaKey]) {
        self.pending.retain(|key| failed.contains(key));
        if self.pending.is_empty() {
            self.guard = None;
        }
    }
}

impl Drop for AdmissionTicket {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };

        let request = self.request.clone();
        let cost = self.reserved_cost();
        let pending = std::mem::take(&mut self.pending);
        if self.handled {
            warn!(
                "Ticket {} for {}:{} still holds a reservation of {} on {} quotas; releasing",
                self.id,
                request.scope,
                request.identifier,
                cost,
                pending.len()
            );
        } else {
            AtomicAdmissionStats::bump(&guard.stats.abandoned);
            warn!(
                "Admission ticket {} for {}:{} dropped without settle or cancel; releasing reservation of {}",
                self.id, request.scope, request.identifier, cost
            );
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let id = self.id;
                handle.spawn(async move {
                    let released = guard
                        .quota
                        .release_quota_on(
                            request.scope,
                            &request.identifier,
                            request.quota_type,
                            cost,
                            Some(&pending),
                        )
                        .await
                        .and_then(|booking| booking.into_result());
                    match released {
                        Ok(_) => debug!("Released reservation of ticket {}", id),
                        Err(e) => warn!(
                            "Failed to release reservation of ticket {}: {}; it holds until the period rolls over or the quota is reset",
                            id, e
                        ),
                    }
                });
            }
            Err(_) => warn!(
                "No async runtime to release ticket {}; the reservation holds until the period rolls over or the quota is reset",
                self.id
            ),
        }
    }
}
