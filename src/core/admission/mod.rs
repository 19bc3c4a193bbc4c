//! Admission facade
//!
//! Every metered call goes through [`AdmissionController::admit`], which
//! checks the rate limiters of the caller's whole scope chain (global first,
//! so systemic overload fails fast) and then reserves the estimated cost on
//! every quota of the chain. The returned [`AdmissionTicket`] is settled
//! with the actual cost once the call completes, or cancelled if it never
//! happened.

mod controller;
mod ticket;
mod types;


pub use controller::AdmissionController;
pub use ticket::AdmissionTicket;
pub use types::{AdmissionRequest, AdmissionStats, AtomicAdmissionStats};
