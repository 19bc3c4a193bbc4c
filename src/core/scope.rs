//! Scope, metric and period vocabulary shared by the rate limiter and the
//! quota manager.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier used for the single global scope
pub const GLOBAL_SCOPE_ID: &str = "global";

/// Hierarchy level a limit or quota applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    User,
    Group,
    Site,
    Global,
}

impl Scope {
    /// All scopes, narrowest first
    pub const ALL: [Scope; 4] = [Scope::User, Scope::Group, Scope::Site, Scope::Global];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::User => "user",
            Scope::Group => "group",
            Scope::Site => "site",
            Scope::Global => "global",
        }
    }

    /// Evaluation order for rate limits: broader scopes are checked first so
    /// systemic overload fails fast.
    pub fn check_rank(&self) -> u8 {
        match self {
            Scope::Global => 0,
            Scope::Site => 1,
            Scope::Group => 2,
            Scope::User => 3,
        }
    }

    /// The next broader scope, if any
    pub fn parent(&self) -> Option<Scope> {
        match self {
            Scope::User => Some(Scope::Group),
            Scope::Group => Some(Scope::Site),
            Scope::Site => Some(Scope::Global),
            Scope::Global => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Scope::User),
            "group" => Ok(Scope::Group),
            "site" => Ok(Scope::Site),
            "global" => Ok(Scope::Global),
            other => Err(format!("unknown scope '{}'", other)),
        }
    }
}

/// A concrete scope instance, e.g. `user:alice`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeRef {
    pub scope: Scope,
    pub scope_id: String,
}

impl ScopeRef {
    pub fn new(scope: Scope, scope_id: impl Into<String>) -> Self {
        Self {
            scope,
            scope_id: scope_id.into(),
        }
    }

    pub fn global() -> Self {
        Self::new(Scope::Global, GLOBAL_SCOPE_ID)
    }
}

impl fmt::Display for ScopeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.scope_id)
    }
}

/// Metric a quota is measured in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaType {
    /// Number of requests
    Requests,
    /// Number of LLM tokens
    Tokens,
    /// Monetary cost
    Cost,
}

impl QuotaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaType::Requests => "requests",
            QuotaType::Tokens => "tokens",
            QuotaType::Cost => "cost",
        }
    }
}

impl fmt::Display for QuotaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuotaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "requests" => Ok(QuotaType::Requests),
            "tokens" => Ok(QuotaType::Tokens),
            "cost" => Ok(QuotaType::Cost),
            other => Err(format!("unknown quota type '{}'", other)),
        }
    }
}

/// Tracking period of a quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaPeriod {
    Hour,
    Day,
    Week,
    Month,
}

impl QuotaPeriod {
    pub const ALL: [QuotaPeriod; 4] = [
        QuotaPeriod::Hour,
        QuotaPeriod::Day,
        QuotaPeriod::Week,
        QuotaPeriod::Month,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaPeriod::Hour => "hour",
            QuotaPeriod::Day => "day",
            QuotaPeriod::Week => "week",
            QuotaPeriod::Month => "month",
        }
    }
}

impl fmt::Display for QuotaPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuotaPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hour" => Ok(QuotaPeriod::Hour),
            "day" => Ok(QuotaPeriod::Day),
            "week" => Ok(QuotaPeriod::Week),
            "month" => Ok(QuotaPeriod::Month),
            other => Err(format!("unknown quota period '{}'", other)),
        }
    }
}
