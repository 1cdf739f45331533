use serde::{Deserialize, Serialize};

/// How a single request is allowed to behave. Resolved once at request entry
/// and passed down; nothing below the entry point inspects session ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    #[default]
    Production,
    /// Non-production demo sessions: real generation, no payment.
    Demo,
    /// Designated test identities: no payment, may bypass the report cache.
    TestBypass,
}

impl ExecutionMode {
    pub fn bypasses_payment(&self) -> bool {
        matches!(self, ExecutionMode::Demo | ExecutionMode::TestBypass)
    }

    pub fn may_bypass_cache(&self) -> bool {
        matches!(self, ExecutionMode::TestBypass)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Production => "production",
            ExecutionMode::Demo => "demo",
            ExecutionMode::TestBypass => "test_bypass",
        }
    }
}
