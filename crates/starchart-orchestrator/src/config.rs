use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Production,
    Development,
    Test,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
            Environment::Test => "test",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            other => Err(format!("unknown environment {other:?}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub environment: Environment,
    /// Session ids that get `ExecutionMode::TestBypass`.
    pub test_session_ids: HashSet<String>,
    pub heartbeat_interval: Duration,
    /// Outer bound on the detached capture-or-release task.
    pub capture_task_timeout: Duration,
    pub worker_trigger_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            test_session_ids: HashSet::new(),
            heartbeat_interval: Duration::from_secs(18),
            capture_task_timeout: Duration::from_secs(30),
            worker_trigger_timeout: Duration::from_secs(5),
        }
    }
}
