use std::collections::HashSet;

pub use starchart_core::mode::ExecutionMode;

use crate::config::{Environment, OrchestratorConfig};

const DEMO_SESSION_PREFIX: &str = "demo_";

/// Decides the execution mode of a request from its session id.
#[derive(Debug, Clone, Default)]
pub struct ModeResolver {
    environment: Environment,
    test_sessions: HashSet<String>,
}

impl ModeResolver {
    pub fn new(environment: Environment, test_sessions: HashSet<String>) -> Self {
        Self {
            environment,
            test_sessions,
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config.environment, config.test_session_ids.clone())
    }

    pub fn resolve(&self, session_id: Option<&str>) -> ExecutionMode {
        let Some(session_id) = session_id.map(str::trim).filter(|s| !s.is_empty()) else {
            return ExecutionMode::Production;
        };
        if self.test_sessions.contains(session_id) {
            ExecutionMode::TestBypass
        } else if !self.environment.is_production() && session_id.starts_with(DEMO_SESSION_PREFIX) {
            ExecutionMode::Demo
        } else {
            ExecutionMode::Production
        }
    }
}
