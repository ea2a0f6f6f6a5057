//! Supervisory endpoints: `/__health`, `/__gtg` and `/__build-info`.

use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use metric_aggregator::HealthProbe;
use serde::Serialize;
use tokio::task::JoinSet;

const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Static description of one health check.
#[derive(Clone)]
pub(crate) struct Check {
    pub id: &'static str,
    pub name: &'static str,
    pub business_impact: &'static str,
    pub technical_summary: &'static str,
    pub panic_guide: &'static str,
    pub severity: u8,
    pub probe: HealthProbe,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CheckResult {
    pub id: &'static str,
    pub name: &'static str,
    pub ok: bool,
    pub severity: u8,
    pub business_impact: &'static str,
    pub technical_summary: &'static str,
    pub panic_guide: &'static str,
    pub check_output: String,
    pub last_updated: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HealthReport {
    pub schema_version: u8,
    pub system_code: String,
    pub name: String,
    pub description: String,
    pub checks: Vec<CheckResult>,
    pub ok: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GtgStatus {
    pub good_to_go: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BuildInfo {
    pub version: &'static str,
    pub repository: &'static str,
    pub revision: &'static str,
    pub builder: &'static str,
    pub date_time: &'static str,
}

pub(crate) fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        repository: env!("CARGO_PKG_REPOSITORY"),
        revision: option_env!("BUILD_REVISION").unwrap_or("unknown"),
        builder: option_env!("BUILD_BUILDER").unwrap_or("cargo"),
        date_time: option_env!("BUILD_DATETIME").unwrap_or("unknown"),
    }
}

pub(crate) struct HealthService {
    system_code: String,
    name: String,
    description: String,
    checks: Vec<Check>,
    check_timeout: Duration,
}

impl HealthService {
    pub fn new(system_code: &str, name: &str, description: &str, probe: HealthProbe) -> Self {
        Self {
            system_code: system_code.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            checks: vec![neo4j_check(probe)],
            check_timeout: CHECK_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    pub async fn report(&self) -> HealthReport {
        let mut checks = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            let outcome = run_check(&check.probe, self.check_timeout).await;
            let (ok, output) = match outcome {
                Ok(message) => (true, message),
                Err(failure) => (false, failure.output),
            };
            checks.push(CheckResult {
                id: check.id,
                name: check.name,
                ok,
                severity: check.severity,
                business_impact: check.business_impact,
                technical_summary: check.technical_summary,
                panic_guide: check.panic_guide,
                check_output: output,
                last_updated: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            });
        }

        HealthReport {
            schema_version: 1,
            system_code: self.system_code.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            ok: checks.iter().all(|c| c.ok),
            checks,
        }
    }

    /// Runs all checks concurrently and stops at the first failure, whose
    /// bare error text becomes the message.
    pub async fn gtg(&self) -> GtgStatus {
        let mut set = JoinSet::new();
        for check in &self.checks {
            let probe = check.probe.clone();
            let timeout = self.check_timeout;
            set.spawn(async move { run_check(&probe, timeout).await });
        }

        while let Some(joined) = set.join_next().await {
            let cause = match joined {
                Ok(Ok(_)) => continue,
                Ok(Err(failure)) => failure.cause,
                Err(e) => format!("health check task failed: {e}"),
            };
            set.abort_all();
            return GtgStatus {
                good_to_go: false,
                message: cause,
            };
        }

        GtgStatus {
            good_to_go: true,
            message: "OK".to_string(),
        }
    }
}

fn neo4j_check(probe: HealthProbe) -> Check {
    Check {
        id: "check-neo4j-health",
        name: "Check Neo4J Health",
        business_impact: "No immediate business impact. Concept search may provide reduced quality results.",
        technical_summary: "App cannot compute concept metrics from Neo4j",
        panic_guide: "https://runbooks.in.ft.com/neo4j-metric-aggregator",
        severity: 1,
        probe,
    }
}

/// A failed check: `output` is the health report text, `cause` the bare error.
struct CheckFailure {
    output: String,
    cause: String,
}

async fn run_check(probe: &HealthProbe, timeout: Duration) -> Result<String, CheckFailure> {
    match tokio::time::timeout(timeout, probe.check()).await {
        Ok(Ok(message)) => Ok(message),
        Ok(Err(failure)) => Err(CheckFailure {
            cause: failure.error.to_string(),
            output: failure.message,
        }),
        Err(_) => {
            let message = format!("health check timed out after {timeout:?}");
            Err(CheckFailure {
                output: message.clone(),
                cause: message,
            })
        }
    }
}
