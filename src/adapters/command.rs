//! Command hook adapters
//!
//! Operators plug their cloud or database tooling in as executables. The
//! configured argv is run with call-specific arguments appended.
//!
//! | hook        | appended args               | stdout                                      |
//! |-------------|-----------------------------|---------------------------------------------|
//! | probe       | `<address> [check-id]`      | `{"reachable": bool, "replication_lag_secs": n}` |
//! | promote     | `<region> <operation-id>`   | ignored                                     |
//! | status      | `<region>`                  | `{"is_primary": bool, "accepting_writes": bool}` |
//! | set_weight  | `<record> <region> <weight>`| ignored                                     |
//! | get_weight  | `<record> <region>`         | integer, or empty when unset                |
//!
//! Exit 0 is success. Exit 75 (`EX_TEMPFAIL`) and death by signal are
//! retryable. Any other exit status is not.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

use crate::cutover::{RoutingControl, RoutingError};
use crate::health::{HealthProbe, ProbeError, ProbeReport};
use crate::promotion::{PrimitiveError, PromotionPrimitive, TargetStatus};
use crate::region::{Endpoint, RegionId};

/// Exit status a hook uses to ask for a retry.
pub const EX_TEMPFAIL: i32 = 75;

#[derive(Debug, Error)]
pub enum HookError {
    #[error("failed to start hook '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("hook '{0}' timed out after {1:?}")]
    Timeout(String, Duration),

    #[error("hook '{program}' exited with {code:?}: {stderr}")]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("hook '{0}' produced invalid output: {1}")]
    Output(String, String),
}

impl HookError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Spawn { .. } | Self::Output(..) => false,
            Self::Timeout(..) => true,
            Self::Exit { code, .. } => matches!(code, None | Some(EX_TEMPFAIL)),
        }
    }
}

/// One configured executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandHook {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandHook {
    /// Build from an argv. Returns `None` for an empty vector.
    pub fn from_argv(argv: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run with `extra` appended. Returns trimmed stdout on exit 0.
    pub async fn run(&self, extra: &[&str]) -> Result<String, HookError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .args(extra)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %self.program, args = ?extra, "running hook");

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| HookError::Timeout(self.program.clone(), self.timeout))?
            .map_err(|source| HookError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(HookError::Exit {
                program: self.program.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn invalid(&self, detail: impl ToString) -> HookError {
        HookError::Output(self.program.clone(), detail.to_string())
    }
}

// =============================================================================
// PROBE
// =============================================================================

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    reachable: bool,
    #[serde(default)]
    replication_lag_secs: Option<f64>,
}

pub struct CommandProbe {
    hook: CommandHook,
}

impl CommandProbe {
    pub fn new(hook: CommandHook) -> Self {
        Self { hook }
    }
}

#[async_trait]
impl HealthProbe for CommandProbe {
    async fn probe(&self, endpoint: &Endpoint) -> Result<ProbeReport, ProbeError> {
        let mut args = vec![endpoint.address.as_str()];
        if let Some(id) = &endpoint.health_check_id {
            args.push(id.as_str());
        }

        let stdout = self
            .hook
            .run(&args)
            .await
            .map_err(|e| ProbeError::Unavailable(e.to_string()))?;
        let parsed: ProbeOutput =
            serde_json::from_str(&stdout).map_err(|e| ProbeError::InvalidResponse(e.to_string()))?;

        if !parsed.reachable {
            return Ok(ProbeReport::unreachable());
        }
        // negative, non-finite and overflowing values are all rejected here
        let lag = parsed
            .replication_lag_secs
            .map(|secs| {
                Duration::try_from_secs_f64(secs).map_err(|e| {
                    ProbeError::InvalidResponse(format!(
                        "replication_lag_secs out of range: {} ({})",
                        secs, e
                    ))
                })
            })
            .transpose()?;
        Ok(ProbeReport::reachable(lag))
    }
}

// =============================================================================
// PROMOTION
// =============================================================================

pub struct CommandPromoter {
    promote: CommandHook,
    status: CommandHook,
}

impl CommandPromoter {
    pub fn new(promote: CommandHook, status: CommandHook) -> Self {
        Self { promote, status }
    }
}

fn primitive_error(err: HookError) -> PrimitiveError {
    PrimitiveError {
        retryable: err.is_retryable(),
        message: err.to_string(),
    }
}

#[async_trait]
impl PromotionPrimitive for CommandPromoter {
    async fn promote_to_primary(&self, region: &RegionId, token: Uuid) -> Result<(), PrimitiveError> {
        let token = token.to_string();
        self.promote
            .run(&[region.as_str(), token.as_str()])
            .await
            .map(|_| ())
            .map_err(primitive_error)
    }

    async fn target_status(&self, region: &RegionId) -> Result<TargetStatus, PrimitiveError> {
        let stdout = self
            .status
            .run(&[region.as_str()])
            .await
            .map_err(primitive_error)?;
        serde_json::from_str(&stdout).map_err(|e| primitive_error(self.status.invalid(e)))
    }
}

// =============================================================================
// ROUTING
// =============================================================================

pub struct CommandRouting {
    set_weight: CommandHook,
    get_weight: CommandHook,
}

impl CommandRouting {
    pub fn new(set_weight: CommandHook, get_weight: CommandHook) -> Self {
        Self {
            set_weight,
            get_weight,
        }
    }
}

fn routing_error(err: HookError) -> RoutingError {
    RoutingError {
        retryable: err.is_retryable(),
        message: err.to_string(),
    }
}

#[async_trait]
impl RoutingControl for CommandRouting {
    async fn set_weight(&self, record: &str, region: &RegionId, weight: u8) -> Result<(), RoutingError> {
        let weight = weight.to_string();
        self.set_weight
            .run(&[record, region.as_str(), weight.as_str()])
            .await
            .map(|_| ())
            .map_err(routing_error)
    }

    async fn observed_weight(&self, record: &str, region: &RegionId) -> Result<Option<u8>, RoutingError> {
        let stdout = self
            .get_weight
            .run(&[record, region.as_str()])
            .await
            .map_err(routing_error)?;
        if stdout.is_empty() {
            return Ok(None);
        }
        stdout
            .parse::<u8>()
            .map(Some)
            .map_err(|e| routing_error(self.get_weight.invalid(e)))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandHook {
        let argv = vec!["sh".to_string(), "-c".to_string(), script.to_string(), "hook".to_string()];
        CommandHook::from_argv(&argv, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_empty_argv_is_no_hook() {
        assert!(CommandHook::from_argv(&[], Duration::from_secs(1)).is_none());
    }

    #[tokio::test]
    async fn test_arguments_are_appended() {
        let out = sh("echo \"$1 $2\"").run(&["us-west-2", "tok"]).await.unwrap();
        assert_eq!(out, "us-west-2 tok");
    }

    #[tokio::test]
    async fn test_tempfail_exit_is_retryable() {
        let err = sh("exit 75").run(&[]).await.unwrap_err();
        assert!(err.is_retryable());

        let err = sh("echo denied >&2; exit 1").run(&[]).await.unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("denied"));
    }

    #[tokio::test]
    async fn test_timeout_is_retryable() {
        let argv = vec!["sh".to_string(), "-c".to_string(), "sleep 5".to_string()];
        let hook = CommandHook::from_argv(&argv, Duration::from_millis(50)).unwrap();
        let err = hook.run(&[]).await.unwrap_err();
        assert!(matches!(err, HookError::Timeout(..)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_command_probe_parses_lag() {
        let probe = CommandProbe::new(sh(
            r#"echo '{"reachable": true, "replication_lag_secs": 2.5}'"#,
        ));
        let report = probe.probe(&Endpoint::new("db:5432")).await.unwrap();
        assert!(report.reachable);
        assert_eq!(report.replication_lag, Some(Duration::from_millis(2500)));
    }

    #[tokio::test]
    async fn test_command_probe_rejects_unrepresentable_lag() {
        for lag in ["1e30", "-1"] {
            let probe = CommandProbe::new(sh(&format!(
                r#"echo '{{"reachable": true, "replication_lag_secs": {}}}'"#,
                lag
            )));
            let err = probe.probe(&Endpoint::new("db:5432")).await.unwrap_err();
            assert!(matches!(err, ProbeError::InvalidResponse(_)), "lag {}", lag);
        }
    }

    #[tokio::test]
    async fn test_command_probe_rejects_garbage() {
        let probe = CommandProbe::new(sh("echo nope"));
        let err = probe.probe(&Endpoint::new("db:5432")).await.unwrap_err();
        assert!(matches!(err, ProbeError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_command_promoter_status() {
        let promoter = CommandPromoter::new(
            sh("exit 75"),
            sh(r#"echo '{"is_primary": true, "accepting_writes": false}'"#),
        );
        let err = promoter
            .promote_to_primary(&RegionId::new("us-west-2"), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(err.retryable);

        let status = promoter.target_status(&RegionId::new("us-west-2")).await.unwrap();
        assert!(status.is_primary);
        assert!(!status.is_confirmed());
    }

    #[tokio::test]
    async fn test_command_routing_weights() {
        let routing = CommandRouting::new(sh("test \"$3\" -le 100"), sh("echo 50"));
        routing
            .set_weight("db.example.com", &RegionId::new("us-west-2"), 50)
            .await
            .unwrap();
        assert_eq!(
            routing
                .observed_weight("db.example.com", &RegionId::new("us-west-2"))
                .await
                .unwrap(),
            Some(50)
        );

        let unset = CommandRouting::new(sh("true"), sh("true"));
        assert_eq!(
            unset
                .observed_weight("db.example.com", &RegionId::new("us-west-2"))
                .await
                .unwrap(),
            None
        );
    }
}
