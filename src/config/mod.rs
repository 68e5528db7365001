//! Runtime configuration.
//!
//! Every knob has a hard default matching the calibrated values the runtime
//! ships with; `Config::resolve()` overlays `SANDCALL_*` environment
//! variables on top of those defaults.

mod helpers;

use std::time::Duration;

use helpers::{optional_env, parsed_env};

use crate::error::ConfigError;

/// Settings for the MCP bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Per-call timeout for bridged MCP tools. Also the deadline the
    /// worker-side stubs poll against.
    pub timeout: Duration,
    /// Identical-signature failures tolerated before the circuit opens.
    pub max_retries: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(30_000),
            max_retries: 3,
        }
    }
}

impl BridgeConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            timeout: parsed_env::<u64>("SANDCALL_BRIDGE_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            max_retries: parsed_env("SANDCALL_BRIDGE_MAX_RETRIES")?
                .unwrap_or(defaults.max_retries),
        })
    }
}

/// Settings for the sandbox controller and generated programs.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Outer guard on a whole `code_execution` call.
    pub execution_timeout: Duration,
    /// How often the host monitor lists the scratch directory.
    pub monitor_poll: Duration,
    /// How often a worker-side stub polls for its response file.
    pub stub_poll: Duration,
    /// Scratch directory inside the worker, reachable by both sides.
    pub scratch_dir: String,
    /// Runtime command the worker uses to execute the generated program.
    pub runtime_command: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            execution_timeout: Duration::from_millis(25_000),
            monitor_poll: Duration::from_millis(100),
            stub_poll: Duration::from_millis(50),
            scratch_dir: "/tmp".to_string(),
            runtime_command: "node".to_string(),
        }
    }
}

impl SandboxConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            execution_timeout: parsed_env::<u64>("SANDCALL_EXECUTION_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.execution_timeout),
            monitor_poll: parsed_env::<u64>("SANDCALL_MONITOR_POLL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.monitor_poll),
            stub_poll: parsed_env::<u64>("SANDCALL_STUB_POLL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.stub_poll),
            scratch_dir: optional_env("SANDCALL_SCRATCH_DIR")?.unwrap_or(defaults.scratch_dir),
            runtime_command: optional_env("SANDCALL_RUNTIME_COMMAND")?
                .unwrap_or(defaults.runtime_command),
        })
    }
}

/// Calibration constants for the savings accountant.
///
/// These are estimates, not measurements; they exist so deployments can tune
/// the reported numbers without code changes.
#[derive(Debug, Clone)]
pub struct SavingsConfig {
    /// Assumed base context re-sent on every round trip of a conventional
    /// tool loop.
    pub base_context_tokens: u64,
    /// Overhead tokens per tool-call message pair.
    pub tool_call_overhead_tokens: u64,
    /// Output tokens the model would spend deciding each next call.
    pub llm_decision_tokens: u64,
    /// Size assumed for a result whose size is unknown.
    pub unknown_result_tokens: u64,
}

impl Default for SavingsConfig {
    fn default() -> Self {
        Self {
            base_context_tokens: 7_000,
            tool_call_overhead_tokens: 40,
            llm_decision_tokens: 80,
            unknown_result_tokens: 50,
        }
    }
}

impl SavingsConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            base_context_tokens: parsed_env("SANDCALL_BASE_CONTEXT_TOKENS")?
                .unwrap_or(defaults.base_context_tokens),
            tool_call_overhead_tokens: parsed_env("SANDCALL_TOOL_CALL_OVERHEAD_TOKENS")?
                .unwrap_or(defaults.tool_call_overhead_tokens),
            llm_decision_tokens: parsed_env("SANDCALL_LLM_DECISION_TOKENS")?
                .unwrap_or(defaults.llm_decision_tokens),
            unknown_result_tokens: parsed_env("SANDCALL_UNKNOWN_RESULT_TOKENS")?
                .unwrap_or(defaults.unknown_result_tokens),
        })
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub bridge: BridgeConfig,
    pub sandbox: SandboxConfig,
    pub savings: SavingsConfig,
}

impl Config {
    /// Resolve configuration from the environment, falling back to defaults.
    pub fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            bridge: BridgeConfig::resolve()?,
            sandbox: SandboxConfig::resolve()?,
            savings: SavingsConfig::resolve()?,
        })
    }
}
