//! NoteFabric configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{FabricError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FabricConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub failure: FailureConfig,
    #[serde(default)]
    pub tests: TestsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl FabricConfig {
    /// Load config from the default path (~/.notefabric/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FabricError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| FabricError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the given path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| FabricError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.memory.retained_tail >= self.memory.eviction_threshold {
            return Err(FabricError::Config(format!(
                "memory.retained_tail ({}) must be below memory.eviction_threshold ({})",
                self.memory.retained_tail, self.memory.eviction_threshold
            )));
        }
        let intervals = [
            ("scheduler.tick_interval_ms", self.scheduler.tick_interval_ms),
            ("scheduler.rerank_interval_ms", self.scheduler.rerank_interval_ms),
            ("persistence.flush_interval_ms", self.persistence.flush_interval_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(FabricError::Config(format!("{name} must be positive")));
            }
        }
        if self.scheduler.max_concurrent_runs == 0 {
            return Err(FabricError::Config(
                "scheduler.max_concurrent_runs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the NoteFabric home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".notefabric")
    }
}

/// Scheduler timing and admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_rerank_interval_ms")]
    pub rerank_interval_ms: u64,
    #[serde(default = "default_max_admitted")]
    pub max_admitted_per_cycle: usize,
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
}

fn default_tick_interval_ms() -> u64 { 200 }
fn default_rerank_interval_ms() -> u64 { 5000 }
fn default_max_admitted() -> usize { 5 }
fn default_max_concurrent_runs() -> usize { 4 }
fn default_step_timeout_secs() -> u64 { 120 }

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn rerank_interval(&self) -> Duration {
        Duration::from_millis(self.rerank_interval_ms)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            rerank_interval_ms: default_rerank_interval_ms(),
            max_admitted_per_cycle: default_max_admitted(),
            max_concurrent_runs: default_max_concurrent_runs(),
            step_timeout_secs: default_step_timeout_secs(),
        }
    }
}

/// Persistence (storage collaborator + write coalescing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// "json", "sqlite" or "memory".
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_store_path")]
    pub path: String,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

fn default_backend() -> String { "json".into() }
fn default_store_path() -> String { "~/.notefabric/notes".into() }
fn default_flush_interval_ms() -> u64 { 1000 }

impl PersistenceConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Storage path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_path(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

/// Execution-log eviction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_eviction_threshold")]
    pub eviction_threshold: usize,
    #[serde(default = "default_retained_tail")]
    pub retained_tail: usize,
}

fn default_eviction_threshold() -> usize { 100 }
fn default_retained_tail() -> usize { 50 }

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            eviction_threshold: default_eviction_threshold(),
            retained_tail: default_retained_tail(),
        }
    }
}

/// Failure policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Escalate tool-not-found / tool-execution failures to unit-test notes.
    #[serde(default)]
    pub escalate_tool_errors: bool,
    /// Tool invoked by generated unit-test notes.
    #[serde(default = "default_test_tool")]
    pub test_tool: String,
}

fn default_max_retries() -> u32 { 3 }
fn default_test_tool() -> String { "unit_test".into() }

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            escalate_tool_errors: false,
            test_tool: default_test_tool(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestsConfig {
    #[serde(default)]
    pub auto_run: bool,
    /// Registered capabilities run as post-completion test hooks.
    #[serde(default)]
    pub hook_tools: Vec<String>,
}

/// Text-generation collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "offline", "openai" or "custom:<base-url>".
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_provider() -> String { "offline".into() }
fn default_llm_model() -> String { "gpt-4o-mini".into() }
fn default_llm_timeout_secs() -> u64 { 60 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            endpoint: String::new(),
            api_key: String::new(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 3900 }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = FabricConfig::parse("").unwrap();
        assert_eq!(config.persistence.flush_interval_ms, 1000);
        assert_eq!(config.memory.eviction_threshold, 100);
        assert_eq!(config.memory.retained_tail, 50);
        assert_eq!(config.failure.max_retries, 3);
        assert!(!config.tests.auto_run);
        assert_eq!(config.llm.provider, "offline");
    }

    #[test]
    fn test_partial_section_override() {
        let config = FabricConfig::parse(
            r#"
            [scheduler]
            tick_interval_ms = 50

            [memory]
            eviction_threshold = 20
            retained_tail = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.tick_interval_ms, 50);
        assert_eq!(config.scheduler.rerank_interval_ms, 5000);
        assert_eq!(config.memory.eviction_threshold, 20);
    }

    #[test]
    fn test_test_hook_tools() {
        let config =
            FabricConfig::parse("[tests]\nauto_run = true\nhook_tools = [\"echo\"]\n").unwrap();
        assert!(config.tests.auto_run);
        assert_eq!(config.tests.hook_tools, vec!["echo".to_string()]);
    }

    #[test]
    fn test_rejects_tail_not_below_threshold() {
        let err = FabricConfig::parse(
            "[memory]\neviction_threshold = 10\nretained_tail = 10\n",
        )
        .unwrap_err();
        assert!(matches!(err, FabricError::Config(_)));
    }

    #[test]
    fn test_rejects_zero_interval() {
        assert!(FabricConfig::parse("[persistence]\nflush_interval_ms = 0\n").is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join(format!("notefabric-cfg-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");
        let mut config = FabricConfig::default();
        config.gateway.port = 4100;
        config.save_to(&path).unwrap();
        let loaded = FabricConfig::load_from(&path).unwrap();
        assert_eq!(loaded.gateway.port, 4100);
        std::fs::remove_dir_all(&dir).ok();
    }
}
