use crate::compiler::staged::{DEFAULT_MODEL, DEFAULT_PROMPT_BUNDLE_VERSION};
use crate::content::store::SEED_REFRESH_POLICY_DAYS;
use crate::content::version::DEFAULT_REFRESH_POLICY_DAYS;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_RELATIVE_PATH: &str = ".learnio/config.toml";
const SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    pub version: u32,
    pub storage: StorageConfig,
    pub compiler: CompilerConfig,
    pub content: ContentConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    pub state_db: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompilerConfig {
    pub model: String,
    pub prompt_bundle_version: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            prompt_bundle_version: DEFAULT_PROMPT_BUNDLE_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentConfig {
    pub refresh_policy_days: u32,
    pub seed_refresh_policy_days: u32,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            refresh_policy_days: DEFAULT_REFRESH_POLICY_DAYS,
            seed_refresh_policy_days: SEED_REFRESH_POLICY_DAYS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub ndjson: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawProjectConfig {
    version: Option<u32>,
    storage: Option<RawStorageConfig>,
    compiler: Option<RawCompilerConfig>,
    content: Option<RawContentConfig>,
    logging: Option<RawLoggingConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawStorageConfig {
    state_db: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawCompilerConfig {
    model: Option<String>,
    prompt_bundle_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawContentConfig {
    refresh_policy_days: Option<u32>,
    seed_refresh_policy_days: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawLoggingConfig {
    ndjson: Option<String>,
}

pub fn project_config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_RELATIVE_PATH)
}

/// `Ok(None)` when the project has no config file.
pub fn load_project_config(root: &Path) -> Result<Option<ProjectConfig>> {
    let path = project_config_path(root);
    if !path.exists() {
        return Ok(None);
    }

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("read project config {}", path.display()))?;
    let parsed: RawProjectConfig =
        toml::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(validate_project_config(parsed, &path)?))
}

fn validate_project_config(raw: RawProjectConfig, path: &Path) -> Result<ProjectConfig> {
    let version = raw
        .version
        .ok_or_else(|| anyhow::anyhow!("{} missing required `version`", path.display()))?;
    if version != SUPPORTED_VERSION {
        bail!(
            "{} has unsupported version {version}; expected version = {SUPPORTED_VERSION}",
            path.display()
        );
    }

    let storage = StorageConfig {
        state_db: raw
            .storage
            .and_then(|s| sanitize_optional(s.state_db))
            .map(PathBuf::from),
    };

    let defaults = CompilerConfig::default();
    let compiler = match raw.compiler {
        Some(c) => CompilerConfig {
            model: sanitize_optional(c.model).unwrap_or(defaults.model),
            prompt_bundle_version: sanitize_optional(c.prompt_bundle_version)
                .unwrap_or(defaults.prompt_bundle_version),
        },
        None => defaults,
    };

    let defaults = ContentConfig::default();
    let content = match raw.content {
        Some(c) => ContentConfig {
            refresh_policy_days: validate_days(
                c.refresh_policy_days,
                defaults.refresh_policy_days,
                "[content].refresh_policy_days",
                path,
            )?,
            seed_refresh_policy_days: validate_days(
                c.seed_refresh_policy_days,
                defaults.seed_refresh_policy_days,
                "[content].seed_refresh_policy_days",
                path,
            )?,
        },
        None => defaults,
    };

    let logging = LoggingConfig {
        ndjson: raw
            .logging
            .and_then(|l| sanitize_optional(l.ndjson))
            .map(PathBuf::from),
    };

    Ok(ProjectConfig {
        version,
        storage,
        compiler,
        content,
        logging,
    })
}

fn validate_days(value: Option<u32>, default: u32, key: &str, path: &Path) -> Result<u32> {
    match value {
        None => Ok(default),
        Some(0) => bail!("{} has `{key} = 0`; expected at least 1 day", path.display()),
        Some(days) => Ok(days),
    }
}

fn sanitize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `$XDG_STATE_HOME/learnio/state.db`, then `$HOME/.local/state/...`, then
/// a project-local `.learnio/state.db`.
pub fn default_state_db() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("learnio").join("state.db");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("state")
            .join("learnio")
            .join("state.db");
    }
    PathBuf::from(".learnio/state.db")
}
