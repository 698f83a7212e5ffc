use std::path::PathBuf;

use anyhow::{anyhow, Context};

use crate::logging;

/// Process-level settings. Workspace-level settings live in the database
/// (`setup.get` / `setup.update`).
#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env_and_args() -> anyhow::Result<Self> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        Self::parse(&args, |k| std::env::var(k).ok())
    }

    /// Flags win over environment variables.
    pub fn parse(
        args: &[String],
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let mut workspace = env("SCHOOLD_WORKSPACE").and_then(non_empty).map(PathBuf::from);
        let mut log_level = env("SCHOOLD_LOG_LEVEL")
            .and_then(non_empty)
            .unwrap_or_else(|| logging::default_log_level().to_string());
        let mut log_dir = env("SCHOOLD_LOG_DIR").and_then(non_empty).map(PathBuf::from);

        let mut it = args.iter();
        while let Some(arg) = it.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((f, v)) => (f, Some(v.to_string())),
                None => (arg.as_str(), None),
            };
            let mut value = || -> anyhow::Result<String> {
                match inline.clone() {
                    Some(v) => Ok(v),
                    None => it
                        .next()
                        .cloned()
                        .ok_or_else(|| anyhow!("{} expects a value", flag)),
                }
            };
            match flag {
                "--workspace" => workspace = Some(PathBuf::from(value()?)),
                "--log-level" => log_level = value()?,
                "--log-dir" => log_dir = Some(PathBuf::from(value()?)),
                other => return Err(anyhow!("unknown argument: {}", other)),
            }
        }

        let log_level = logging::normalize_level(&log_level)
            .map_err(|e| anyhow!(e))
            .context("invalid log level")?
            .to_string();

        Ok(Self {
            workspace,
            log_level,
            log_dir,
        })
    }
}

fn non_empty(s: String) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}
