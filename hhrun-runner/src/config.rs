//! Runner configuration
//!
//! Settings that describe the worker node rather than the job: where to
//! check out code, which tools to call, and how forgiving to be about
//! failures.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::service::RetryPolicy;

/// What to do with outputs when the processing command fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingFailurePolicy {
    /// Fail immediately; nothing is published or cleaned up
    Abort,
    /// Publish whatever artifacts exist, clean up, then fail
    PublishPartial,
}

impl FromStr for ProcessingFailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "publish-partial" | "publish_partial" => Ok(Self::PublishPartial),
            other => anyhow::bail!(
                "unknown processing failure policy '{}' (expected abort or publish-partial)",
                other
            ),
        }
    }
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory the analysis repository is cloned into
    pub workspace: PathBuf,

    /// Version-control hosting service base URL
    pub git_host: String,

    /// Total clone attempts before giving up
    pub clone_attempts: u32,

    /// Wait between clone attempts
    pub clone_backoff: Duration,

    /// When set, the wait doubles after every failed clone up to this cap
    pub clone_backoff_max: Option<Duration>,

    /// Interpreter running the processing script
    pub python: String,

    /// Package installer
    pub pip: String,

    /// Companion utility package nested inside the checkout
    pub companion_package: String,

    pub on_processing_failure: ProcessingFailurePolicy,

    /// Fail the job (and keep local files) when any upload fails
    ///
    /// A failed revision-marker upload fails the job at the record step,
    /// before anything is installed or run.
    pub strict_uploads: bool,

    /// Where to write the JSON job report, if anywhere
    pub report_path: Option<PathBuf>,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Every variable is optional:
    /// - HHRUN_WORKSPACE (default: ".")
    /// - HHRUN_GIT_HOST (default: "https://github.com")
    /// - HHRUN_CLONE_ATTEMPTS (default: 3)
    /// - HHRUN_CLONE_BACKOFF (seconds, default: 60)
    /// - HHRUN_CLONE_BACKOFF_MAX (seconds, default: unset, i.e. fixed backoff)
    /// - HHRUN_PYTHON (default: "python")
    /// - HHRUN_PIP (default: "pip")
    /// - HHRUN_COMPANION_PACKAGE (default: "boostedhh")
    /// - HHRUN_ON_PROCESSING_FAILURE (abort | publish-partial, default: abort)
    /// - HHRUN_STRICT_UPLOADS (true/false, default: false)
    /// - HHRUN_REPORT_PATH (default: unset)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let clone_attempts = match lookup("HHRUN_CLONE_ATTEMPTS") {
            Some(v) => v
                .parse::<u32>()
                .map_err(|_| anyhow::anyhow!("HHRUN_CLONE_ATTEMPTS must be an integer: {}", v))?,
            None => defaults.clone_attempts,
        };

        let clone_backoff = match lookup("HHRUN_CLONE_BACKOFF") {
            Some(v) => Duration::from_secs(
                v.parse::<u64>()
                    .map_err(|_| anyhow::anyhow!("HHRUN_CLONE_BACKOFF must be seconds: {}", v))?,
            ),
            None => defaults.clone_backoff,
        };

        let clone_backoff_max = match lookup("HHRUN_CLONE_BACKOFF_MAX") {
            Some(v) => Some(Duration::from_secs(v.parse::<u64>().map_err(|_| {
                anyhow::anyhow!("HHRUN_CLONE_BACKOFF_MAX must be seconds: {}", v)
            })?)),
            None => defaults.clone_backoff_max,
        };

        let on_processing_failure = match lookup("HHRUN_ON_PROCESSING_FAILURE") {
            Some(v) => v.parse()?,
            None => defaults.on_processing_failure,
        };

        let strict_uploads = match lookup("HHRUN_STRICT_UPLOADS") {
            Some(v) => parse_bool(&v)
                .ok_or_else(|| anyhow::anyhow!("HHRUN_STRICT_UPLOADS must be a boolean: {}", v))?,
            None => defaults.strict_uploads,
        };

        Ok(Self {
            workspace: lookup("HHRUN_WORKSPACE")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace),
            git_host: lookup("HHRUN_GIT_HOST").unwrap_or(defaults.git_host),
            clone_attempts,
            clone_backoff,
            clone_backoff_max,
            python: lookup("HHRUN_PYTHON").unwrap_or(defaults.python),
            pip: lookup("HHRUN_PIP").unwrap_or(defaults.pip),
            companion_package: lookup("HHRUN_COMPANION_PACKAGE")
                .unwrap_or(defaults.companion_package),
            on_processing_failure,
            strict_uploads,
            report_path: lookup("HHRUN_REPORT_PATH").map(PathBuf::from),
        })
    }

    /// Retry policy for the repository checkout
    pub fn clone_retry(&self) -> RetryPolicy {
        match self.clone_backoff_max {
            Some(max) => RetryPolicy::exponential(self.clone_attempts, self.clone_backoff, max),
            None => RetryPolicy::fixed(self.clone_attempts, self.clone_backoff),
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.clone_attempts == 0 {
            anyhow::bail!("clone_attempts must be greater than 0");
        }

        if self.clone_backoff_max.is_some_and(|max| max < self.clone_backoff) {
            anyhow::bail!("clone_backoff_max cannot be shorter than clone_backoff");
        }

        if !self.git_host.starts_with("http://") && !self.git_host.starts_with("https://") {
            anyhow::bail!("git_host must start with http:// or https://");
        }

        if self.python.is_empty() || self.pip.is_empty() {
            anyhow::bail!("python and pip commands cannot be empty");
        }

        if self.companion_package.is_empty() {
            anyhow::bail!("companion_package cannot be empty");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            git_host: "https://github.com".to_string(),
            clone_attempts: 3,
            clone_backoff: Duration::from_secs(60),
            clone_backoff_max: None,
            python: "python".to_string(),
            pip: "pip".to_string(),
            companion_package: "boostedhh".to_string(),
            on_processing_failure: ProcessingFailurePolicy::Abort,
            strict_uploads: false,
            report_path: None,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.clone_attempts, 3);
        assert_eq!(config.clone_backoff, Duration::from_secs(60));
        assert_eq!(config.on_processing_failure, ProcessingFailurePolicy::Abort);
        assert!(!config.strict_uploads);
        assert_eq!(
            config.clone_retry(),
            RetryPolicy::fixed(3, Duration::from_secs(60))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let config = Config::from_lookup(lookup_from(&[
            ("HHRUN_WORKSPACE", "/srv/job"),
            ("HHRUN_CLONE_ATTEMPTS", "5"),
            ("HHRUN_CLONE_BACKOFF", "10"),
            ("HHRUN_ON_PROCESSING_FAILURE", "publish-partial"),
            ("HHRUN_STRICT_UPLOADS", "yes"),
            ("HHRUN_REPORT_PATH", "report.json"),
        ]))
        .unwrap();

        assert_eq!(config.workspace, PathBuf::from("/srv/job"));
        assert_eq!(config.clone_attempts, 5);
        assert_eq!(config.clone_backoff, Duration::from_secs(10));
        assert_eq!(
            config.on_processing_failure,
            ProcessingFailurePolicy::PublishPartial
        );
        assert!(config.strict_uploads);
        assert_eq!(config.report_path, Some(PathBuf::from("report.json")));
        assert_eq!(config.pip, "pip");
    }

    #[test]
    fn test_capped_clone_backoff() {
        let config = Config::from_lookup(lookup_from(&[
            ("HHRUN_CLONE_BACKOFF", "30"),
            ("HHRUN_CLONE_BACKOFF_MAX", "120"),
        ]))
        .unwrap();
        assert!(config.validate().is_ok());

        let policy = config.clone_retry();
        assert_eq!(policy.delay_after(1), Duration::from_secs(30));
        assert_eq!(policy.delay_after(2), Duration::from_secs(60));
        assert_eq!(policy.delay_after(5), Duration::from_secs(120));

        let config = Config::from_lookup(lookup_from(&[
            ("HHRUN_CLONE_BACKOFF", "60"),
            ("HHRUN_CLONE_BACKOFF_MAX", "10"),
        ]))
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        assert!(Config::from_lookup(lookup_from(&[("HHRUN_CLONE_ATTEMPTS", "three")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("HHRUN_STRICT_UPLOADS", "maybe")])).is_err());
        assert!(
            Config::from_lookup(lookup_from(&[("HHRUN_ON_PROCESSING_FAILURE", "retry")])).is_err()
        );
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.clone_attempts = 0;
        assert!(config.validate().is_err());
        config.clone_attempts = 1;

        config.git_host = "github.com".to_string();
        assert!(config.validate().is_err());

        config.git_host = "https://gitlab.cern.ch".to_string();
        assert!(config.validate().is_ok());
    }
}
