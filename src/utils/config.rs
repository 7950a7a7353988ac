//! Settings (flags > env > YAML file > defaults) and credential lookup.
//!
//! Settings are built once in `main` and handed to each subcommand.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

use crate::error::TwistError;
use crate::twist::parse_endpoint;

pub const DEFAULT_PROFILE: &str = "hpsa";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 1;

/// On-disk configuration (`config.yaml`); every key optional.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub endpoint: Option<String>,
    pub profile: Option<String>,
    pub timeout_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub job_timeout_secs: Option<u64>,
    pub verify_tls: Option<bool>,
}

impl FileConfig {
    pub fn from_yaml(raw: &str) -> Result<Self> {
        // An empty document deserializes as unit; treat it as "no settings".
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).context("failed to parse YAML config file")
    }
}

/// Values taken from the command line (clap already folded in env vars).
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub profile: Option<String>,
    pub timeout_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub job_timeout_secs: Option<u64>,
    pub insecure: bool,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub endpoint: Option<Url>,
    pub profile: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub job_timeout: Option<Duration>,
    pub verify_tls: bool,
}

impl Settings {
    /// Load the config file (explicit path must exist; the default may not) and merge.
    pub fn load(explicit: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let file = match explicit {
            Some(path) => read_config(path)?,
            None => match default_config_path() {
                Some(path) if path.is_file() => read_config(&path)?,
                _ => FileConfig::default(),
            },
        };
        Self::resolve(file, overrides)
    }

    pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<Self> {
        let endpoint = overrides
            .endpoint
            .or(file.endpoint)
            .filter(|s| !s.trim().is_empty())
            .map(|raw| parse_endpoint(&raw))
            .transpose()?;

        let profile = overrides
            .profile
            .or(file.profile)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string());

        let timeout = Duration::from_secs(
            overrides
                .timeout_secs
                .or(file.timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        );
        let poll_interval = Duration::from_secs(
            overrides
                .poll_interval_secs
                .or(file.poll_interval_secs)
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
        );
        // 0 means "no limit", same as leaving it unset.
        let job_timeout = overrides
            .job_timeout_secs
            .or(file.job_timeout_secs)
            .filter(|s| *s > 0)
            .map(Duration::from_secs);
        let verify_tls = !overrides.insecure && file.verify_tls.unwrap_or(true);

        Ok(Settings {
            endpoint,
            profile,
            timeout,
            poll_interval,
            job_timeout,
            verify_tls,
        })
    }

    pub fn endpoint(&self) -> Result<&Url, TwistError> {
        self.endpoint.as_ref().ok_or(TwistError::ConfigMissing)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("twist").join("config.yaml"))
}

fn read_config(path: &Path) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    FileConfig::from_yaml(&raw).with_context(|| format!("in {}", path.display()))
}

/* ---- Credentials ---- */

pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Environment variable holding `USER%PASSWORD` for a profile.
    pub fn variable_for(profile: &str) -> String {
        let suffix: String = profile
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("CRED_{suffix}")
    }

    pub fn from_lookup(
        profile: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, TwistError> {
        let variable = Self::variable_for(profile);
        let missing = || TwistError::CredentialMissing {
            variable: variable.clone(),
        };
        let raw = lookup(&variable).ok_or_else(missing)?;
        let (user, password) = raw.split_once('%').ok_or_else(missing)?;
        if user.is_empty() || password.is_empty() {
            return Err(missing());
        }
        Ok(Self {
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    pub fn from_env(profile: &str) -> Result<Self, TwistError> {
        Self::from_lookup(profile, |k| std::env::var(k).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_without_file_or_flags() {
        let s = Settings::resolve(FileConfig::default(), Overrides::default()).unwrap();
        assert!(s.endpoint.is_none());
        assert_eq!(s.profile, "hpsa");
        assert_eq!(s.timeout, Duration::from_secs(60));
        assert_eq!(s.poll_interval, Duration::from_secs(1));
        assert_eq!(s.job_timeout, None);
        assert!(s.verify_tls);
        assert!(matches!(s.endpoint(), Err(TwistError::ConfigMissing)));
    }

    #[test]
    fn flags_override_file() {
        let file = FileConfig::from_yaml(
            "endpoint: https://file.example\nprofile: lab\ntimeout_secs: 5\njob_timeout_secs: 600\n",
        )
        .unwrap();
        let overrides = Overrides {
            endpoint: Some("https://flag.example".into()),
            timeout_secs: Some(30),
            insecure: true,
            ..Default::default()
        };
        let s = Settings::resolve(file, overrides).unwrap();
        assert_eq!(s.endpoint().unwrap().as_str(), "https://flag.example/osapi/");
        assert_eq!(s.profile, "lab");
        assert_eq!(s.timeout, Duration::from_secs(30));
        assert_eq!(s.job_timeout, Some(Duration::from_secs(600)));
        assert!(!s.verify_tls);
    }

    #[test]
    fn zero_job_timeout_means_unbounded() {
        let overrides = Overrides {
            job_timeout_secs: Some(0),
            ..Default::default()
        };
        let s = Settings::resolve(FileConfig::default(), overrides).unwrap();
        assert_eq!(s.job_timeout, None);
    }

    #[test]
    fn unknown_config_keys_rejected() {
        assert!(FileConfig::from_yaml("endpont: typo\n").is_err());
        assert_eq!(FileConfig::from_yaml("").unwrap(), FileConfig::default());
    }

    #[test]
    fn explicit_config_file_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "endpoint: https://core.lab\npoll_interval_secs: 3\n").unwrap();
        let s = Settings::load(Some(&path), Overrides::default()).unwrap();
        assert_eq!(s.poll_interval, Duration::from_secs(3));
        assert!(Settings::load(Some(&dir.path().join("missing.yaml")), Overrides::default()).is_err());
    }

    #[test]
    fn credential_variable_name() {
        assert_eq!(Credentials::variable_for("hpsa"), "CRED_HPSA");
        assert_eq!(Credentials::variable_for("lab-2"), "CRED_LAB_2");
    }

    #[test]
    fn credentials_split_on_first_percent() {
        let env: HashMap<&str, &str> = [("CRED_HPSA", "admin%pa%ss")].into_iter().collect();
        let c = Credentials::from_lookup("hpsa", |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(c.user, "admin");
        assert_eq!(c.password, "pa%ss");
        assert!(!format!("{c:?}").contains("pa%ss"));
    }

    #[test]
    fn credentials_missing_or_incomplete() {
        let none = Credentials::from_lookup("hpsa", |_| None).unwrap_err();
        assert!(matches!(none, TwistError::CredentialMissing { ref variable } if variable == "CRED_HPSA"));
        for bad in ["adminonly", "%secret", "admin%"] {
            let r = Credentials::from_lookup("hpsa", |_| Some(bad.to_string()));
            assert!(r.is_err(), "{bad} should be rejected");
        }
    }
}
