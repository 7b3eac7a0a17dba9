//! Tool configuration: optional TOML file, then `DIRSRV_*` environment.

use anyhow::{bail, Context, Result};
use config::{Config, File as ConfigFile};
use dirsrv_types::Dn;
use dirsrv_uniqueid::{StateLocation, ThreadMode};
use std::fmt;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

pub const DEFAULT_CONFIG_FILE: &str = "dirsrv.toml";
pub const ENV_PREFIX: &str = "DIRSRV";
pub const DEFAULT_ROOT_DN: &str = "cn=Directory Manager";

#[derive(Clone)]
pub struct AppConfig {
    // Logging
    pub log_level: String,
    pub log_format: String,

    // Root identity
    pub root_dn: Dn,
    pub root_pw: Option<Zeroizing<String>>,

    // Unique id generator
    pub uniqueid_state_dir: Option<String>,
    pub uniqueid_state_entry: Option<Dn>,
    pub uniqueid_multi_threaded: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            root_dn: Dn::parse(DEFAULT_ROOT_DN).unwrap_or_default(),
            root_pw: None,
            uniqueid_state_dir: None,
            uniqueid_state_entry: None,
            uniqueid_multi_threaded: true,
        }
    }
}

impl AppConfig {
    /// Load from `path` (or `./dirsrv.toml` when present) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let resolved_path = match path {
            Some(path) => {
                if !path.exists() {
                    bail!(
                        "Configuration file {} not found (specified via --config)",
                        path.display()
                    );
                }
                Some(path.to_path_buf())
            }
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_FILE);
                path.exists().then_some(path)
            }
        };

        let mut builder = Config::builder();
        if let Some(path) = &resolved_path {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }
        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX));

        let config = builder.build().context("failed to read configuration")?;
        Self::from_config(&config)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let defaults = Self::default();

        let root_dn = match get_string_value(config, &["root_dn", "root.dn"]) {
            Some(raw) => Dn::parse(&raw).with_context(|| format!("invalid root_dn `{raw}`"))?,
            None => defaults.root_dn,
        };

        let uniqueid_state_entry =
            match get_string_value(config, &["uniqueid_state_entry", "uniqueid.state_entry"]) {
                Some(raw) => Some(
                    Dn::parse(&raw)
                        .with_context(|| format!("invalid uniqueid_state_entry `{raw}`"))?,
                ),
                None => None,
            };

        // An empty directory is meaningful (current directory), so no trimming filter here.
        let uniqueid_state_dir = ["uniqueid_state_dir", "uniqueid.state_dir"]
            .iter()
            .find_map(|key| config.get_string(key).ok());

        let app = Self {
            log_level: get_string_value(config, &["log_level", "log.level"])
                .unwrap_or(defaults.log_level),
            log_format: get_string_value(config, &["log_format", "log.format"])
                .unwrap_or(defaults.log_format),
            root_dn,
            root_pw: ["root_pw", "root.pw"]
                .iter()
                .find_map(|key| config.get_string(key).ok())
                .map(Zeroizing::new),
            uniqueid_state_dir,
            uniqueid_state_entry,
            uniqueid_multi_threaded: get_bool_value(
                config,
                &["uniqueid_multi_threaded", "uniqueid.multi_threaded"],
                defaults.uniqueid_multi_threaded,
            ),
        };
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<()> {
        if self.uniqueid_state_dir.is_some() && self.uniqueid_state_entry.is_some() {
            bail!("uniqueid_state_dir and uniqueid_state_entry are mutually exclusive");
        }
        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            bail!(
                "unsupported log_format `{}` (expected `pretty` or `json`)",
                self.log_format
            );
        }
        Ok(())
    }

    /// Where the generator keeps its clock state. Neither setting means the
    /// current directory.
    pub fn state_location(&self) -> Result<StateLocation> {
        match (&self.uniqueid_state_dir, &self.uniqueid_state_entry) {
            (None, None) => Ok(StateLocation::current_directory()),
            (dir, entry) => Ok(StateLocation::from_parts(dir.as_deref(), entry.clone())?),
        }
    }

    pub fn thread_mode(&self) -> ThreadMode {
        ThreadMode::from_flag(self.uniqueid_multi_threaded)
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("root_dn", &self.root_dn)
            .field("root_pw", &self.root_pw.as_ref().map(|_| "<redacted>"))
            .field("uniqueid_state_dir", &self.uniqueid_state_dir)
            .field("uniqueid_state_entry", &self.uniqueid_state_entry)
            .field("uniqueid_multi_threaded", &self.uniqueid_multi_threaded)
            .finish()
    }
}

fn get_string_value(config: &Config, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        config
            .get_string(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn get_bool_value(config: &Config, keys: &[&str], default: bool) -> bool {
    for key in keys {
        if let Ok(value) = config.get_bool(key) {
            return value;
        }
        if let Ok(raw) = config.get_string(key) {
            if let Ok(parsed) = raw.trim().parse::<bool>() {
                return parsed;
            }
        }
    }
    default
}
