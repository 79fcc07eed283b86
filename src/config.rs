//! Connection settings loaded via `ortho-config`.
//!
//! [`RemoteConfig`] merges defaults, configuration files and `HOSTEXEC_*`
//! environment variables, then turns the result into an [`SshTransport`] for
//! the execution contexts. The core only ever sees the transport.

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::channel::{HostKeyPolicy, SshAuth, SshConfig, SshTransport};
use crate::machine::{DEFAULT_SSH_PORT, LocalMachine, RemoteMachine};
use crate::util::expand_tilde;

/// Default location of the OpenSSH `known_hosts` file.
pub const DEFAULT_KNOWN_HOSTS_FILE: &str = "~/.ssh/known_hosts";

/// SSH and local-identity settings.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "HOSTEXEC",
    discovery(
        app_name = "hostexec",
        env_var = "HOSTEXEC_CONFIG_PATH",
        config_file_name = "hostexec.toml",
        dotfile_name = ".hostexec.toml",
        project_file_name = "hostexec.toml"
    )
)]
pub struct RemoteConfig {
    /// Remote user to connect as.
    #[ortho_config(default = "root".to_owned())]
    pub ssh_user: String,
    /// Remote SSH port.
    #[ortho_config(default = 22)]
    pub ssh_port: u16,
    /// Private key used for authentication. Supports `~/` expansion. When
    /// absent, a password is used if one is configured, otherwise the SSH
    /// agent.
    pub ssh_identity_file: Option<String>,
    /// Passphrase unlocking `ssh_identity_file`.
    pub ssh_key_passphrase: Option<String>,
    /// Password used when no identity file is configured.
    pub ssh_password: Option<String>,
    /// Whether host keys must match an entry in `ssh_known_hosts_file`.
    #[ortho_config(default = false)]
    pub ssh_strict_host_key_checking: bool,
    /// `known_hosts` file consulted when strict checking is enabled.
    #[ortho_config(default = DEFAULT_KNOWN_HOSTS_FILE.to_owned())]
    pub ssh_known_hosts_file: String,
    /// Account reported by the local machine. Falls back to `$USER`.
    pub local_user: Option<String>,
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// A configuration value is empty or out of range.
    #[error(
        "invalid {description}: set HOSTEXEC_{env_suffix} or add {field} to hostexec.toml",
        env_suffix = field.to_uppercase()
    )]
    InvalidConfig {
        /// Configuration key that failed validation.
        field: &'static str,
        /// Human readable name of the setting.
        description: &'static str,
    },
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            ssh_user: String::from("root"),
            ssh_port: DEFAULT_SSH_PORT,
            ssh_identity_file: None,
            ssh_key_passphrase: None,
            ssh_password: None,
            ssh_strict_host_key_checking: false,
            ssh_known_hosts_file: DEFAULT_KNOWN_HOSTS_FILE.to_owned(),
            local_user: None,
        }
    }
}

impl RemoteConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("hostexec")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Rejects empty or whitespace-only values and a zero port.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConfig`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(Some(self.ssh_user.as_str()), "ssh_user", "SSH user")?;
        require(
            self.ssh_identity_file.as_deref(),
            "ssh_identity_file",
            "SSH identity file",
        )?;
        require(self.ssh_password.as_deref(), "ssh_password", "SSH password")?;
        require(
            Some(self.ssh_known_hosts_file.as_str()),
            "ssh_known_hosts_file",
            "known_hosts file",
        )?;
        if self.ssh_port == 0 {
            return Err(ConfigError::InvalidConfig {
                field: "ssh_port",
                description: "SSH port",
            });
        }
        Ok(())
    }

    /// Authentication method implied by the configured credentials.
    #[must_use]
    pub fn ssh_auth(&self) -> SshAuth {
        if let Some(identity) = &self.ssh_identity_file {
            return SshAuth::KeyFile {
                path: Utf8PathBuf::from(expand_tilde(identity)),
                passphrase: self.ssh_key_passphrase.clone(),
            };
        }
        self.ssh_password
            .clone()
            .map_or(SshAuth::Agent, SshAuth::Password)
    }

    /// Host-key policy implied by the strict-checking toggle.
    #[must_use]
    pub fn host_key_policy(&self) -> HostKeyPolicy {
        if self.ssh_strict_host_key_checking {
            HostKeyPolicy::KnownHosts {
                path: Utf8PathBuf::from(expand_tilde(&self.ssh_known_hosts_file)),
            }
        } else {
            HostKeyPolicy::AcceptAny
        }
    }

    /// Transport configuration, authenticating as `user` when given and as
    /// `ssh_user` otherwise.
    #[must_use]
    pub fn ssh_config(&self, user: Option<&str>) -> SshConfig {
        SshConfig {
            user: user.unwrap_or(&self.ssh_user).to_owned(),
            auth: self.ssh_auth(),
            host_keys: self.host_key_policy(),
        }
    }

    /// Remote machine at `host`, overriding the configured user and port when
    /// given.
    #[must_use]
    pub fn remote_machine(
        &self,
        host: &str,
        user: Option<&str>,
        port: Option<u16>,
    ) -> RemoteMachine<SshTransport> {
        RemoteMachine::new(
            host,
            port.unwrap_or(self.ssh_port),
            SshTransport::new(self.ssh_config(user)),
        )
    }

    /// The machine running this process.
    #[must_use]
    pub fn local_machine(&self) -> LocalMachine {
        let user = self
            .local_user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_default();
        LocalMachine::new(user)
    }
}

fn require(
    value: Option<&str>,
    field: &'static str,
    description: &'static str,
) -> Result<(), ConfigError> {
    match value {
        Some(text) if text.trim().is_empty() => {
            Err(ConfigError::InvalidConfig { field, description })
        }
        _ => Ok(()),
    }
}
