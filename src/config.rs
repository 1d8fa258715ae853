// ⚙️ Server Configuration - CLI flags with environment fallbacks

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::channel::DEFAULT_CONNECTION_BUFFER;
use crate::error::ConfigError;

#[derive(Debug, Clone, Parser)]
#[command(name = "household-server")]
#[command(about = "Household budget API with realtime budget warnings", long_about = None)]
#[command(version)]
pub struct ServerConfig {
    /// Listen address
    #[arg(long, env = "HOUSEHOLD_LISTEN_ADDR", default_value = "127.0.0.1:3000")]
    pub listen: String,

    /// SQLite database path
    #[arg(long, env = "HOUSEHOLD_DB_PATH", default_value = "households.db")]
    pub db_path: PathBuf,

    /// Origins allowed to call the API and open websockets (comma separated)
    #[arg(
        long,
        env = "HOUSEHOLD_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:5173"
    )]
    pub allowed_origins: Vec<String>,

    /// Run the role guard on `join-household` (VIEWER or higher)
    #[arg(
        long,
        env = "HOUSEHOLD_REQUIRE_JOIN_AUTH",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub require_join_auth: bool,

    /// Accept websocket upgrades that carry no Origin header (non-browser clients)
    #[arg(
        long,
        env = "HOUSEHOLD_ALLOW_MISSING_ORIGIN",
        default_value_t = false,
        action = clap::ArgAction::Set
    )]
    pub allow_missing_origin: bool,

    /// Outbound event queue per websocket connection
    #[arg(long, env = "HOUSEHOLD_CHANNEL_BUFFER", default_value_t = DEFAULT_CONNECTION_BUFFER)]
    pub channel_buffer: usize,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, env = "HOUSEHOLD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit JSON logs
    #[arg(long, env = "HOUSEHOLD_LOG_JSON")]
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: "127.0.0.1:3000".to_string(),
            db_path: PathBuf::from("households.db"),
            allowed_origins: vec!["http://localhost:5173".to_string()],
            require_join_auth: true,
            allow_missing_origin: false,
            channel_buffer: DEFAULT_CONNECTION_BUFFER,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddr(self.listen.clone()))
    }

    /// Origins with surrounding whitespace and empty entries removed.
    pub fn origins(&self) -> Vec<String> {
        self.allowed_origins
            .iter()
            .map(|o| o.trim().trim_end_matches('/').to_string())
            .filter(|o| !o.is_empty())
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;

        let origins = self.origins();
        if origins.is_empty() {
            return Err(ConfigError::InvalidOrigins("no origins configured".to_string()));
        }
        // Credentialed CORS cannot use a wildcard origin.
        if let Some(bad) = origins.iter().find(|o| o.contains('*') || !o.contains("://")) {
            return Err(ConfigError::InvalidOrigins(bad.clone()));
        }

        if self.channel_buffer == 0 {
            return Err(ConfigError::ZeroChannelBuffer);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_parse_flags() {
        let config = ServerConfig::try_parse_from([
            "household-server",
            "--listen",
            "0.0.0.0:8080",
            "--allowed-origins",
            "https://app.example.com, https://admin.example.com/",
            "--require-join-auth",
            "false",
            "--allow-missing-origin",
            "true",
        ])
        .unwrap();

        assert_eq!(config.listen_addr().unwrap().port(), 8080);
        assert_eq!(
            config.origins(),
            vec!["https://app.example.com", "https://admin.example.com"]
        );
        assert!(!config.require_join_auth);
        assert!(config.allow_missing_origin);
        assert!(!ServerConfig::default().allow_missing_origin);
    }

    #[test]
    fn test_rejects_wildcard_origin() {
        let config = ServerConfig {
            allowed_origins: vec!["*".to_string()],
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidOrigins(_))));
    }

    #[test]
    fn test_rejects_bad_listen_and_buffer() {
        let config = ServerConfig {
            listen: "not-an-addr".to_string(),
            ..ServerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidListenAddr("not-an-addr".to_string()))
        );

        let config = ServerConfig {
            channel_buffer: 0,
            ..ServerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroChannelBuffer));
    }
}
