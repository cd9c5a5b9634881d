//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::EtpConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "cannot read config: {}", e),
            ConfigError::Parse(e) => write!(f, "invalid TOML: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "invalid config: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse and validate a TOML document.
pub fn parse_config(content: &str) -> Result<EtpConfig, ConfigError> {
    let config: EtpConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<EtpConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[endpoint]\napplication_name = \"witsml-store\"\nsupported_formats = [\"xml\", \"json\"]"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.endpoint.application_name, "witsml-store");
        assert_eq!(config.endpoint.supported_formats.len(), 2);
    }

    #[test]
    fn reports_each_failure_kind() {
        let missing = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io(_)));

        assert!(matches!(parse_config("[listener"), Err(ConfigError::Parse(_))));

        let invalid = parse_config("[session]\nrequest_timeout_secs = 0").unwrap_err();
        assert!(invalid.to_string().contains("session.request_timeout_secs"));
    }
}
