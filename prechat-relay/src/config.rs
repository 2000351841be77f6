use clap::{Arg, Command};
use ring::digest::{self, digest};
use serde::Deserialize;
use serde_json::Value;

use crate::apis::Apis;

/// The full configuration of the relay
#[derive(Deserialize)]
pub struct Configuration {
    /// The inbound webhook server
    pub webhook_server: WebhookServerConfiguration,
    /// How the external API clients are configured
    pub apis: Apis,
}

#[derive(Clone, Deserialize)]
pub struct WebhookServerConfiguration {
    /// Address for the webhook server to bind, e.g. "0.0.0.0:8080"
    pub listen_address: String,
    /// Expose the GET /diagnostic/vbout auth sweep. Leave off in
    /// production; each hit makes live calls against the CRM.
    #[serde(default)]
    pub diagnostics: bool,
}

#[derive(Debug)]
pub enum ConfigurationError {
    FileError,
    ParsingError,
    ListenAddressInvalid,
    ApiKeyMissing,
}

impl std::fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::FileError => write!(
                f,
                "There was an error finding or reading the configuration or secrets file"
            ),
            ConfigurationError::ParsingError => {
                write!(f, "The format of the configuration file was incorrect")
            }
            ConfigurationError::ListenAddressInvalid => {
                write!(f, "The webhook server listen address could not be parsed")
            }
            ConfigurationError::ApiKeyMissing => write!(
                f,
                "The VBout API key is missing; it must be supplied through the secrets file"
            ),
        }
    }
}

impl std::error::Error for ConfigurationError {}

pub fn configure() -> Result<Configuration, ConfigurationError> {
    let matches = Command::new("Prechat Relay")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Forward chat-widget prechat form submissions to the VBout contact API")
        .arg(
            Arg::new("config")
                .help("Path to the configuration toml file")
                .long("config")
                .default_value("./prechat-relay/resources/relay.toml"),
        )
        .arg(
            Arg::new("secrets")
                .help("Path to the secrets json file")
                .long("secrets")
                .default_value("./prechat-relay/private-resources/secrets.json"),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").unwrap();
    let secrets_path = matches.get_one::<String>("secrets").unwrap();

    read_and_interpolate(config_path, secrets_path, false)
}

/// Reads a configuration file and a secrets file, interpolates the secrets
/// into the configuration, and parses the result into a `Configuration`.
/// When `show_config` is set, the interpolated config is printed with every
/// secret value masked, along with a hash of the real contents.
pub fn read_and_interpolate(
    config_path: &str,
    secrets_path: &str,
    show_config: bool,
) -> Result<Configuration, ConfigurationError> {
    let mut config = match std::fs::read_to_string(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Encountered file error when trying to read configuration! Error: {e}");
            return Err(ConfigurationError::FileError);
        }
    };

    let secrets = match std::fs::read(secrets_path) {
        Ok(secret_bytes) => match serde_json::from_slice::<Value>(&secret_bytes) {
            Ok(secrets) => match secrets.as_object().cloned() {
                Some(secrets) => secrets,
                None => {
                    error!("The secrets file must contain a JSON object at the top level");
                    return Err(ConfigurationError::ParsingError);
                }
            },
            Err(e) => {
                error!("Encountered parsing error while reading the secrets file! Error: {e}");
                return Err(ConfigurationError::ParsingError);
            }
        },
        Err(e) => {
            error!("Encountered file error when trying to read secrets file! Error: {e}");
            return Err(ConfigurationError::FileError);
        }
    };

    // Iterate over the secrets we just parsed and replace matching keys in the config
    let mut secret_values = Vec::new();
    for (secret, value) in secrets {
        let value = match value.as_str() {
            Some(value) => value.to_owned(),
            None => {
                error!("The secret [{secret}] is not a string");
                return Err(ConfigurationError::ParsingError);
            }
        };
        config = config.replace(&secret, &value);
        secret_values.push(value);
    }

    if show_config {
        // Mask the interpolated secrets; the hash is over the real contents
        // so an operator can still compare two deployments
        let mut masked = config.clone();
        for value in &secret_values {
            masked = masked.replace(value, "[REDACTED]");
        }
        let config_hash = digest(&digest::SHA256, config.as_bytes())
            .as_ref()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>();
        println!("---------- Relay Config ----------\n{masked}");
        println!("---------- Configuration Hash ----------\n{config_hash}");
    }

    let config: Configuration = match toml::from_str(&config) {
        Ok(config) => config,
        Err(e) => {
            error!("Encountered parsing error while reading configuration with interpolated secrets! Error: {e}");
            return Err(ConfigurationError::ParsingError);
        }
    };

    if config
        .webhook_server
        .listen_address
        .parse::<std::net::SocketAddr>()
        .is_err()
    {
        return Err(ConfigurationError::ListenAddressInvalid);
    }

    // An uninterpolated key still carries its secret-token braces
    let api_key = &config.apis.vbout.api_key;
    if api_key.trim().is_empty() || api_key.contains('{') {
        return Err(ConfigurationError::ApiKeyMissing);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    const CONFIG: &str = r#"
        [webhook_server]
        listen_address = "127.0.0.1:8080"

        [apis.vbout]
        api_key = "{vbout-api-key}"
        list_id = "789"
    "#;

    const SECRETS: &str = r#"{ "{vbout-api-key}": "interpolated-key" }"#;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("prechat-relay-test-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_secrets_are_interpolated() {
        let config_path = write_temp("good.toml", CONFIG);
        let secrets_path = write_temp("good.json", SECRETS);

        let config = read_and_interpolate(
            config_path.to_str().unwrap(),
            secrets_path.to_str().unwrap(),
            false,
        )
        .unwrap();

        assert_eq!(config.apis.vbout.api_key, "interpolated-key");
        assert_eq!(config.apis.vbout.list_id.as_deref(), Some("789"));
        assert!(!config.webhook_server.diagnostics);
    }

    #[test]
    fn test_missing_secret_leaves_key_missing() {
        let config_path = write_temp("nokey.toml", CONFIG);
        let secrets_path = write_temp("nokey.json", "{}");

        let result = read_and_interpolate(
            config_path.to_str().unwrap(),
            secrets_path.to_str().unwrap(),
            false,
        );

        assert!(matches!(result, Err(ConfigurationError::ApiKeyMissing)));
    }

    #[test]
    fn test_invalid_listen_address_is_rejected() {
        let config_path = write_temp(
            "badaddr.toml",
            &CONFIG.replace("127.0.0.1:8080", "not-an-address"),
        );
        let secrets_path = write_temp("badaddr.json", SECRETS);

        let result = read_and_interpolate(
            config_path.to_str().unwrap(),
            secrets_path.to_str().unwrap(),
            false,
        );

        assert!(matches!(
            result,
            Err(ConfigurationError::ListenAddressInvalid)
        ));
    }

    #[test]
    fn test_missing_files_are_file_errors() {
        let result = read_and_interpolate("/nonexistent/relay.toml", "/nonexistent/secrets.json", false);
        assert!(matches!(result, Err(ConfigurationError::FileError)));
    }
}
