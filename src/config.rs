use std::env;

use thiserror::Error;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_UPLOAD_FOLDER: &str = "gallery";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Credentials for the media host.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

/// Process-wide configuration, read once at startup.
///
/// Every required variable is checked here so a misconfigured deployment
/// aborts with a named variable instead of failing on the first request.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub upload_folder: String,
    pub media: MediaConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Blank values count as
    /// absent.
    pub fn from_lookup(
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let port = match resolve(&lookup, "PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            port,
            database_url: require(&lookup, "MONGODB_URI")?,
            upload_folder: resolve(&lookup, "UPLOAD_FOLDER")
                .unwrap_or_else(|| DEFAULT_UPLOAD_FOLDER.to_string()),
            media: MediaConfig {
                cloud_name: require(&lookup, "CLOUDINARY_CLOUD_NAME")?,
                api_key: require(&lookup, "CLOUDINARY_API_KEY")?,
                api_secret: require(&lookup, "CLOUDINARY_API_SECRET")?,
            },
        })
    }
}

fn resolve(
    lookup: &impl Fn(&'static str) -> Option<String>,
    name: &'static str,
) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn require(
    lookup: &impl Fn(&'static str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    resolve(lookup, name).ok_or(ConfigError::MissingVar(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(entries: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
        entries
            .iter()
            .map(|(name, value)| (*name, value.to_string()))
            .collect()
    }

    fn full() -> HashMap<&'static str, String> {
        vars(&[
            ("MONGODB_URI", "mongodb://localhost:27017/image_gallery"),
            ("CLOUDINARY_CLOUD_NAME", "demo"),
            ("CLOUDINARY_API_KEY", "key"),
            ("CLOUDINARY_API_SECRET", "secret"),
        ])
    }

    #[test]
    fn loads_with_defaults() {
        let env = full();
        let config = Config::from_lookup(|name| env.get(name).cloned()).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.upload_folder, "gallery");
        assert_eq!(config.media.cloud_name, "demo");
    }

    #[test]
    fn missing_database_url_names_the_variable() {
        let mut env = full();
        env.remove("MONGODB_URI");
        let err = Config::from_lookup(|name| env.get(name).cloned()).unwrap_err();
        assert!(err.to_string().contains("MONGODB_URI"), "{err}");
    }

    #[test]
    fn blank_credential_counts_as_missing() {
        let mut env = full();
        env.insert("CLOUDINARY_API_SECRET", "   ".to_string());
        let err = Config::from_lookup(|name| env.get(name).cloned()).unwrap_err();
        assert!(err.to_string().contains("CLOUDINARY_API_SECRET"), "{err}");
    }

    #[test]
    fn rejects_unparseable_port() {
        let mut env = full();
        env.insert("PORT", "not-a-port".to_string());
        let err = Config::from_lookup(|name| env.get(name).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
    }

    #[test]
    fn honors_explicit_port_and_folder() {
        let mut env = full();
        env.insert("PORT", "8080".to_string());
        env.insert("UPLOAD_FOLDER", "photos".to_string());
        let config = Config::from_lookup(|name| env.get(name).cloned()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.upload_folder, "photos");
    }
}
