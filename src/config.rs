use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Hard cap on the size of an uploaded image.
pub const MAX_UPLOAD_SIZE: usize = 32 * 1024 * 1024;

/// Room for multipart boundaries and part headers on top of the image itself.
pub const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// How long in-flight requests get to finish once shutdown starts.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read auth file {path}: {source}")]
    AuthFile {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid auth file {path}: {source}")]
    AuthFileFormat {
        path: String,
        source: serde_json::Error,
    },
    #[error("Refusing to use auth file: {0}")]
    InsecureAuthFile(String),
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub pages: PagesConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port on the loopback interface
    pub port: u16,
    /// Upper bound on key allocation plus the final write for one upload
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct PagesConfig {
    /// HTML upload form served at `/` (built-in form when unset)
    pub form_file: Option<String>,
    /// Icon served at `/favicon.ico` (built-in icon when unset)
    pub icon_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    Embedded,
    Mongo,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for the embedded redb database
    pub data_dir: String,
    pub mongo: MongoConfig,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
    /// JSON file holding the credential triple
    pub auth_file: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "share-image".to_string(),
            collection: "images".to_string(),
            auth_file: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Mongo,
            data_dir: "./data".to_string(),
            mongo: MongoConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let port = match std::env::var("PORT") {
            Ok(p) => p
                .parse()
                .map_err(|_| ConfigError::ValidationError(format!("invalid PORT value: {p:?}")))?,
            Err(_) => ServerConfig::default().port,
        };

        let request_timeout = match std::env::var("REQUEST_TIMEOUT_SECS") {
            Ok(s) => parse_timeout_secs(&s)?,
            Err(_) => ServerConfig::default().request_timeout,
        };

        let backend = match std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "mongo".to_string())
            .to_lowercase()
            .as_str()
        {
            "embedded" | "redb" => StorageBackend::Embedded,
            "mongo" | "mongodb" => StorageBackend::Mongo,
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown STORAGE_BACKEND {other:?} (expected mongo or embedded)"
                )))
            }
        };

        let mongo_defaults = MongoConfig::default();
        let config = Config {
            pages: PagesConfig {
                form_file: std::env::var("FORM_FILE").ok(),
                icon_file: std::env::var("ICON_FILE").ok(),
            },
            server: ServerConfig {
                port,
                request_timeout,
            },
            storage: StorageConfig {
                backend,
                data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
                mongo: MongoConfig {
                    uri: std::env::var("MONGO_URI").unwrap_or(mongo_defaults.uri),
                    database: std::env::var("MONGO_DATABASE").unwrap_or(mongo_defaults.database),
                    collection: std::env::var("MONGO_COLLECTION")
                        .unwrap_or(mongo_defaults.collection),
                    auth_file: std::env::var("AUTH_FILE").ok(),
                },
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.request_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "REQUEST_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.storage.backend == StorageBackend::Mongo {
            if self.storage.mongo.auth_file.is_none() {
                return Err(ConfigError::ValidationError(
                    "AUTH_FILE is required when STORAGE_BACKEND=mongo".to_string(),
                ));
            }
            if self.storage.mongo.database.is_empty() || self.storage.mongo.collection.is_empty()
            {
                return Err(ConfigError::ValidationError(
                    "MONGO_DATABASE and MONGO_COLLECTION cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn parse_timeout_secs(value: &str) -> Result<Duration, ConfigError> {
    value.trim().parse().map(Duration::from_secs).map_err(|_| {
        ConfigError::ValidationError(format!("invalid REQUEST_TIMEOUT_SECS value: {value:?}"))
    })
}

/// MongoDB credential triple, read from a private JSON file.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Credential {
    #[serde(alias = "auth_source", alias = "authSource", default)]
    pub auth_source: String,
    #[serde(alias = "username")]
    pub username: String,
    #[serde(alias = "password")]
    pub password: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("auth_source", &self.auth_source)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credential {
    /// Read the credential file, refusing it unless only its owner (the
    /// user running this process) can access it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let metadata = std::fs::metadata(path).map_err(|source| ConfigError::AuthFile {
            path: display.clone(),
            source,
        })?;
        check_private(path, &metadata)?;

        let data = std::fs::read(path).map_err(|source| ConfigError::AuthFile {
            path: display.clone(),
            source,
        })?;
        serde_json::from_slice(&data).map_err(|source| ConfigError::AuthFileFormat {
            path: display,
            source,
        })
    }
}

#[cfg(unix)]
fn check_private(path: &Path, metadata: &std::fs::Metadata) -> Result<(), ConfigError> {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    let owner = metadata.uid();
    let current = nix::unistd::getuid().as_raw();
    if owner != current {
        return Err(ConfigError::InsecureAuthFile(format!(
            "{} is owned by uid {owner} but the process runs as uid {current}",
            path.display()
        )));
    }

    let mode = metadata.permissions().mode() & 0o777;
    if mode & 0o077 != 0 {
        return Err(ConfigError::InsecureAuthFile(format!(
            "{} is accessible by group or others (mode {mode:03o})",
            path.display()
        )));
    }

    Ok(())
}

#[cfg(not(unix))]
fn check_private(_path: &Path, _metadata: &std::fs::Metadata) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: StorageBackend, auth_file: Option<&str>) -> Config {
        Config {
            pages: PagesConfig::default(),
            server: ServerConfig::default(),
            storage: StorageConfig {
                backend,
                data_dir: "./data".to_string(),
                mongo: MongoConfig {
                    auth_file: auth_file.map(str::to_string),
                    ..Default::default()
                },
            },
        }
    }

    #[test]
    fn test_mongo_requires_auth_file() {
        assert!(matches!(
            config(StorageBackend::Mongo, None).validate(),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(config(StorageBackend::Mongo, Some("/etc/share-images/auth.json"))
            .validate()
            .is_ok());
        assert!(config(StorageBackend::Embedded, None).validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = config(StorageBackend::Embedded, None);
        config.server.request_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_parsing() {
        assert_eq!(parse_timeout_secs("45").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_timeout_secs(" 5 ").unwrap(), Duration::from_secs(5));
        for bad in ["", "thirty", "-1", "1.5"] {
            assert!(
                matches!(parse_timeout_secs(bad), Err(ConfigError::ValidationError(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_credential_debug_hides_password() {
        let credential = Credential {
            auth_source: "admin".to_string(),
            username: "uploader".to_string(),
            password: "hunter2".to_string(),
        };

        let rendered = format!("{credential:?}");
        assert!(rendered.contains("uploader"));
        assert!(!rendered.contains("hunter2"));
    }

    #[cfg(unix)]
    mod auth_file {
        use std::os::unix::fs::PermissionsExt;

        use crate::config::{ConfigError, Credential};

        fn write_auth(dir: &tempfile::TempDir, body: &str, mode: u32) -> std::path::PathBuf {
            let path = dir.path().join("auth.json");
            std::fs::write(&path, body).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
            path
        }

        #[test]
        fn test_load_private_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = write_auth(
                &dir,
                r#"{"AuthSource": "admin", "Username": "uploader", "Password": "s3cret"}"#,
                0o600,
            );

            let credential = Credential::load(&path).unwrap();
            assert_eq!(credential.auth_source, "admin");
            assert_eq!(credential.username, "uploader");
            assert_eq!(credential.password, "s3cret");
        }

        #[test]
        fn test_load_accepts_lowercase_fields() {
            let dir = tempfile::tempdir().unwrap();
            let path = write_auth(
                &dir,
                r#"{"username": "uploader", "password": "s3cret"}"#,
                0o400,
            );

            let credential = Credential::load(&path).unwrap();
            assert_eq!(credential.auth_source, "");
            assert_eq!(credential.username, "uploader");
        }

        #[test]
        fn test_group_readable_file_rejected() {
            let dir = tempfile::tempdir().unwrap();
            let path = write_auth(
                &dir,
                r#"{"Username": "u", "Password": "p"}"#,
                0o640,
            );

            assert!(matches!(
                Credential::load(&path),
                Err(ConfigError::InsecureAuthFile(_))
            ));
        }

        #[test]
        fn test_malformed_file_rejected() {
            let dir = tempfile::tempdir().unwrap();
            let path = write_auth(&dir, "not json", 0o600);

            assert!(matches!(
                Credential::load(&path),
                Err(ConfigError::AuthFileFormat { .. })
            ));
        }

        #[test]
        fn test_missing_file_rejected() {
            assert!(matches!(
                Credential::load("/nonexistent/auth.json"),
                Err(ConfigError::AuthFile { .. })
            ));
        }
    }
}
