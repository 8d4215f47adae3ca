use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Username/password pair the login form is checked against.
///
/// This is a gate, not a security boundary: the comparison is a plain string
/// match with no hashing or rate limiting.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn matches(&self, username: &str, password: &str) -> bool {
        self.username == username && self.password == password
    }
}

/// SMTP settings for the optional "processed file ready" e-mail.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Recipient of the notification
    pub to: String,

    /// Sender address, also used as the SMTP login
    pub from: String,

    /// SMTP relay host (STARTTLS)
    pub smtp_host: String,

    /// SMTP relay port
    pub smtp_port: u16,

    /// SMTP password, taken from `EMAIL_PASSWORD`
    pub password: String,
}

/// Runtime configuration for the extractor service
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the web server listens on (default: 127.0.0.1:3000)
    pub bind_addr: SocketAddr,

    /// Login credentials (default: admin / password)
    pub credentials: Credentials,

    /// Remote processing endpoint receiving the multipart upload
    pub remote_endpoint: String,

    /// Staging directory for uploaded spreadsheets (default: "uploads")
    pub upload_dir: PathBuf,

    /// Staging directory for processed results (default: "results")
    pub result_dir: PathBuf,

    /// Reference spreadsheet offered for download on the upload page
    pub sample_file: PathBuf,

    /// Accepted upload extensions, lowercase and without the dot
    pub allowed_extensions: Vec<String>,

    /// Maximum accepted request body in bytes (default: 50 MB)
    pub max_upload_bytes: usize,

    /// Idle lifetime of a login session (default: 24 hours)
    pub session_ttl: Duration,

    /// E-mail notification, enabled only when a recipient and password are set
    pub notify: Option<NotifyConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            credentials: Credentials {
                username: "admin".to_string(),
                password: "password".to_string(),
            },
            remote_endpoint: "http://34.74.243.157:5010/upload/".to_string(),
            upload_dir: PathBuf::from("uploads"),
            result_dir: PathBuf::from("results"),
            sample_file: PathBuf::from("sample/Jio-poc-sample.xlsx"),
            allowed_extensions: vec!["xlsx".to_string(), "xls".to_string()],
            max_upload_bytes: 50 * 1024 * 1024, // 50 MB
            session_ttl: Duration::from_secs(24 * 60 * 60),
            notify: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Missing or unparseable values fall back to [`Config::default`].
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        let credentials = Credentials {
            username: lookup("EXTRACTOR_USERNAME").unwrap_or(default.credentials.username),
            password: lookup("EXTRACTOR_PASSWORD").unwrap_or(default.credentials.password),
        };

        let allowed_extensions = lookup("EXTRACTOR_ALLOWED_EXTENSIONS")
            .map(|v| parse_extensions(&v))
            .filter(|exts| !exts.is_empty())
            .unwrap_or(default.allowed_extensions);

        let notify = match (lookup("EXTRACTOR_NOTIFY_TO"), lookup("EMAIL_PASSWORD")) {
            (Some(to), Some(password)) if !to.is_empty() && !password.is_empty() => {
                Some(NotifyConfig {
                    to,
                    from: lookup("EXTRACTOR_NOTIFY_FROM")
                        .unwrap_or_else(|| "noreply@localhost".to_string()),
                    smtp_host: lookup("EXTRACTOR_SMTP_HOST")
                        .unwrap_or_else(|| "smtp.gmail.com".to_string()),
                    smtp_port: lookup("EXTRACTOR_SMTP_PORT")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(587),
                    password,
                })
            }
            _ => None,
        };

        Self {
            bind_addr: lookup("EXTRACTOR_BIND")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.bind_addr),

            credentials,

            remote_endpoint: lookup("EXTRACTOR_REMOTE_URL").unwrap_or(default.remote_endpoint),

            upload_dir: lookup("EXTRACTOR_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),

            result_dir: lookup("EXTRACTOR_RESULT_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.result_dir),

            sample_file: lookup("EXTRACTOR_SAMPLE_FILE")
                .map(PathBuf::from)
                .unwrap_or(default.sample_file),

            allowed_extensions,

            max_upload_bytes: lookup("EXTRACTOR_MAX_UPLOAD_BYTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_upload_bytes),

            session_ttl: lookup("EXTRACTOR_SESSION_TTL_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.session_ttl),

            notify,
        }
    }

    /// Whether `filename` carries one of the accepted spreadsheet extensions
    pub fn accepts(&self, filename: &str) -> bool {
        extension_of(filename)
            .map(|ext| self.allowed_extensions.iter().any(|a| *a == ext))
            .unwrap_or(false)
    }
}

/// Lowercased extension of `filename`, if it has one
pub fn extension_of(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

fn parse_extensions(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
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
        assert_eq!(config.credentials.username, "admin");
        assert_eq!(config.credentials.password, "password");
        assert_eq!(config.allowed_extensions, vec!["xlsx", "xls"]);
        assert_eq!(config.bind_addr.port(), 3000);
        assert!(config.notify.is_none());
    }

    #[test]
    fn test_lookup_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("EXTRACTOR_USERNAME", "operator"),
            ("EXTRACTOR_REMOTE_URL", "http://localhost:9000/upload/"),
            ("EXTRACTOR_ALLOWED_EXTENSIONS", " .XLSX, csv ,"),
            ("EXTRACTOR_SESSION_TTL_SECS", "60"),
        ]));
        assert_eq!(config.credentials.username, "operator");
        assert_eq!(config.credentials.password, "password");
        assert_eq!(config.remote_endpoint, "http://localhost:9000/upload/");
        assert_eq!(config.allowed_extensions, vec!["xlsx", "csv"]);
        assert_eq!(config.session_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = Config::from_lookup(lookup_from(&[
            ("EXTRACTOR_BIND", "not an address"),
            ("EXTRACTOR_MAX_UPLOAD_BYTES", "lots"),
        ]));
        assert_eq!(config.bind_addr, Config::default().bind_addr);
        assert_eq!(config.max_upload_bytes, Config::default().max_upload_bytes);
    }

    #[test]
    fn test_notify_needs_recipient_and_password() {
        let config = Config::from_lookup(lookup_from(&[("EMAIL_PASSWORD", "secret")]));
        assert!(config.notify.is_none());

        let config = Config::from_lookup(lookup_from(&[
            ("EMAIL_PASSWORD", "secret"),
            ("EXTRACTOR_NOTIFY_TO", "ops@example.com"),
        ]));
        let notify = config.notify.expect("notification enabled");
        assert_eq!(notify.to, "ops@example.com");
        assert_eq!(notify.smtp_port, 587);
    }

    #[test]
    fn test_accepts_extensions_case_insensitively() {
        let config = Config::default();
        assert!(config.accepts("data.xlsx"));
        assert!(config.accepts("DATA.XLS"));
        assert!(!config.accepts("data.csv"));
        assert!(!config.accepts("xlsx"));
        assert!(!config.accepts("archive.xlsx.zip"));
    }
}
