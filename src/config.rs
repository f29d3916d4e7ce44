use crate::error::{Error, Result};
use crate::mailer::{Encryption, SmtpConfig};
use crate::printer;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60 * 60;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ENV_FILE: &str = ".env";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub printer_ip: String,
    pub smtp: SmtpConfig,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    /// File holding SEND_EVERY/SEND_INTERVAL/NEXT_SEND. When it does not
    /// exist the schedule is kept in the process environment.
    pub schedule_file: PathBuf,
}

/// Path of the dotenv file named by `PRINTSTAT_ENV_FILE`, `.env` by default.
pub fn schedule_file<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    lookup("PRINTSTAT_ENV_FILE")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_FILE))
}

/// Loads `./.env`, then the configured schedule file, into the process
/// environment. Variables already set are not overridden. Returns the
/// schedule file path.
pub fn load_env() -> PathBuf {
    let _ = dotenvy::dotenv();
    let path = schedule_file(|key| std::env::var(key).ok());
    let _ = dotenvy::from_path(&path);
    path
}

impl AppConfig {
    /// Loads the dotenv files into the environment, then reads the settings.
    pub fn load() -> Result<Self> {
        load_env();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| Error::Configuration(format!("{key} is not set")))
        };
        let seconds = |key: &str, default: u64| -> Result<Duration> {
            match get(key) {
                None => Ok(Duration::from_secs(default)),
                Some(raw) => match raw.parse::<u64>() {
                    Ok(0) | Err(_) => Err(Error::Configuration(format!(
                        "{key} must be a positive number of seconds, got {raw:?}"
                    ))),
                    Ok(secs) => Ok(Duration::from_secs(secs)),
                },
            }
        };

        let printer_ip = required("PRINTER_IP")?;
        printer::parse_address(&printer_ip)?;

        let port_raw = required("SMTP_PORT")?;
        let port = port_raw
            .parse::<u16>()
            .map_err(|_| Error::Configuration(format!("invalid SMTP_PORT {port_raw:?}")))?;

        let encryption = get("ENCRYPTION")
            .unwrap_or_default()
            .parse::<Encryption>()
            .unwrap_or(Encryption::None);

        let smtp = SmtpConfig {
            server: required("SMTP_SERVER")?,
            port,
            login: required("EMAIL_LOGIN")?,
            password: lookup("EMAIL_PASSWORD").unwrap_or_default(),
            receiver: required("EMAIL_RECEIVER")?,
            encryption,
            timeout: seconds("SMTP_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
        };

        Ok(Self {
            printer_ip,
            smtp,
            poll_interval: seconds("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?,
            fetch_timeout: seconds("FETCH_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
            schedule_file: schedule_file(&lookup),
        })
    }
}
