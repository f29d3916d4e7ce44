//! Error types shared by the scheduler, the device client and the mailer.

/// Everything that can go wrong during a polling cycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad schedule or application settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The device address is not an IPv4/IPv6 literal.
    #[error("invalid device address: {0:?}")]
    InvalidAddress(String),

    /// The report could not be downloaded (transport failure or non-200 status).
    #[error("failed to fetch report: {0}")]
    Fetch(String),

    /// Field extraction was attempted before a report was fetched.
    #[error("no report has been fetched from the device")]
    ReportUnavailable,

    /// The report does not have the expected table layout.
    #[error("unexpected report layout: {0}")]
    ReportFormat(String),

    /// Registering the executable to run at login failed.
    #[error("autostart registration failed: {0}")]
    Autostart(String),

    /// The SMTP server rejected or never received the message.
    #[error("mail delivery failed: {0}")]
    MailDelivery(String),

    /// Reading or rewriting the persisted schedule failed.
    #[error("schedule store error: {0}")]
    Store(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
