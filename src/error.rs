use thiserror::Error;

#[derive(Error, Debug)]
pub enum Offboard365Error {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Graph API error: {0}")]
    GraphApiError(String),

    #[error("Exchange Online error: {0}")]
    ExchangeApiError(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Token not found. Run 'offboard365 tenant add' with a client secret first")]
    TokenNotFound,

    #[error("Tenant '{0}' not found")]
    TenantNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No directory object matches '{0}'")]
    NotFound(String),

    #[error("Capability not available: {0}")]
    MissingCapability(String),

    #[error("Precondition not met: {0}")]
    PreconditionUnmet(String),

    #[error("On-premises directory error: {0}")]
    OnPremError(String),
}

pub type Result<T> = std::result::Result<T, Offboard365Error>;

pub use Offboard365Error as Error;

impl Offboard365Error {
    /// Skip-style failures are reported as "skipped" rather than "failed".
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Offboard365Error::MissingCapability(_) | Offboard365Error::PreconditionUnmet(_)
        )
    }
}

/// Parse Graph API error response and provide helpful context
pub fn enhance_graph_error(error_response: &str) -> String {
    if let Ok(error_json) = serde_json::from_str::<serde_json::Value>(error_response) {
        if let Some(error_obj) = error_json.get("error") {
            let code = error_obj
                .get("code")
                .and_then(|c| c.as_str())
                .unwrap_or("Unknown");
            let message = error_obj
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("No message");

            let hint = match code {
                "Unauthorized" | "InvalidAuthenticationToken" => {
                    "\nHint: the access token may have expired. Delete the token cache or re-run with a valid client secret."
                }
                "Forbidden" | "Authorization_RequestDenied" | "InsufficientPrivileges" => {
                    "\nHint: the app registration needs User.ReadWrite.All, Group.ReadWrite.All and Directory.ReadWrite.All with admin consent."
                }
                "Request_ResourceNotFound" | "NotFound" => {
                    "\nHint: the object does not exist or was already removed."
                }
                "TooManyRequests" => "\nHint: API rate limit exceeded. Wait a moment and try again.",
                _ => "",
            };

            return format!("{}: {}{}", code, message, hint);
        }
    }

    error_response.to_string()
}
