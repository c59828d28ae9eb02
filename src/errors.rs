use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormError {
    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Browser not launched")]
    BrowserNotLaunched,

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Option '{value}' not found in {selector}")]
    OptionNotFound { selector: String, value: String },

    #[error("JavaScript execution failed: {0}")]
    JavaScriptFailed(String),

    #[error("Screenshot failed: {0}")]
    ScreenshotFailed(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("File not found: {0}")]
    FileMissing(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("LLM request failed: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Required field could not be filled: {0}")]
    RequiredFieldFailed(String),

    #[error("No form fields found on {0}")]
    NoFormFields(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Chrome error: {0}")]
    ChromeError(String),
}

pub type Result<T> = std::result::Result<T, FormError>;

impl FormError {
    pub fn from_any_error<E: std::fmt::Display>(err: E) -> Self {
        FormError::ChromeError(err.to_string())
    }

    /// True when the page context disappeared underneath a query, e.g. the
    /// document navigated away while a script was running.
    pub fn is_context_lost(&self) -> bool {
        match self {
            FormError::JavaScriptFailed(msg) | FormError::ChromeError(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("context was destroyed")
                    || msg.contains("cannot find context")
                    || msg.contains("target closed")
                    || msg.contains("no node with given id")
            }
            FormError::NavigationFailed(_) => true,
            _ => false,
        }
    }
}
