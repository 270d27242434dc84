use thiserror::Error;

/// Errors produced by page analysis and the extraction pipeline
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Failed to connect to browser: {0}")]
    ConnectionFailed(String),

    #[error("Tab operation failed: {0}")]
    TabOperationFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("JavaScript evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("Screenshot failed: {0}")]
    ScreenshotFailed(String),

    #[error("Action '{action}' failed: {reason}")]
    ActionFailed { action: String, reason: String },

    #[error("Decision model request failed: {0}")]
    ModelRequestFailed(String),

    #[error("Malformed decision model response: {0}")]
    MalformedResponse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Item source could not be initialized: {0}")]
    SourceInit(String),

    #[error("Image processing failed: {0}")]
    Image(String),

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScrapeError::ActionFailed {
            action: "click".to_string(),
            reason: "detached".to_string(),
        };
        assert_eq!(err.to_string(), "Action 'click' failed: detached");
    }
}
