//! Human-in-the-loop hand-off for captcha and login walls

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the human is asked to do in the browser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Captcha,
    Login,
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionKind::Captcha => write!(f, "captcha"),
            InteractionKind::Login => write!(f, "login"),
        }
    }
}

/// Hands control of the browser to a person and waits until they are done
#[async_trait]
pub trait HumanEscalation: Send + Sync {
    /// Returns a free-form completion note once the person signals they are finished
    async fn web_interaction(&self, message: &str, url: &str, action: InteractionKind) -> Result<String>;
}

/// Message shown to the person for a detected wall
pub fn escalation_message(action: InteractionKind, url: &str) -> String {
    match action {
        InteractionKind::Captcha => format!(
            "A captcha is blocking {}. Please solve it in the browser window, then confirm.",
            url
        ),
        InteractionKind::Login => format!(
            "{} requires signing in. Please log in in the browser window, then confirm.",
            url
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interaction_kind_serde() {
        assert_eq!(serde_json::to_value(InteractionKind::Captcha).unwrap(), "captcha");
        let kind: InteractionKind = serde_json::from_str("\"login\"").unwrap();
        assert_eq!(kind, InteractionKind::Login);
        assert_eq!(kind.to_string(), "login");
    }

    #[test]
    fn test_escalation_message() {
        let message = escalation_message(InteractionKind::Login, "https://example.com");
        assert!(message.contains("https://example.com"));
        assert!(message.contains("log in"));
    }
}
