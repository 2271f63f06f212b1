use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Payment scenario for the dummy gateway.
/// Simulates different card outcomes for testing purposes, keyed off the card token the
/// caller hands in (`tok_<scenario>`), similar to Stripe's test tokens.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[derive(Default)]
pub enum PaymentScenario {
    /// Card is accepted
    #[default]
    Success,
    /// Card is declined
    Decline,
    /// Insufficient funds
    InsufficientFunds,
    /// Card is expired
    ExpiredCard,
    /// Processing error
    ProcessingError,
}

impl PaymentScenario {
    /// Human-readable description of the scenario
    pub fn description(&self) -> &'static str {
        match self {
            PaymentScenario::Success => "Card is accepted",
            PaymentScenario::Decline => "Card is declined",
            PaymentScenario::InsufficientFunds => "Card has insufficient funds",
            PaymentScenario::ExpiredCard => "Card is expired",
            PaymentScenario::ProcessingError => "Payment processing error",
        }
    }

    /// Test token that triggers this scenario
    pub fn test_token(&self) -> String {
        format!("tok_{}", self.as_ref())
    }

    /// Detect scenario from a card token. Unknown tokens are accepted.
    pub fn from_card_token(token: &str) -> Self {
        token
            .strip_prefix("tok_")
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    /// Whether this scenario results in a failed payment
    pub fn is_failure(&self) -> bool {
        !matches!(self, PaymentScenario::Success)
    }

    /// Get the error message for failed scenarios
    pub fn error_message(&self) -> Option<&'static str> {
        match self {
            PaymentScenario::Success => None,
            PaymentScenario::Decline => Some("Your card was declined."),
            PaymentScenario::InsufficientFunds => Some("Your card has insufficient funds."),
            PaymentScenario::ExpiredCard => Some("Your card has expired."),
            PaymentScenario::ProcessingError => {
                Some("An error occurred while processing your card.")
            }
        }
    }

    /// All available scenarios
    pub fn all() -> &'static [PaymentScenario] {
        &[
            PaymentScenario::Success,
            PaymentScenario::Decline,
            PaymentScenario::InsufficientFunds,
            PaymentScenario::ExpiredCard,
            PaymentScenario::ProcessingError,
        ]
    }
}
