//! Fare payment events published to bus channels.
//!
//! The hub treats payloads as opaque; these are the shapes the fare flow
//! publishes so that bus displays can show the outcome of a card tap.

use serde::{Deserialize, Serialize};

/// Outcome of a fare charge, as pushed to the bus's channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FareEvent {
    /// The fare was charged.
    Success(FareReceipt),

    /// The fare could not be charged.
    Error {
        /// Failure details.
        error: FareFailure,
    },
}

/// Rider details and balances after a successful charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FareReceipt {
    /// Rider ID.
    pub id: String,
    /// Rider avatar URL.
    pub image: Option<String>,
    /// Rider first name.
    pub name: String,
    /// Rider last name.
    pub surname: String,
    /// Fare charged.
    pub fare: f64,
    /// Balance before the charge.
    pub old_balance: f64,
    /// Balance after the charge.
    pub balance: f64,
}

impl FareReceipt {
    /// Builds a receipt for charging `fare` against `old_balance`.
    #[must_use]
    pub fn charge(
        id: impl Into<String>,
        name: impl Into<String>,
        surname: impl Into<String>,
        fare: f64,
        old_balance: f64,
    ) -> Self {
        Self {
            id: id.into(),
            image: None,
            name: name.into(),
            surname: surname.into(),
            fare,
            old_balance,
            balance: old_balance - fare,
        }
    }

    /// Sets the rider avatar.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }
}

/// Why a fare could not be charged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FareFailure {
    /// Failure kind.
    #[serde(rename = "type")]
    pub kind: FareErrorKind,
    /// Human-readable message for the bus display.
    pub message: String,
}

/// Fare failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FareErrorKind {
    /// No rider is linked to the tapped card.
    UserNotFound,
    /// The rider cannot afford the fare.
    InsufficientBalance,
}

impl FareEvent {
    /// Creates a success event.
    #[must_use]
    pub fn success(receipt: FareReceipt) -> Self {
        Self::Success(receipt)
    }

    /// Creates an error event.
    #[must_use]
    pub fn error(kind: FareErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            error: FareFailure {
                kind,
                message: message.into(),
            },
        }
    }

    /// The tapped card is not linked to any rider.
    #[must_use]
    pub fn user_not_found() -> Self {
        Self::error(
            FareErrorKind::UserNotFound,
            "Nenhum usuário encontrado com este cartão",
        )
    }

    /// The rider's balance does not cover the fare.
    #[must_use]
    pub fn insufficient_balance(balance: f64) -> Self {
        Self::error(
            FareErrorKind::InsufficientBalance,
            format!("Saldo insuficiente, Saldo: R$ {balance:.2}"),
        )
    }

    /// Returns true for success events.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_success_shape() {
        let event = FareEvent::success(
            FareReceipt::charge("u-1", "Ana", "Silva", 4.5, 17.0).with_image("a.png"),
        );

        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(
            value,
            json!({
                "type": "success",
                "id": "u-1",
                "image": "a.png",
                "name": "Ana",
                "surname": "Silva",
                "fare": 4.5,
                "old_balance": 17.0,
                "balance": 12.5,
            })
        );
        assert!(event.is_success());
    }

    #[test]
    fn test_user_not_found_shape() {
        let value = serde_json::to_value(FareEvent::user_not_found()).expect("serialize");
        assert_eq!(value["type"], "error");
        assert_eq!(value["error"]["type"], "USER_NOT_FOUND");
        assert_eq!(
            value["error"]["message"],
            "Nenhum usuário encontrado com este cartão"
        );
    }

    #[test]
    fn test_insufficient_balance_message() {
        let event = FareEvent::insufficient_balance(3.2);
        let value = serde_json::to_value(&event).expect("serialize");

        assert_eq!(value["error"]["type"], "INSUFFICIENT_BALANCE");
        assert_eq!(
            value["error"]["message"],
            "Saldo insuficiente, Saldo: R$ 3.20"
        );
        assert!(!event.is_success());
    }

    #[test]
    fn test_deserialize_error_event() {
        let raw = r#"{"type":"error","error":{"type":"USER_NOT_FOUND","message":"nope"}}"#;
        let event: FareEvent = serde_json::from_str(raw).expect("deserialize");
        assert_eq!(event, FareEvent::error(FareErrorKind::UserNotFound, "nope"));
    }
}
