//! Checkout state machine and amount policy.
//!
//! ```text
//! Idle -> OrderCreated -> Approved -> Captured
//!              |             |
//!              +-> Failed <--+
//!              +-> Cancelled <+
//! ```
//!
//! A new order may be created from `Idle`, `Failed` or `Cancelled`, or from
//! `OrderCreated` when the visitor abandons the popup and starts again.
//! Nothing leaves `Captured`.

use match_magnet_core::{Money, PaymentId, PricingPackage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid checkout transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// The action is not allowed from the current state.
    #[error("cannot {action} while checkout is {state}")]
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },

    /// The request refers to a different order than the session.
    #[error("order {0} does not belong to this checkout")]
    OrderMismatch(String),
}

/// Where a visitor's checkout stands. Stored in the session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CheckoutState {
    #[default]
    Idle,
    OrderCreated {
        order_id: String,
    },
    Approved {
        order_id: String,
    },
    Captured {
        order_id: String,
        payment_id: PaymentId,
    },
    Failed {
        order_id: String,
        reason: String,
    },
    Cancelled {
        order_id: String,
    },
}

impl CheckoutState {
    /// Short state name for messages and logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::OrderCreated { .. } => "order_created",
            Self::Approved { .. } => "approved",
            Self::Captured { .. } => "captured",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// The order the state refers to, if any.
    #[must_use]
    pub fn order_id(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::OrderCreated { order_id }
            | Self::Approved { order_id }
            | Self::Captured { order_id, .. }
            | Self::Failed { order_id, .. }
            | Self::Cancelled { order_id } => Some(order_id),
        }
    }

    const fn invalid(&self, action: &'static str) -> CheckoutError {
        CheckoutError::InvalidTransition {
            state: self.name(),
            action,
        }
    }

    fn check_order(&self, order_id: &str) -> Result<(), CheckoutError> {
        if self.order_id() == Some(order_id) {
            Ok(())
        } else {
            Err(CheckoutError::OrderMismatch(order_id.to_string()))
        }
    }

    /// A provider order was created.
    ///
    /// # Errors
    ///
    /// Fails once the checkout is captured or while an order awaits capture.
    pub fn order_created(self, order_id: impl Into<String>) -> Result<Self, CheckoutError> {
        self.check_can_create_order()?;
        Ok(Self::OrderCreated {
            order_id: order_id.into(),
        })
    }

    /// Check that a new order may be created, before asking the provider.
    ///
    /// # Errors
    ///
    /// Fails once the checkout is captured or while an order awaits capture.
    pub const fn check_can_create_order(&self) -> Result<(), CheckoutError> {
        match self {
            Self::Idle
            | Self::OrderCreated { .. }
            | Self::Failed { .. }
            | Self::Cancelled { .. } => Ok(()),
            Self::Approved { .. } | Self::Captured { .. } => Err(self.invalid("create an order")),
        }
    }

    /// The visitor approved the order in the popup.
    ///
    /// # Errors
    ///
    /// Fails unless the state is `OrderCreated` for the same order.
    pub fn approve(self, order_id: &str) -> Result<Self, CheckoutError> {
        match &self {
            Self::OrderCreated { .. } => {
                self.check_order(order_id)?;
                Ok(Self::Approved {
                    order_id: order_id.to_string(),
                })
            }
            _ => Err(self.invalid("approve")),
        }
    }

    /// The approved order was captured and recorded under `payment_id`.
    ///
    /// # Errors
    ///
    /// Fails unless the state is `Approved`.
    pub fn captured(self, payment_id: PaymentId) -> Result<Self, CheckoutError> {
        match self {
            Self::Approved { order_id } => Ok(Self::Captured {
                order_id,
                payment_id,
            }),
            other => Err(other.invalid("capture")),
        }
    }

    /// Order creation or capture failed.
    ///
    /// # Errors
    ///
    /// Fails unless an order is pending (`OrderCreated` or `Approved`).
    pub fn failed(self, reason: impl Into<String>) -> Result<Self, CheckoutError> {
        match self {
            Self::OrderCreated { order_id } | Self::Approved { order_id } => Ok(Self::Failed {
                order_id,
                reason: reason.into(),
            }),
            other => Err(other.invalid("fail")),
        }
    }

    /// The visitor closed the popup.
    ///
    /// # Errors
    ///
    /// Fails unless an order for `order_id` is pending.
    pub fn cancelled(self, order_id: &str) -> Result<Self, CheckoutError> {
        match &self {
            Self::OrderCreated { .. } | Self::Approved { .. } => {
                self.check_order(order_id)?;
                Ok(Self::Cancelled {
                    order_id: order_id.to_string(),
                })
            }
            _ => Err(self.invalid("cancel")),
        }
    }
}

/// Decides what a checkout charges.
///
/// The selected package price, unless a fixed amount is configured for live
/// testing.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmountPolicy {
    fixed: Option<Money>,
}

impl AmountPolicy {
    #[must_use]
    pub const fn new(fixed: Option<Money>) -> Self {
        Self { fixed }
    }

    #[must_use]
    pub fn amount_for(&self, package: &PricingPackage) -> Money {
        self.fixed.unwrap_or(package.price)
    }

    #[must_use]
    pub const fn is_fixed(&self) -> bool {
        self.fixed.is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let payment_id = PaymentId::generate();
        let state = CheckoutState::Idle
            .order_created("ORDER-1")
            .unwrap()
            .approve("ORDER-1")
            .unwrap()
            .captured(payment_id)
            .unwrap();
        assert_eq!(
            state,
            CheckoutState::Captured {
                order_id: "ORDER-1".to_string(),
                payment_id
            }
        );
    }

    #[test]
    fn test_capture_requires_approval() {
        let err = CheckoutState::Idle
            .order_created("ORDER-1")
            .unwrap()
            .captured(PaymentId::generate())
            .unwrap_err();
        assert_eq!(
            err,
            CheckoutError::InvalidTransition {
                state: "order_created",
                action: "capture"
            }
        );
    }

    #[test]
    fn test_approve_checks_order_id() {
        let err = CheckoutState::Idle
            .order_created("ORDER-1")
            .unwrap()
            .approve("ORDER-2")
            .unwrap_err();
        assert_eq!(err, CheckoutError::OrderMismatch("ORDER-2".to_string()));
    }

    #[test]
    fn test_failure_and_retry() {
        let failed = CheckoutState::Idle
            .order_created("ORDER-1")
            .unwrap()
            .approve("ORDER-1")
            .unwrap()
            .failed("INSTRUMENT_DECLINED")
            .unwrap();
        assert_eq!(failed.name(), "failed");

        let retried = failed.order_created("ORDER-2").unwrap();
        assert_eq!(retried.order_id(), Some("ORDER-2"));
    }

    #[test]
    fn test_cancel_from_pending_only() {
        let cancelled = CheckoutState::Idle
            .order_created("ORDER-1")
            .unwrap()
            .cancelled("ORDER-1")
            .unwrap();
        assert_eq!(cancelled.name(), "cancelled");
        assert!(CheckoutState::Idle.cancelled("ORDER-1").is_err());
    }

    #[test]
    fn test_captured_is_terminal() {
        let captured = CheckoutState::Captured {
            order_id: "ORDER-1".to_string(),
            payment_id: PaymentId::generate(),
        };
        assert!(captured.clone().order_created("ORDER-2").is_err());
        assert!(captured.clone().failed("late").is_err());
        assert!(captured.cancelled("ORDER-1").is_err());
    }

    #[test]
    fn test_state_serializes_tagged() {
        let state = CheckoutState::OrderCreated {
            order_id: "ORDER-1".to_string(),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "order_created");
        let back: CheckoutState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_amount_policy() {
        let package = PricingPackage::default_package();
        assert_eq!(AmountPolicy::default().amount_for(&package), package.price);

        let fixed = AmountPolicy::new(Some(Money::usd_cents(100)));
        assert!(fixed.is_fixed());
        assert_eq!(fixed.amount_for(&package), Money::usd_cents(100));
    }
}
