//! Funnel events mirrored to the advertising pixels and the conversion API.

use core::fmt;

use serde::{Deserialize, Serialize};

/// A step of the visitor funnel worth reporting.
///
/// The snake_case form (`as_str`) is the wire name used by the conversion
/// relay; `pixel_name` is the name the browser pixels expect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FunnelEvent {
    Lead,
    InitiateCheckout,
    CompleteRegistration,
    Purchase,
    AddToCart,
    ViewContent,
    PageView,
    Custom(String),
}

impl FunnelEvent {
    /// Parse a wire event type. Unknown names become [`FunnelEvent::Custom`].
    #[must_use]
    pub fn parse(event_type: &str) -> Self {
        match event_type.trim() {
            "lead" => Self::Lead,
            "initiate_checkout" => Self::InitiateCheckout,
            "complete_registration" => Self::CompleteRegistration,
            "purchase" => Self::Purchase,
            "add_to_cart" => Self::AddToCart,
            "view_content" => Self::ViewContent,
            "page_view" => Self::PageView,
            other => Self::Custom(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Lead => "lead",
            Self::InitiateCheckout => "initiate_checkout",
            Self::CompleteRegistration => "complete_registration",
            Self::Purchase => "purchase",
            Self::AddToCart => "add_to_cart",
            Self::ViewContent => "view_content",
            Self::PageView => "page_view",
            Self::Custom(name) => name,
        }
    }

    /// Event name understood by the Meta and Reddit pixels.
    #[must_use]
    pub const fn pixel_name(&self) -> &'static str {
        match self {
            Self::Lead => "Lead",
            Self::InitiateCheckout => "InitiateCheckout",
            Self::CompleteRegistration => "CompleteRegistration",
            Self::Purchase => "Purchase",
            Self::AddToCart => "AddToCart",
            Self::ViewContent => "ViewContent",
            Self::PageView => "PageView",
            Self::Custom(_) => "CustomEvent",
        }
    }

    #[must_use]
    pub const fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }

    /// Default `(content_name, content_category)` for relayed conversions.
    #[must_use]
    pub const fn default_content(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::Lead => Some(("CTA Click", "lead_generation")),
            Self::InitiateCheckout => Some(("Checkout Started", "checkout_initiation")),
            Self::CompleteRegistration => Some(("Onboarding Form", "form_completion")),
            _ => None,
        }
    }
}

impl From<String> for FunnelEvent {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<FunnelEvent> for String {
    fn from(event: FunnelEvent) -> Self {
        event.as_str().to_string()
    }
}

impl fmt::Display for FunnelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
