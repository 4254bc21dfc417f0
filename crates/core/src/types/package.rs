//! Pricing package catalog.

use serde::Serialize;

use super::price::Money;

/// A purchasable package shown on the landing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricingPackage {
    pub id: &'static str,
    pub name: &'static str,
    pub price: Money,
    pub original_price: Money,
    pub description: &'static str,
    pub features: &'static [&'static str],
    pub popular: bool,
}

const STARTER_FEATURES: &[&str] = &[
    "5 AI-enhanced photos",
    "Profile bio review",
    "Delivered in 48 hours",
];

const MOST_MATCHES_FEATURES: &[&str] = &[
    "15 AI-enhanced photos",
    "Full profile rewrite",
    "Conversation starter pack",
    "Delivered in 24 hours",
];

const VIP_FEATURES: &[&str] = &[
    "30 AI-enhanced photos",
    "Full profile rewrite",
    "Conversation starter pack",
    "Monthly profile refresh",
    "Priority delivery",
];

impl PricingPackage {
    pub const DEFAULT_ID: &'static str = "most-matches";

    /// The full catalog in display order.
    #[must_use]
    pub fn all() -> Vec<Self> {
        vec![
            Self {
                id: "starter",
                name: "Starter",
                price: Money::usd_cents(3900),
                original_price: Money::usd_cents(6900),
                description: "A quick refresh for your dating profile",
                features: STARTER_FEATURES,
                popular: false,
            },
            Self {
                id: Self::DEFAULT_ID,
                name: "Most Matches",
                price: Money::usd_cents(6900),
                original_price: Money::usd_cents(11900),
                description: "Everything you need to stand out",
                features: MOST_MATCHES_FEATURES,
                popular: true,
            },
            Self {
                id: "vip",
                name: "VIP",
                price: Money::usd_cents(9900),
                original_price: Money::usd_cents(17900),
                description: "The complete dating profile makeover",
                features: VIP_FEATURES,
                popular: false,
            },
        ]
    }

    /// Look up a package by id.
    #[must_use]
    pub fn find(id: &str) -> Option<Self> {
        Self::all().into_iter().find(|package| package.id == id)
    }

    /// The package preselected when a visitor has not chosen one.
    #[must_use]
    pub fn default_package() -> Self {
        Self::find(Self::DEFAULT_ID).unwrap_or_else(|| Self::all().remove(0))
    }

    /// Whole-percent savings against the original price.
    #[must_use]
    pub fn savings_percent(&self) -> u32 {
        use rust_decimal::prelude::ToPrimitive;

        if self.original_price.amount.is_zero() {
            return 0;
        }
        let saved = (self.original_price.amount - self.price.amount) / self.original_price.amount;
        (saved * rust_decimal::Decimal::ONE_HUNDRED)
            .round()
            .to_u32()
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_prices() {
        let starter = PricingPackage::find("starter").unwrap();
        assert_eq!(starter.price.display(), "$39.00");
        assert_eq!(starter.original_price.display(), "$69.00");

        let vip = PricingPackage::find("vip").unwrap();
        assert_eq!(vip.price.value_string(), "99.00");
    }

    #[test]
    fn test_default_package_is_popular() {
        let package = PricingPackage::default_package();
        assert_eq!(package.id, "most-matches");
        assert!(package.popular);
        assert_eq!(PricingPackage::all().iter().filter(|p| p.popular).count(), 1);
    }

    #[test]
    fn test_find_unknown() {
        assert!(PricingPackage::find("platinum").is_none());
    }

    #[test]
    fn test_savings_percent() {
        // (69 - 39) / 69 = 43.47%
        assert_eq!(PricingPackage::find("starter").unwrap().savings_percent(), 43);
        // (119 - 69) / 119 = 42.01%
        assert_eq!(PricingPackage::default_package().savings_percent(), 42);
    }
}
