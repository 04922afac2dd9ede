use crate::{common::round_money, config::PricingConfig, entities::LineItem};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The four checkout amounts derived from a set of line items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    #[serde(with = "crate::common::money")]
    pub items_price: Decimal,
    #[serde(with = "crate::common::money")]
    pub shipping_price: Decimal,
    #[serde(with = "crate::common::money")]
    pub tax_price: Decimal,
    #[serde(with = "crate::common::money")]
    pub total_price: Decimal,
}

impl PriceBreakdown {
    pub fn zero() -> Self {
        Self {
            items_price: round_money(Decimal::ZERO),
            shipping_price: round_money(Decimal::ZERO),
            tax_price: round_money(Decimal::ZERO),
            total_price: round_money(Decimal::ZERO),
        }
    }
}

/// Pure price calculator over cart lines.
#[derive(Debug, Clone)]
pub struct PricingService {
    config: PricingConfig,
}

impl PricingService {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Computes items, shipping, tax and total for `items`.
    ///
    /// Shipping is waived only when the items total is strictly above the free
    /// shipping threshold. An empty list prices to all zeros.
    pub fn calculate(&self, items: &[LineItem]) -> PriceBreakdown {
        if items.is_empty() {
            return PriceBreakdown::zero();
        }

        let items_price = round_money(
            items
                .iter()
                .map(|item| item.price * Decimal::from(item.qty))
                .sum(),
        );

        let shipping_price = if items_price > self.config.free_shipping_threshold {
            round_money(Decimal::ZERO)
        } else {
            round_money(self.config.flat_shipping_fee)
        };

        let tax_price = round_money(items_price * self.config.tax_rate);
        let total_price = round_money(items_price + shipping_price + tax_price);

        PriceBreakdown {
            items_price,
            shipping_price,
            tax_price,
            total_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn line(price: Decimal, qty: i32) -> LineItem {
        LineItem {
            product_id: Uuid::new_v4(),
            name: "Polo".into(),
            slug: "polo".into(),
            image: "/images/polo.jpg".into(),
            price,
            qty,
        }
    }

    fn service() -> PricingService {
        PricingService::new(PricingConfig::default())
    }

    #[test]
    fn prices_a_single_line_below_threshold() {
        let prices = service().calculate(&[line(dec!(25.00), 3)]);
        assert_eq!(prices.items_price, dec!(75.00));
        assert_eq!(prices.shipping_price, dec!(10.00));
        assert_eq!(prices.tax_price, dec!(11.25));
        assert_eq!(prices.total_price, dec!(96.25));
        assert_eq!(prices.total_price.to_string(), "96.25");
    }

    #[test]
    fn shipping_is_free_strictly_above_threshold() {
        let at = service().calculate(&[line(dec!(100.00), 1)]);
        assert_eq!(at.shipping_price, dec!(10));

        let above = service().calculate(&[line(dec!(100.01), 1)]);
        assert_eq!(above.shipping_price, dec!(0));
        assert_eq!(above.tax_price, dec!(15.00));
        assert_eq!(above.total_price, dec!(115.01));
    }

    #[test]
    fn tax_rounds_half_up_at_the_cent() {
        // 0.15 * 10.10 = 1.515
        let prices = service().calculate(&[line(dec!(10.10), 1)]);
        assert_eq!(prices.tax_price, dec!(1.52));
    }

    #[test]
    fn empty_cart_is_all_zero() {
        let prices = service().calculate(&[]);
        assert_eq!(prices, PriceBreakdown::zero());
        assert_eq!(prices.shipping_price.to_string(), "0.00");
    }

    #[test]
    fn honours_configured_rules() {
        let pricing = PricingService::new(PricingConfig {
            free_shipping_threshold: dec!(50),
            flat_shipping_fee: dec!(4.99),
            tax_rate: dec!(0.2),
            currency: "EUR".into(),
        });
        let prices = pricing.calculate(&[line(dec!(20), 2)]);
        assert_eq!(prices.shipping_price, dec!(4.99));
        assert_eq!(prices.tax_price, dec!(8.00));
        assert_eq!(prices.total_price, dec!(52.99));
    }
}
