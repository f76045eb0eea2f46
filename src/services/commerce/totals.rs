use crate::{
    entities::commerce::{CartItemModel, DiscountType, SalesRuleModel},
    services::commerce::tax::item_tax,
};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;
use uuid::Uuid;

/// Money is kept to cents, half away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineTotals {
    pub item_id: Uuid,
    pub sku: String,
    pub qty: i32,
    pub row_total: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub shipping_amount: Decimal,
    pub grand_total: Decimal,
    pub currency: String,
    pub items: Vec<LineTotals>,
}

impl CartTotals {
    pub fn subtotal_after_discount(&self) -> Decimal {
        self.subtotal - self.discount_amount
    }

    pub fn total_qty(&self) -> i32 {
        self.items.iter().map(|line| line.qty).sum()
    }

    pub fn with_shipping(mut self, shipping: Decimal) -> Self {
        self.shipping_amount = round_money(shipping);
        self.grand_total = round_money(
            self.subtotal - self.discount_amount + self.tax_amount + self.shipping_amount,
        );
        self
    }
}

/// Recomputes row totals, rule discounts and tax for a cart. Shipping starts at zero;
/// apply it with [`CartTotals::with_shipping`] once the discounted subtotal is known.
pub fn recalculate_totals(
    items: &[CartItemModel],
    rule: Option<&SalesRuleModel>,
    tax_rate: Decimal,
    currency: &str,
) -> CartTotals {
    let rows: Vec<Decimal> = items
        .iter()
        .map(|item| round_money(item.price * Decimal::from(item.qty)))
        .collect();
    let subtotal: Decimal = rows.iter().copied().sum();
    let discounts = line_discounts(items, &rows, subtotal, rule);

    let lines: Vec<LineTotals> = items
        .iter()
        .zip(rows.iter().zip(discounts.iter()))
        .map(|(item, (row_total, discount))| {
            let priced = CartItemModel {
                row_total: *row_total,
                discount_amount: *discount,
                ..item.clone()
            };
            LineTotals {
                item_id: item.id,
                sku: item.sku.clone(),
                qty: item.qty,
                row_total: *row_total,
                discount_amount: *discount,
                tax_amount: item_tax(&priced, tax_rate),
            }
        })
        .collect();

    let discount_amount: Decimal = lines.iter().map(|l| l.discount_amount).sum();
    let tax_amount: Decimal = lines.iter().map(|l| l.tax_amount).sum();

    CartTotals {
        subtotal,
        discount_amount,
        tax_amount,
        shipping_amount: Decimal::ZERO,
        grand_total: round_money(subtotal - discount_amount + tax_amount),
        currency: currency.to_string(),
        items: lines,
    }
}

fn line_discounts(
    items: &[CartItemModel],
    rows: &[Decimal],
    subtotal: Decimal,
    rule: Option<&SalesRuleModel>,
) -> Vec<Decimal> {
    let Some(rule) = rule else {
        return vec![Decimal::ZERO; items.len()];
    };

    match rule.discount_type {
        DiscountType::ByPercent => {
            let pct = rule.discount_amount.min(dec!(100)).max(Decimal::ZERO);
            rows.iter()
                .map(|row| round_money(*row * pct / dec!(100)))
                .collect()
        }
        DiscountType::ByFixed => items
            .iter()
            .zip(rows)
            .map(|(item, row)| {
                round_money(rule.discount_amount * Decimal::from(item.qty)).min(*row)
            })
            .collect(),
        DiscountType::CartFixed => {
            if subtotal <= Decimal::ZERO {
                return vec![Decimal::ZERO; items.len()];
            }
            let total = rule.discount_amount.min(subtotal).max(Decimal::ZERO);
            let mut remaining = total;
            let last = rows.len().saturating_sub(1);
            rows.iter()
                .enumerate()
                .map(|(idx, row)| {
                    // last line absorbs rounding so the split sums to the cart discount
                    let share = if idx == last {
                        remaining
                    } else {
                        round_money(total * *row / subtotal)
                    };
                    let share = share.min(remaining).min(*row).max(Decimal::ZERO);
                    remaining -= share;
                    share
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::commerce::CouponFormat;
    use chrono::Utc;
    use test_case::test_case;

    fn item(sku: &str, price: Decimal, qty: i32) -> CartItemModel {
        CartItemModel {
            id: Uuid::new_v4(),
            cart_id: Uuid::nil(),
            sku: sku.into(),
            name: sku.into(),
            qty,
            price,
            row_total: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            external_tax_amount: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn rule(discount_type: DiscountType, amount: Decimal) -> SalesRuleModel {
        SalesRuleModel {
            id: 1,
            store_id: None,
            name: "rule".into(),
            is_active: true,
            discount_type,
            discount_amount: amount,
            coupon_prefix: String::new(),
            coupon_suffix: String::new(),
            coupon_length: 8,
            coupon_format: CouponFormat::Alphanumeric,
            coupon_dash_every: 0,
            uses_per_coupon: 1,
            from_date: None,
            to_date: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn no_rule_means_no_discount() {
        let items = vec![item("A", dec!(10), 2), item("B", dec!(5.5), 1)];
        let totals = recalculate_totals(&items, None, dec!(0.1), "USD");
        assert_eq!(totals.subtotal, dec!(25.5));
        assert_eq!(totals.discount_amount, Decimal::ZERO);
        assert_eq!(totals.tax_amount, dec!(2.55));
        assert_eq!(totals.grand_total, dec!(28.05));
        assert_eq!(totals.total_qty(), 3);
    }

    #[test]
    fn percent_rule_discounts_each_line() {
        let items = vec![item("A", dec!(10), 2), item("B", dec!(30), 1)];
        let totals = recalculate_totals(
            &items,
            Some(&rule(DiscountType::ByPercent, dec!(10))),
            Decimal::ZERO,
            "USD",
        );
        assert_eq!(totals.items[0].discount_amount, dec!(2));
        assert_eq!(totals.items[1].discount_amount, dec!(3));
        assert_eq!(totals.grand_total, dec!(45));
    }

    #[test]
    fn fixed_rule_is_capped_at_row_total() {
        let items = vec![item("A", dec!(3), 2), item("B", dec!(20), 1)];
        let totals = recalculate_totals(
            &items,
            Some(&rule(DiscountType::ByFixed, dec!(5))),
            Decimal::ZERO,
            "USD",
        );
        assert_eq!(totals.items[0].discount_amount, dec!(6));
        assert_eq!(totals.items[1].discount_amount, dec!(5));
    }

    #[test]
    fn cart_fixed_rule_splits_pro_rata_and_sums_exactly() {
        let items = vec![
            item("A", dec!(10), 1),
            item("B", dec!(10), 1),
            item("C", dec!(10), 1),
        ];
        let totals = recalculate_totals(
            &items,
            Some(&rule(DiscountType::CartFixed, dec!(10))),
            Decimal::ZERO,
            "USD",
        );
        assert_eq!(totals.items[0].discount_amount, dec!(3.33));
        assert_eq!(totals.items[1].discount_amount, dec!(3.33));
        assert_eq!(totals.items[2].discount_amount, dec!(3.34));
        assert_eq!(totals.discount_amount, dec!(10));
    }

    #[test]
    fn cart_fixed_rounding_never_goes_negative() {
        let items = vec![
            item("A", dec!(1), 1),
            item("B", dec!(1), 1),
            item("C", dec!(1), 1),
            item("D", dec!(1), 1),
        ];
        let totals = recalculate_totals(
            &items,
            Some(&rule(DiscountType::CartFixed, dec!(0.02))),
            Decimal::ZERO,
            "USD",
        );
        assert!(totals
            .items
            .iter()
            .all(|line| line.discount_amount >= Decimal::ZERO));
        assert_eq!(totals.discount_amount, dec!(0.02));
        assert_eq!(totals.grand_total, dec!(3.98));
    }

    #[test]
    fn shipping_is_added_to_grand_total() {
        let items = vec![item("A", dec!(10), 1)];
        let totals = recalculate_totals(&items, None, dec!(0.1), "USD").with_shipping(dec!(5));
        assert_eq!(totals.shipping_amount, dec!(5));
        assert_eq!(totals.grand_total, dec!(16));
    }

    #[test]
    fn external_tax_wins_inside_totals() {
        let mut taxed = item("A", dec!(10), 1);
        taxed.external_tax_amount = Some(dec!(0.5));
        let totals = recalculate_totals(&[taxed], None, dec!(0.2), "USD");
        assert_eq!(totals.tax_amount, dec!(0.5));
    }

    #[test_case(DiscountType::ByPercent, dec!(150), dec!(20) ; "percent above 100 is clamped")]
    #[test_case(DiscountType::ByFixed, dec!(50), dec!(20) ; "fixed per unit stops at the row")]
    #[test_case(DiscountType::CartFixed, dec!(99), dec!(20) ; "cart fixed stops at the subtotal")]
    fn discount_never_exceeds_subtotal(kind: DiscountType, amount: Decimal, expected: Decimal) {
        let items = vec![item("A", dec!(10), 2)];
        let totals = recalculate_totals(&items, Some(&rule(kind, amount)), Decimal::ZERO, "USD");
        assert_eq!(totals.discount_amount, expected);
        assert_eq!(totals.grand_total, Decimal::ZERO);
    }
}
