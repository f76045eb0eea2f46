use crate::{
    config::AppConfig,
    entities::commerce::CartItemModel,
    errors::ServiceError,
    services::{
        commerce::totals::round_money,
        system_config::{paths, SystemConfigService},
    },
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Tax for one cart line. Tax supplied by Meta on the line always wins over the
/// store calculation.
pub fn item_tax(item: &CartItemModel, default_rate: Decimal) -> Decimal {
    match item.external_tax_amount {
        Some(external) => round_money(external),
        None => round_money((item.row_total - item.discount_amount).max(Decimal::ZERO) * default_rate),
    }
}

pub fn collect_tax(items: &[CartItemModel], default_rate: Decimal) -> Decimal {
    items.iter().map(|item| item_tax(item, default_rate)).sum()
}

/// Store tax rate as a fraction. `tax/defaults/rate` is stored as a percentage.
pub async fn store_tax_rate(
    system_config: &SystemConfigService,
    config: &AppConfig,
    store_id: i32,
) -> Result<Decimal, ServiceError> {
    if let Some(percent) = system_config
        .get_decimal(store_id, paths::TAX_DEFAULT_RATE)
        .await?
    {
        return Ok(percent / dec!(100));
    }
    Ok(Decimal::from_f64_retain(config.default_tax_rate)
        .map(|rate| rate.round_dp(6))
        .unwrap_or(Decimal::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn line(row_total: Decimal, discount: Decimal, external: Option<Decimal>) -> CartItemModel {
        CartItemModel {
            id: Uuid::new_v4(),
            cart_id: Uuid::new_v4(),
            sku: "SKU1".into(),
            name: "Item".into(),
            qty: 1,
            price: row_total,
            row_total,
            discount_amount: discount,
            external_tax_amount: external,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn external_tax_overrides_rate() {
        let item = line(dec!(100), Decimal::ZERO, Some(dec!(3.333)));
        assert_eq!(item_tax(&item, dec!(0.2)), dec!(3.33));
    }

    #[test]
    fn default_rate_applies_after_discount() {
        let item = line(dec!(100), dec!(10), None);
        assert_eq!(item_tax(&item, dec!(0.0825)), dec!(7.43));
    }

    #[test]
    fn collect_tax_mixes_both_rules() {
        let items = vec![
            line(dec!(50), Decimal::ZERO, None),
            line(dec!(20), Decimal::ZERO, Some(dec!(1.00))),
        ];
        assert_eq!(collect_tax(&items, dec!(0.10)), dec!(6.00));
    }
}
