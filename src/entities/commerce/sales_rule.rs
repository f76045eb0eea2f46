use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sales_rules")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// `None` applies to every store
    #[sea_orm(nullable)]
    pub store_id: Option<i32>,
    pub name: String,
    pub is_active: bool,
    pub discount_type: DiscountType,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub discount_amount: Decimal,
    pub coupon_prefix: String,
    pub coupon_suffix: String,
    pub coupon_length: i32,
    pub coupon_format: CouponFormat,
    pub coupon_dash_every: i32,
    pub uses_per_coupon: i32,
    #[sea_orm(nullable)]
    pub from_date: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub to_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::coupon::Entity")]
    Coupons,
}

impl Related<super::coupon::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Coupons.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Active flag plus the optional date window.
    pub fn is_applicable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.from_date.map_or(true, |from| from <= now)
            && self.to_date.map_or(true, |to| now <= to)
    }

    pub fn applies_to_store(&self, store_id: i32) -> bool {
        self.store_id.map_or(true, |scoped| scoped == store_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// Percent of each line
    #[sea_orm(string_value = "by_percent")]
    ByPercent,
    /// Fixed amount per unit
    #[sea_orm(string_value = "by_fixed")]
    ByFixed,
    /// Fixed amount for the whole cart
    #[sea_orm(string_value = "cart_fixed")]
    CartFixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum CouponFormat {
    #[sea_orm(string_value = "alphanumeric")]
    Alphanumeric,
    #[sea_orm(string_value = "alphabetical")]
    Alphabetical,
    #[sea_orm(string_value = "numeric")]
    Numeric,
}

impl CouponFormat {
    pub fn charset(&self) -> &'static [u8] {
        match self {
            CouponFormat::Alphanumeric => b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789",
            CouponFormat::Alphabetical => b"ABCDEFGHIJKLMNOPQRSTUVWXYZ",
            CouponFormat::Numeric => b"0123456789",
        }
    }
}
