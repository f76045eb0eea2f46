use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Single coupon code generated from a sales rule
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sales_coupons")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub rule_id: i32,
    #[sea_orm(unique)]
    pub code: String,
    pub usage_limit: i32,
    pub times_used: i32,
    #[sea_orm(nullable)]
    pub expiration_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::sales_rule::Entity",
        from = "Column::RuleId",
        to = "super::sales_rule::Column::Id"
    )]
    SalesRule,
}

impl Related<super::sales_rule::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SalesRule.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// A usage limit of 0 means unlimited.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        let within_limit = self.usage_limit == 0 || self.times_used < self.usage_limit;
        let not_expired = self.expiration_date.map_or(true, |exp| now <= exp);
        within_limit && not_expired
    }
}
