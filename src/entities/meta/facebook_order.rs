use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation between a Meta order id and the store order created for it.
/// `facebook_order_id` is unique: one store order per Meta order.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "facebook_sales_orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub magento_order_id: Uuid,
    #[sea_orm(unique)]
    pub facebook_order_id: String,
    pub channel: String,
    #[sea_orm(column_type = "Json")]
    pub extra_data: Json,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "crate::entities::order::Entity",
        from = "Column::MagentoOrderId",
        to = "crate::entities::order::Column::Id"
    )]
    Order,
}

impl Related<crate::entities::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn email_remarketing_option(&self) -> bool {
        self.extra_data
            .get("email_remarketing_option")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}
