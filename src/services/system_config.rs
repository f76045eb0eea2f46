use crate::{
    entities::system_config::{self, DEFAULT_SCOPE},
    entities::{SystemConfig, SystemConfigModel},
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Configuration paths read and written by the Meta integration
pub mod paths {
    pub const ACCESS_TOKEN: &str = "meta/business_extension/access_token";
    pub const PIXEL_ID: &str = "meta/business_extension/pixel_id";
    pub const CATALOG_ID: &str = "meta/business_extension/catalog_id";
    pub const PAGE_ID: &str = "meta/business_extension/page_id";
    pub const COMMERCE_PARTNER_INTEGRATION_ID: &str =
        "meta/business_extension/commerce_partner_integration_id";
    pub const EXTERNAL_BUSINESS_ID: &str = "meta/business_extension/external_business_id";
    pub const ACTIVE: &str = "meta/business_extension/active";
    pub const DEBUG_MODE: &str = "meta/business_extension/debug_mode";
    pub const ORDER_STATUS: &str = "meta/business_extension/order_status";
    pub const NEWSLETTER_RULE_ID: &str = "meta/business_extension/newsletter_rule_id";
    pub const API_KEY: &str = "meta/business_extension/api_key";

    pub const TAX_DEFAULT_RATE: &str = "tax/defaults/rate";
    pub const DEFAULT_CURRENCY: &str = "currency/options/default";

    /// Paths cleared when a store disconnects from Meta
    pub const CONNECTION_ASSETS: [&str; 7] = [
        ACCESS_TOKEN,
        PIXEL_ID,
        CATALOG_ID,
        PAGE_ID,
        COMMERCE_PARTNER_INTEGRATION_ID,
        EXTERNAL_BUSINESS_ID,
        ACTIVE,
    ];
}

/// Store-scoped key/value settings backed by `core_config_data`.
#[derive(Clone)]
pub struct SystemConfigService {
    db: Arc<DatabaseConnection>,
}

impl SystemConfigService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn find_exact(
        &self,
        store_id: i32,
        path: &str,
    ) -> Result<Option<SystemConfigModel>, ServiceError> {
        Ok(SystemConfig::find()
            .filter(system_config::Column::StoreId.eq(store_id))
            .filter(system_config::Column::Path.eq(path))
            .one(&*self.db)
            .await?)
    }

    /// Value at the store scope, falling back to the default scope.
    /// Empty strings count as unset.
    pub async fn get(&self, store_id: i32, path: &str) -> Result<Option<String>, ServiceError> {
        let mut scopes = vec![store_id];
        if store_id != DEFAULT_SCOPE {
            scopes.push(DEFAULT_SCOPE);
        }

        for scope in scopes {
            if let Some(value) = self
                .find_exact(scope, path)
                .await?
                .and_then(|row| row.value)
                .filter(|v| !v.trim().is_empty())
            {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    pub async fn get_bool(&self, store_id: i32, path: &str) -> Result<bool, ServiceError> {
        Ok(self
            .get(store_id, path)
            .await?
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false))
    }

    pub async fn get_decimal(
        &self,
        store_id: i32,
        path: &str,
    ) -> Result<Option<Decimal>, ServiceError> {
        match self.get(store_id, path).await? {
            Some(raw) => Decimal::from_str(raw.trim()).map(Some).map_err(|_| {
                ServiceError::InvalidInput(format!("{} is not a decimal: {}", path, raw))
            }),
            None => Ok(None),
        }
    }

    pub async fn get_i32(&self, store_id: i32, path: &str) -> Result<Option<i32>, ServiceError> {
        match self.get(store_id, path).await? {
            Some(raw) => raw.trim().parse::<i32>().map(Some).map_err(|_| {
                ServiceError::InvalidInput(format!("{} is not an integer: {}", path, raw))
            }),
            None => Ok(None),
        }
    }

    /// Insert or update a single value at exactly `store_id`.
    #[instrument(skip(self, value))]
    pub async fn set(
        &self,
        store_id: i32,
        path: &str,
        value: Option<&str>,
    ) -> Result<SystemConfigModel, ServiceError> {
        let now = Utc::now();
        let saved = match self.find_exact(store_id, path).await? {
            Some(existing) => {
                let mut row: system_config::ActiveModel = existing.into();
                row.value = Set(value.map(str::to_string));
                row.updated_at = Set(now);
                row.update(&*self.db).await?
            }
            None => {
                system_config::ActiveModel {
                    store_id: Set(store_id),
                    path: Set(path.to_string()),
                    value: Set(value.map(str::to_string)),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(&*self.db)
                .await?
            }
        };
        debug!("Saved config {} for store {}", path, store_id);
        Ok(saved)
    }

    /// Returns true when a row was removed.
    pub async fn delete(&self, store_id: i32, path: &str) -> Result<bool, ServiceError> {
        let result = SystemConfig::delete_many()
            .filter(system_config::Column::StoreId.eq(store_id))
            .filter(system_config::Column::Path.eq(path))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Every row stored exactly at `store_id`, ordered by path.
    pub async fn list_scope(&self, store_id: i32) -> Result<Vec<SystemConfigModel>, ServiceError> {
        Ok(SystemConfig::find()
            .filter(system_config::Column::StoreId.eq(store_id))
            .order_by_asc(system_config::Column::Path)
            .all(&*self.db)
            .await?)
    }

    /// Resolves the store connected to a Meta business.
    #[instrument(skip(self))]
    pub async fn store_id_for_external_business_id(
        &self,
        external_business_id: &str,
    ) -> Result<i32, ServiceError> {
        SystemConfig::find()
            .filter(system_config::Column::Path.eq(paths::EXTERNAL_BUSINESS_ID))
            .filter(system_config::Column::Value.eq(external_business_id))
            .order_by_desc(system_config::Column::StoreId)
            .one(&*self.db)
            .await?
            .map(|row| row.store_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "No store connected to external business id {}",
                    external_business_id
                ))
            })
    }
}

/// Typed view over the Meta connection settings of a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaSettings {
    pub access_token: Option<String>,
    pub pixel_id: Option<String>,
    pub catalog_id: Option<String>,
    pub page_id: Option<String>,
    pub commerce_partner_integration_id: Option<String>,
    pub external_business_id: Option<String>,
    pub active: bool,
    pub debug_mode: bool,
    pub order_status: Option<String>,
    pub newsletter_rule_id: Option<i32>,
    pub api_key: Option<String>,
}

impl MetaSettings {
    pub async fn load(config: &SystemConfigService, store_id: i32) -> Result<Self, ServiceError> {
        Ok(Self {
            access_token: config.get(store_id, paths::ACCESS_TOKEN).await?,
            pixel_id: config.get(store_id, paths::PIXEL_ID).await?,
            catalog_id: config.get(store_id, paths::CATALOG_ID).await?,
            page_id: config.get(store_id, paths::PAGE_ID).await?,
            commerce_partner_integration_id: config
                .get(store_id, paths::COMMERCE_PARTNER_INTEGRATION_ID)
                .await?,
            external_business_id: config.get(store_id, paths::EXTERNAL_BUSINESS_ID).await?,
            active: config.get_bool(store_id, paths::ACTIVE).await?,
            debug_mode: config.get_bool(store_id, paths::DEBUG_MODE).await?,
            order_status: config.get(store_id, paths::ORDER_STATUS).await?,
            newsletter_rule_id: config.get_i32(store_id, paths::NEWSLETTER_RULE_ID).await?,
            api_key: config.get(DEFAULT_SCOPE, paths::API_KEY).await?,
        })
    }

    /// Access token reduced to its last four characters for display.
    pub fn masked_access_token(&self) -> Option<String> {
        self.access_token.as_ref().map(|token| {
            let visible: String = token
                .chars()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("****{}", visible)
        })
    }
}
