//! Store connection management behind the admin endpoints.

use crate::{
    auth::generate_api_key,
    entities::{
        meta::{installed_feature, InstalledFeature, InstalledFeatureModel},
        system_config::DEFAULT_SCOPE,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::system_config::{paths, MetaSettings, SystemConfigService},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

/// Partial settings update. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct MetaSettingsUpdate {
    #[validate(length(min = 1))]
    pub access_token: Option<String>,
    pub pixel_id: Option<String>,
    pub catalog_id: Option<String>,
    pub page_id: Option<String>,
    pub commerce_partner_integration_id: Option<String>,
    #[validate(length(min = 1))]
    pub external_business_id: Option<String>,
    pub active: Option<bool>,
    pub debug_mode: Option<bool>,
    #[validate(custom = "validate_order_status")]
    pub order_status: Option<String>,
    pub newsletter_rule_id: Option<i32>,
}

fn validate_order_status(status: &str) -> Result<(), validator::ValidationError> {
    match status {
        "pending" | "processing" => Ok(()),
        _ => Err(validator::ValidationError::new("order_status")),
    }
}

impl MetaSettingsUpdate {
    /// Config rows to write at the store scope, one per field present in the update.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        let text = [
            (paths::ACCESS_TOKEN, &self.access_token),
            (paths::PIXEL_ID, &self.pixel_id),
            (paths::CATALOG_ID, &self.catalog_id),
            (paths::PAGE_ID, &self.page_id),
            (
                paths::COMMERCE_PARTNER_INTEGRATION_ID,
                &self.commerce_partner_integration_id,
            ),
            (paths::EXTERNAL_BUSINESS_ID, &self.external_business_id),
            (paths::ORDER_STATUS, &self.order_status),
        ];
        let flags = [
            (paths::ACTIVE, self.active),
            (paths::DEBUG_MODE, self.debug_mode),
        ];

        let mut entries: Vec<(&'static str, String)> = text
            .into_iter()
            .filter_map(|(path, value)| value.clone().map(|v| (path, v)))
            .collect();
        entries.extend(flags.into_iter().filter_map(|(path, value)| {
            value.map(|on| (path, if on { "1" } else { "0" }.to_string()))
        }));
        if let Some(rule_id) = self.newsletter_rule_id {
            entries.push((paths::NEWSLETTER_RULE_ID, rule_id.to_string()));
        }
        entries
    }
}

/// Settings as shown to an admin: token masked, API key left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetaSettingsView {
    pub store_id: i32,
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
}

impl MetaSettingsView {
    fn new(store_id: i32, settings: MetaSettings) -> Self {
        Self {
            store_id,
            access_token: settings.masked_access_token(),
            pixel_id: settings.pixel_id,
            catalog_id: settings.catalog_id,
            page_id: settings.page_id,
            commerce_partner_integration_id: settings.commerce_partner_integration_id,
            external_business_id: settings.external_business_id,
            active: settings.active,
            debug_mode: settings.debug_mode,
            order_status: settings.order_status,
            newsletter_rule_id: settings.newsletter_rule_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InstalledFeatureInput {
    #[validate(length(min = 1))]
    pub feature_instance_id: String,
    #[validate(length(min = 1))]
    pub feature_type: String,
    #[serde(default)]
    pub connected_assets: Value,
    #[serde(default)]
    pub additional_info: Value,
}

#[derive(Clone)]
pub struct ConnectionService {
    db: Arc<DatabaseConnection>,
    system_config: Arc<SystemConfigService>,
    event_sender: Arc<EventSender>,
}

impl ConnectionService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        system_config: Arc<SystemConfigService>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            system_config,
            event_sender,
        }
    }

    #[instrument(skip(self, update))]
    pub async fn save_settings(
        &self,
        store_id: i32,
        update: MetaSettingsUpdate,
    ) -> Result<MetaSettingsView, ServiceError> {
        update.validate()?;
        let entries = update.entries();
        for (path, value) in &entries {
            self.system_config
                .set(store_id, path, Some(value.as_str()))
                .await?;
        }
        info!("Saved {} Meta setting(s) for store {}", entries.len(), store_id);

        let saved = MetaSettings::load(&self.system_config, store_id).await?;
        self.event_sender
            .send_or_log(Event::ConfigurationSaved { store_id })
            .await;
        Ok(MetaSettingsView::new(store_id, saved))
    }

    pub async fn settings(&self, store_id: i32) -> Result<MetaSettingsView, ServiceError> {
        let settings = MetaSettings::load(&self.system_config, store_id).await?;
        Ok(MetaSettingsView::new(store_id, settings))
    }

    /// Forgets the store's Meta assets and installed features. Returns how many
    /// settings were removed.
    #[instrument(skip(self))]
    pub async fn delete_connection(&self, store_id: i32) -> Result<usize, ServiceError> {
        let mut removed = 0;
        for path in paths::CONNECTION_ASSETS {
            if self.system_config.delete(store_id, path).await? {
                removed += 1;
            }
        }
        InstalledFeature::delete_many()
            .filter(installed_feature::Column::StoreId.eq(store_id))
            .exec(&*self.db)
            .await?;

        info!("Deleted Meta connection for store {}", store_id);
        Ok(removed)
    }

    #[instrument(skip(self, features))]
    pub async fn replace_installed_features(
        &self,
        store_id: i32,
        features: Vec<InstalledFeatureInput>,
    ) -> Result<Vec<InstalledFeatureModel>, ServiceError> {
        for feature in &features {
            feature.validate()?;
        }

        let txn = self.db.begin().await?;
        InstalledFeature::delete_many()
            .filter(installed_feature::Column::StoreId.eq(store_id))
            .exec(&txn)
            .await?;

        let now = Utc::now();
        let mut saved = Vec::with_capacity(features.len());
        for feature in features {
            let model = installed_feature::ActiveModel {
                store_id: Set(store_id),
                feature_instance_id: Set(feature.feature_instance_id),
                feature_type: Set(feature.feature_type),
                connected_assets: Set(feature.connected_assets),
                additional_info: Set(feature.additional_info),
                created_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            saved.push(model);
        }
        txn.commit().await?;

        info!("Stored {} installed features for store {}", saved.len(), store_id);
        Ok(saved)
    }

    pub async fn installed_features(
        &self,
        store_id: i32,
    ) -> Result<Vec<InstalledFeatureModel>, ServiceError> {
        Ok(InstalledFeature::find()
            .filter(installed_feature::Column::StoreId.eq(store_id))
            .order_by_asc(installed_feature::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Generates and persists a new default scope API key.
    #[instrument(skip(self))]
    pub async fn rotate_api_key(&self) -> Result<String, ServiceError> {
        let key = generate_api_key();
        self.system_config
            .set(DEFAULT_SCOPE, paths::API_KEY, Some(&key))
            .await?;
        info!("Rotated Meta API key");
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn service() -> ConnectionService {
        let db = Arc::new(crate::db::connect_in_memory().await.unwrap());
        let (tx, _rx) = tokio::sync::mpsc::channel(16);
        ConnectionService::new(
            db.clone(),
            Arc::new(SystemConfigService::new(db)),
            Arc::new(EventSender::new(tx)),
        )
    }

    #[tokio::test]
    async fn partial_update_keeps_existing_values() {
        let service = service().await;
        service
            .save_settings(
                1,
                MetaSettingsUpdate {
                    access_token: Some("EAAB-secret-token".into()),
                    pixel_id: Some("px_1".into()),
                    active: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let view = service
            .save_settings(
                1,
                MetaSettingsUpdate {
                    catalog_id: Some("cat_9".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(view.pixel_id.as_deref(), Some("px_1"));
        assert_eq!(view.catalog_id.as_deref(), Some("cat_9"));
        assert_eq!(view.access_token.as_deref(), Some("****oken"));
        assert!(view.active);
    }

    #[tokio::test]
    async fn store_save_keeps_inheriting_default_scope() {
        let service = service().await;
        let config = &service.system_config;
        config
            .set(DEFAULT_SCOPE, paths::ACCESS_TOKEN, Some("token-zero"))
            .await
            .unwrap();
        config
            .set(DEFAULT_SCOPE, paths::EXTERNAL_BUSINESS_ID, Some("biz_default"))
            .await
            .unwrap();

        let view = service
            .save_settings(
                2,
                MetaSettingsUpdate {
                    pixel_id: Some("px".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(view.access_token.as_deref(), Some("****zero"));
        assert_eq!(view.external_business_id.as_deref(), Some("biz_default"));

        let rows = config.list_scope(2).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].path, paths::PIXEL_ID);

        config
            .set(DEFAULT_SCOPE, paths::ACCESS_TOKEN, Some("token-one"))
            .await
            .unwrap();
        let view = service.settings(2).await.unwrap();
        assert_eq!(view.access_token.as_deref(), Some("****-one"));
        assert_eq!(
            config
                .store_id_for_external_business_id("biz_default")
                .await
                .unwrap(),
            DEFAULT_SCOPE
        );
    }

    #[tokio::test]
    async fn explicit_flags_are_written_at_store_scope() {
        let service = service().await;
        service
            .system_config
            .set(DEFAULT_SCOPE, paths::ACTIVE, Some("1"))
            .await
            .unwrap();
        let view = service
            .save_settings(
                4,
                MetaSettingsUpdate {
                    active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!view.active);
        assert!(service.settings(DEFAULT_SCOPE).await.unwrap().active);
    }

    #[tokio::test]
    async fn invalid_order_status_is_rejected() {
        let service = service().await;
        let result = service
            .save_settings(
                1,
                MetaSettingsUpdate {
                    order_status: Some("shipped".into()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn delete_connection_clears_assets_and_features() {
        let service = service().await;
        service
            .save_settings(
                2,
                MetaSettingsUpdate {
                    access_token: Some("token".into()),
                    external_business_id: Some("biz_2".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        service
            .replace_installed_features(
                2,
                vec![InstalledFeatureInput {
                    feature_instance_id: "fi_1".into(),
                    feature_type: "pixel".into(),
                    connected_assets: json!({"pixel_id": "px"}),
                    additional_info: json!({}),
                }],
            )
            .await
            .unwrap();

        let removed = service.delete_connection(2).await.unwrap();
        assert!(removed >= 2);
        assert!(service.installed_features(2).await.unwrap().is_empty());
        assert!(service.settings(2).await.unwrap().access_token.is_none());
    }

    #[tokio::test]
    async fn replacing_features_drops_previous_set() {
        let service = service().await;
        let feature = |id: &str| InstalledFeatureInput {
            feature_instance_id: id.into(),
            feature_type: "catalog".into(),
            connected_assets: json!({}),
            additional_info: json!({}),
        };
        service
            .replace_installed_features(3, vec![feature("a"), feature("b")])
            .await
            .unwrap();
        let saved = service
            .replace_installed_features(3, vec![feature("c")])
            .await
            .unwrap();
        assert_eq!(saved.len(), 1);
        let listed = service.installed_features(3).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].feature_instance_id, "c");
    }

    #[tokio::test]
    async fn rotated_key_is_persisted_at_default_scope() {
        let service = service().await;
        let key = service.rotate_api_key().await.unwrap();
        let stored = service
            .system_config
            .get(DEFAULT_SCOPE, paths::API_KEY)
            .await
            .unwrap();
        assert_eq!(stored, Some(key));
    }
}
