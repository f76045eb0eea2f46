//! Shipping settings export.
//!
//! Store carrier settings are projected into shipping profiles, serialized to the
//! fixed eight column CSV Meta expects and uploaded as a `SHIPPING_PROFILES` feed.

use crate::{
    config::AppConfig,
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        commerce::totals::round_money,
        meta::{
            graph_api::GraphApiClient,
            telemetry::{ExceptionContext, TelemetrySink},
        },
        system_config::{paths, SystemConfigService},
    },
};
use metrics::counter;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::{info, instrument};

pub const SHIPPING_CSV_HEADER: [&str; 8] = [
    "enabled",
    "title",
    "method_name",
    "shipping_methods",
    "handling_fee",
    "handling_fee_type",
    "shipping_fee_type",
    "free_shipping_threshold",
];

pub const FEED_TYPE_SHIPPING_PROFILES: &str = "SHIPPING_PROFILES";
pub const UPDATE_TYPE_CREATE: &str = "CREATE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Carrier {
    #[strum(serialize = "flatrate")]
    #[serde(rename = "flatrate")]
    FlatRate,
    #[strum(serialize = "freeshipping")]
    #[serde(rename = "freeshipping")]
    FreeShipping,
    #[strum(serialize = "tablerate")]
    #[serde(rename = "tablerate")]
    TableRate,
}

impl Carrier {
    pub const ALL: [Carrier; 3] = [Carrier::FlatRate, Carrier::FreeShipping, Carrier::TableRate];

    fn path(&self, field: &str) -> String {
        format!("carriers/{}/{}", self, field)
    }

    fn defaults(&self) -> CarrierDefaults {
        match self {
            Carrier::FlatRate => CarrierDefaults {
                active: true,
                title: "Flat Rate",
                name: "Fixed",
                price: dec!(5.00),
            },
            Carrier::FreeShipping => CarrierDefaults {
                active: false,
                title: "Free Shipping",
                name: "Free",
                price: Decimal::ZERO,
            },
            Carrier::TableRate => CarrierDefaults {
                active: false,
                title: "Best Way",
                name: "Table Rate",
                price: Decimal::ZERO,
            },
        }
    }
}

struct CarrierDefaults {
    active: bool,
    title: &'static str,
    name: &'static str,
    price: Decimal,
}

/// Magento stores these as `F`/`P` and `O`/`I`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HandlingFeeType {
    #[strum(to_string = "fixed", serialize = "F")]
    Fixed,
    #[strum(to_string = "percent", serialize = "P")]
    Percent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ShippingFeeType {
    #[strum(to_string = "per_order", serialize = "O")]
    PerOrder,
    #[strum(to_string = "per_item", serialize = "I")]
    PerItem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingMethodRate {
    pub code: String,
    pub price: Decimal,
    pub allowed_countries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingProfile {
    pub carrier: Carrier,
    pub enabled: bool,
    pub title: String,
    pub method_name: String,
    pub shipping_methods: Vec<ShippingMethodRate>,
    pub handling_fee: Decimal,
    pub handling_fee_type: HandlingFeeType,
    pub shipping_fee_type: ShippingFeeType,
    pub free_shipping_threshold: Option<Decimal>,
}

impl ShippingProfile {
    /// `{carrier}_{carrier}`, the method code selected on a cart.
    pub fn method_code(&self) -> String {
        format!("{}_{}", self.carrier, self.carrier)
    }

    fn base_price(&self) -> Decimal {
        self.shipping_methods
            .first()
            .map(|m| m.price)
            .unwrap_or(Decimal::ZERO)
    }

    fn with_handling(&self, base: Decimal) -> Decimal {
        let handling = match self.handling_fee_type {
            HandlingFeeType::Fixed => self.handling_fee,
            HandlingFeeType::Percent => base * self.handling_fee / dec!(100),
        };
        round_money(base + handling)
    }

    /// Price of this carrier for a cart, `None` when it does not apply.
    pub fn quote(&self, subtotal_after_discount: Decimal, total_qty: i32) -> Option<Decimal> {
        if !self.enabled {
            return None;
        }
        match self.carrier {
            Carrier::FlatRate => {
                let base = match self.shipping_fee_type {
                    ShippingFeeType::PerOrder => self.base_price(),
                    ShippingFeeType::PerItem => self.base_price() * Decimal::from(total_qty),
                };
                Some(self.with_handling(base))
            }
            Carrier::FreeShipping => {
                let minimum = self.free_shipping_threshold.unwrap_or(Decimal::ZERO);
                (subtotal_after_discount >= minimum).then_some(Decimal::ZERO)
            }
            Carrier::TableRate => Some(self.with_handling(self.base_price())),
        }
    }
}

/// Reads carrier settings for a store.
pub struct ShippingData;

impl ShippingData {
    pub async fn for_store(
        config: &SystemConfigService,
        store_id: i32,
    ) -> Result<Vec<ShippingProfile>, ServiceError> {
        let mut profiles = Vec::with_capacity(Carrier::ALL.len());
        for carrier in Carrier::ALL {
            profiles.push(Self::profile(config, store_id, carrier).await?);
        }
        Ok(profiles)
    }

    async fn profile(
        config: &SystemConfigService,
        store_id: i32,
        carrier: Carrier,
    ) -> Result<ShippingProfile, ServiceError> {
        let defaults = carrier.defaults();

        let enabled = match config.get(store_id, &carrier.path("active")).await? {
            Some(_) => config.get_bool(store_id, &carrier.path("active")).await?,
            None => defaults.active,
        };
        let title = config
            .get(store_id, &carrier.path("title"))
            .await?
            .unwrap_or_else(|| defaults.title.to_string());
        let method_name = config
            .get(store_id, &carrier.path("name"))
            .await?
            .unwrap_or_else(|| defaults.name.to_string());
        let price = config
            .get_decimal(store_id, &carrier.path("price"))
            .await?
            .unwrap_or(defaults.price);
        let handling_fee = config
            .get_decimal(store_id, &carrier.path("handling_fee"))
            .await?
            .unwrap_or(Decimal::ZERO);
        let handling_fee_type = config
            .get(store_id, &carrier.path("handling_type"))
            .await?
            .and_then(|v| HandlingFeeType::from_str(v.trim()).ok())
            .unwrap_or(HandlingFeeType::Fixed);
        let shipping_fee_type = match carrier {
            Carrier::FlatRate => config
                .get(store_id, &carrier.path("type"))
                .await?
                .and_then(|v| ShippingFeeType::from_str(v.trim()).ok())
                .unwrap_or(ShippingFeeType::PerItem),
            _ => ShippingFeeType::PerOrder,
        };
        let free_shipping_threshold = match carrier {
            Carrier::FreeShipping => {
                config
                    .get_decimal(store_id, &carrier.path("free_shipping_subtotal"))
                    .await?
            }
            _ => None,
        };
        let allowed_countries = config
            .get(store_id, &carrier.path("specificcountry"))
            .await?
            .map(|list| {
                list.split(',')
                    .map(|c| c.trim().to_uppercase())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(ShippingProfile {
            carrier,
            enabled,
            title,
            method_name,
            shipping_methods: vec![ShippingMethodRate {
                code: format!("{}_{}", carrier, carrier),
                price,
                allowed_countries,
            }],
            handling_fee,
            handling_fee_type,
            shipping_fee_type,
            free_shipping_threshold,
        })
    }
}

/// Serializes shipping profiles to the Meta shipping CSV.
pub struct ShippingFileBuilder;

impl ShippingFileBuilder {
    pub fn build(profiles: &[ShippingProfile]) -> Result<String, ServiceError> {
        let mut lines = Vec::with_capacity(profiles.len() + 1);
        lines.push(SHIPPING_CSV_HEADER.join(","));

        for profile in profiles {
            let methods = serde_json::to_string(&profile.shipping_methods)?;
            let row = [
                profile.enabled.to_string(),
                profile.title.clone(),
                profile.method_name.clone(),
                methods,
                format!("{:.2}", profile.handling_fee),
                profile.handling_fee_type.to_string(),
                profile.shipping_fee_type.to_string(),
                profile
                    .free_shipping_threshold
                    .map(|t| format!("{:.2}", t))
                    .unwrap_or_default(),
            ];
            lines.push(
                row.iter()
                    .map(|field| escape_field(field))
                    .collect::<Vec<_>>()
                    .join(","),
            );
        }

        Ok(lines.join("\n"))
    }

    pub async fn write(dir: &Path, store_id: i32, csv: &str) -> Result<PathBuf, ServiceError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("shipping_profiles_{}.csv", store_id));
        tokio::fs::write(&path, csv).await?;
        Ok(path)
    }
}

fn escape_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        let escaped = value.replace('"', "\"\"");
        format!("\"{escaped}\"")
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub store_id: i32,
    pub profiles: usize,
    pub file_path: String,
    pub response: Value,
}

/// Builds, writes and uploads the shipping profiles of a store.
#[derive(Clone)]
pub struct ShippingSyncer {
    system_config: Arc<SystemConfigService>,
    config: Arc<AppConfig>,
    telemetry: Arc<dyn TelemetrySink>,
    event_sender: Arc<EventSender>,
}

impl ShippingSyncer {
    pub fn new(
        system_config: Arc<SystemConfigService>,
        config: Arc<AppConfig>,
        telemetry: Arc<dyn TelemetrySink>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            system_config,
            config,
            telemetry,
            event_sender,
        }
    }

    #[instrument(skip(self))]
    pub async fn sync_shipping_profiles(&self, store_id: i32) -> Result<SyncResult, ServiceError> {
        let integration_id = self
            .system_config
            .get(store_id, paths::COMMERCE_PARTNER_INTEGRATION_ID)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidOperation(format!(
                    "Store {} has no commerce partner integration id",
                    store_id
                ))
            })?;

        match self.build_and_upload(store_id, &integration_id).await {
            Ok(result) => {
                counter!("meta_bridge_shipping.syncs", 1);
                self.event_sender
                    .send_or_log(Event::ShippingProfilesSynced {
                        store_id,
                        profiles: result.profiles,
                    })
                    .await;
                info!(
                    "Uploaded {} shipping profiles for store {}",
                    result.profiles, store_id
                );
                Ok(result)
            }
            Err(err) => {
                self.telemetry
                    .log_exception(
                        &err,
                        ExceptionContext::new("persist_meta_shipping_profiles", "shipping_sync")
                            .with_store(store_id)
                            .with("commerce_partner_integration_id", integration_id),
                    )
                    .await;
                Err(err)
            }
        }
    }

    async fn build_and_upload(
        &self,
        store_id: i32,
        integration_id: &str,
    ) -> Result<SyncResult, ServiceError> {
        let profiles = ShippingData::for_store(&self.system_config, store_id).await?;
        let csv = ShippingFileBuilder::build(&profiles)?;
        let path = ShippingFileBuilder::write(Path::new(&self.config.export_dir), store_id, &csv)
            .await?;

        let client = GraphApiClient::for_store(&self.system_config, &self.config, store_id).await?;
        let response = client
            .upload_file(
                integration_id,
                &path,
                FEED_TYPE_SHIPPING_PROFILES,
                UPDATE_TYPE_CREATE,
            )
            .await?;

        Ok(SyncResult {
            store_id,
            profiles: profiles.len(),
            file_path: path.to_string_lossy().into_owned(),
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_rate(fee_type: ShippingFeeType) -> ShippingProfile {
        ShippingProfile {
            carrier: Carrier::FlatRate,
            enabled: true,
            title: "Flat Rate".into(),
            method_name: "Fixed".into(),
            shipping_methods: vec![ShippingMethodRate {
                code: "flatrate_flatrate".into(),
                price: dec!(5.00),
                allowed_countries: vec!["US".into(), "CA".into()],
            }],
            handling_fee: dec!(10),
            handling_fee_type: HandlingFeeType::Percent,
            shipping_fee_type: fee_type,
            free_shipping_threshold: None,
        }
    }

    #[test]
    fn flat_rate_quotes_per_item_with_percent_handling() {
        let profile = flat_rate(ShippingFeeType::PerItem);
        assert_eq!(profile.quote(dec!(100), 3), Some(dec!(16.50)));

        let per_order = flat_rate(ShippingFeeType::PerOrder);
        assert_eq!(per_order.quote(dec!(100), 3), Some(dec!(5.50)));
    }

    #[test]
    fn free_shipping_requires_minimum_subtotal() {
        let profile = ShippingProfile {
            carrier: Carrier::FreeShipping,
            free_shipping_threshold: Some(dec!(50)),
            ..flat_rate(ShippingFeeType::PerOrder)
        };
        assert_eq!(profile.quote(dec!(49.99), 1), None);
        assert_eq!(profile.quote(dec!(50), 1), Some(Decimal::ZERO));

        let disabled = ShippingProfile {
            enabled: false,
            ..profile
        };
        assert_eq!(disabled.quote(dec!(100), 1), None);
    }

    #[test]
    fn csv_has_fixed_header_and_quotes_json_methods() {
        let csv = ShippingFileBuilder::build(&[flat_rate(ShippingFeeType::PerItem)]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("enabled,title,method_name,shipping_methods,handling_fee,handling_fee_type,shipping_fee_type,free_shipping_threshold")
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("true,Flat Rate,Fixed,\"[{\"\"code\"\":\"\"flatrate_flatrate\"\""));
        assert!(row.ends_with(",10.00,percent,per_item,"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn escape_field_doubles_quotes() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn magento_codes_parse() {
        assert_eq!(HandlingFeeType::from_str("P").unwrap(), HandlingFeeType::Percent);
        assert_eq!(ShippingFeeType::from_str("O").unwrap(), ShippingFeeType::PerOrder);
        assert_eq!(Carrier::FlatRate.to_string(), "flatrate");
    }
}
