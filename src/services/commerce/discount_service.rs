use crate::{
    entities::{
        commerce::{coupon, Coupon, CouponModel, SalesRule, SalesRuleModel},
        newsletter_subscriber::{self, SubscriberStatus},
        NewsletterSubscriber,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::system_config::{paths, SystemConfigService},
};
use chrono::{DateTime, Utc};
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::Validate;

/// Attempts before coupon generation gives up on collisions
pub const MAX_CODE_ATTEMPTS: usize = 10;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewsletterRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsletterResult {
    pub email: String,
    pub status: SubscriberStatus,
    pub coupon_code: Option<String>,
}

/// Coupon issuance and newsletter gated discounts.
#[derive(Clone)]
pub struct DiscountService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    system_config: Arc<SystemConfigService>,
}

impl DiscountService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        system_config: Arc<SystemConfigService>,
    ) -> Self {
        Self {
            db,
            event_sender,
            system_config,
        }
    }

    /// Issues a fresh single coupon for a sales rule of the business's store.
    #[instrument(skip(self))]
    pub async fn generate_coupon_code(
        &self,
        external_business_id: &str,
        rule_id: i32,
    ) -> Result<String, ServiceError> {
        let store_id = self
            .system_config
            .store_id_for_external_business_id(external_business_id)
            .await?;
        self.generate_for_store(store_id, rule_id).await
    }

    pub async fn generate_for_store(&self, store_id: i32, rule_id: i32) -> Result<String, ServiceError> {
        let now = Utc::now();
        let rule = SalesRule::find_by_id(rule_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Sales rule {} not found", rule_id)))?;

        if !rule.is_applicable_at(now) || !rule.applies_to_store(store_id) {
            return Err(ServiceError::NotFound(format!(
                "Sales rule {} is not active",
                rule_id
            )));
        }

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = {
                let mut rng = rand::thread_rng();
                generate_code(&rule, &mut rng)
            };

            let taken = Coupon::find()
                .filter(coupon::Column::Code.eq(code.as_str()))
                .one(&*self.db)
                .await?
                .is_some();
            if taken {
                warn!("Coupon code collision on attempt {} for rule {}", attempt, rule_id);
                continue;
            }

            let inserted = coupon::ActiveModel {
                rule_id: Set(rule.id),
                code: Set(code.clone()),
                usage_limit: Set(rule.uses_per_coupon),
                times_used: Set(0),
                expiration_date: Set(rule.to_date),
                created_at: Set(now),
                ..Default::default()
            }
            .insert(&*self.db)
            .await;

            match inserted {
                Ok(_) => {
                    self.event_sender
                        .send_or_log(Event::CouponGenerated {
                            rule_id,
                            code: code.clone(),
                        })
                        .await;
                    info!("Generated coupon for rule {}", rule_id);
                    return Ok(code);
                }
                Err(e) => match ServiceError::conflict_on_unique(e, "coupon code taken") {
                    ServiceError::Conflict(_) => continue,
                    other => return Err(other),
                },
            }
        }

        Err(ServiceError::InternalError(format!(
            "Unable to generate a unique coupon code for rule {} after {} attempts",
            rule_id, MAX_CODE_ATTEMPTS
        )))
    }

    /// Subscribes an email once per business, issuing the configured newsletter coupon.
    #[instrument(skip(self))]
    pub async fn subscribe_to_newsletter(
        &self,
        external_business_id: &str,
        email: &str,
    ) -> Result<NewsletterResult, ServiceError> {
        let request = NewsletterRequest {
            email: email.trim().to_lowercase(),
        };
        request.validate()?;
        let email = request.email;

        let store_id = self
            .system_config
            .store_id_for_external_business_id(external_business_id)
            .await?;

        let already_subscribed = NewsletterSubscriber::find()
            .filter(newsletter_subscriber::Column::ExternalBusinessId.eq(external_business_id))
            .filter(newsletter_subscriber::Column::Email.eq(email.as_str()))
            .one(&*self.db)
            .await?
            .is_some();
        if already_subscribed {
            return Err(ServiceError::Conflict(format!("{} is already subscribed", email)));
        }

        let coupon_code = match self
            .system_config
            .get_i32(store_id, paths::NEWSLETTER_RULE_ID)
            .await?
        {
            Some(rule_id) => Some(self.generate_for_store(store_id, rule_id).await?),
            None => None,
        };

        let now = Utc::now();
        newsletter_subscriber::ActiveModel {
            store_id: Set(store_id),
            external_business_id: Set(external_business_id.to_string()),
            email: Set(email.clone()),
            status: Set(SubscriberStatus::Subscribed),
            coupon_code: Set(coupon_code.clone()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| ServiceError::conflict_on_unique(e, format!("{} is already subscribed", email)))?;

        self.event_sender
            .send_or_log(Event::NewsletterSubscribed {
                external_business_id: external_business_id.to_string(),
                email: email.clone(),
                coupon_code: coupon_code.clone(),
            })
            .await;

        Ok(NewsletterResult {
            email,
            status: SubscriberStatus::Subscribed,
            coupon_code,
        })
    }
}

/// `prefix + body + suffix`, with a dash every `coupon_dash_every` body characters.
pub fn generate_code<R: Rng + ?Sized>(rule: &SalesRuleModel, rng: &mut R) -> String {
    let charset = rule.coupon_format.charset();
    let length = rule.coupon_length.max(1) as usize;
    let body: String = (0..length)
        .map(|_| charset[rng.gen_range(0..charset.len())] as char)
        .collect();

    format!(
        "{}{}{}",
        rule.coupon_prefix,
        insert_dashes(&body, rule.coupon_dash_every),
        rule.coupon_suffix
    )
}

fn insert_dashes(body: &str, every: i32) -> String {
    if every <= 0 {
        return body.to_string();
    }
    body.chars()
        .collect::<Vec<_>>()
        .chunks(every as usize)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}

fn invalid_coupon(code: &str) -> ServiceError {
    ServiceError::NotFound(format!("The coupon code \"{}\" is not valid", code))
}

/// Coupon and rule for `code` if it can be applied to a cart of `store_id` at `now`.
pub async fn find_valid_coupon<C: ConnectionTrait>(
    conn: &C,
    code: &str,
    store_id: i32,
    now: DateTime<Utc>,
) -> Result<(CouponModel, SalesRuleModel), ServiceError> {
    let coupon = Coupon::find()
        .filter(coupon::Column::Code.eq(code))
        .one(conn)
        .await?
        .ok_or_else(|| invalid_coupon(code))?;

    let rule = SalesRule::find_by_id(coupon.rule_id)
        .one(conn)
        .await?
        .ok_or_else(|| invalid_coupon(code))?;

    if !coupon.is_usable_at(now) || !rule.is_applicable_at(now) || !rule.applies_to_store(store_id)
    {
        return Err(invalid_coupon(code));
    }
    Ok((coupon, rule))
}

/// Counts one use of `code` against its limit.
pub async fn record_coupon_usage<C: ConnectionTrait>(conn: &C, code: &str) -> Result<(), ServiceError> {
    if let Some(found) = Coupon::find()
        .filter(coupon::Column::Code.eq(code))
        .one(conn)
        .await?
    {
        let times_used = found.times_used;
        let mut active: coupon::ActiveModel = found.into();
        active.times_used = Set(times_used + 1);
        active.update(conn).await?;
    }
    Ok(())
}
