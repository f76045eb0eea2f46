use crate::{
    config::AppConfig,
    entities::{
        commerce::{cart, Cart},
        invoice::{self, InvoiceState},
        meta::{facebook_order, FacebookOrder},
        order::{self, OrderState, OrderStatus},
        order_item, Invoice, Order, OrderItem, OrderItemModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        commerce::{
            cart_service::{cart_items, recalculate, PricingContext},
            discount_service::record_coupon_usage,
        },
        meta::telemetry::{ExceptionContext, TelemetrySink},
        system_config::{paths, SystemConfigService},
    },
};
use chrono::Utc;
use dashmap::DashMap;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

pub const FACEBOOK_PAYMENT_METHOD: &str = "facebook";

/// Most recent order placed for an external business, as a storefront session would
/// remember it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastOrder {
    pub last_cart_id: String,
    pub last_success_cart_id: String,
    pub order_id: Uuid,
    pub increment_id: String,
    pub status: OrderStatus,
}

#[derive(Debug, Default)]
pub struct CheckoutSession {
    slots: DashMap<String, LastOrder>,
}

impl CheckoutSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, external_business_id: &str, order: LastOrder) {
        self.slots.insert(external_business_id.to_string(), order);
    }

    pub fn last_order(&self, external_business_id: &str) -> Option<LastOrder> {
        self.slots
            .get(external_business_id)
            .map(|slot| slot.value().clone())
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrderInput {
    #[validate(length(min = 1))]
    pub external_business_id: String,
    #[validate(length(min = 1))]
    pub cart_id: String,
    #[validate(length(min = 1))]
    pub facebook_order_id: String,
    #[validate(email)]
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[validate(length(min = 1))]
    pub channel: String,
    #[serde(default)]
    pub buyer_remarketing_status: bool,
    #[serde(default)]
    pub create_invoice: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderView {
    pub id: Uuid,
    pub increment_id: String,
    pub state: OrderState,
    pub status: OrderStatus,
    pub grand_total: Decimal,
    pub currency: String,
    pub invoice_id: Option<Uuid>,
    pub facebook_order_id: String,
    pub items: Vec<OrderItemModel>,
}

/// Turns a Meta checkout into a store order.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
    system_config: Arc<SystemConfigService>,
    telemetry: Arc<dyn TelemetrySink>,
    session: Arc<CheckoutSession>,
}

struct Submitted {
    order: order::Model,
    items: Vec<OrderItemModel>,
    invoice_id: Option<Uuid>,
    cart_id: Uuid,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        system_config: Arc<SystemConfigService>,
        telemetry: Arc<dyn TelemetrySink>,
        session: Arc<CheckoutSession>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
            system_config,
            telemetry,
            session,
        }
    }

    pub fn session(&self) -> &CheckoutSession {
        &self.session
    }

    /// Places the order for a Meta checkout. One store order per Meta order id;
    /// a repeated submission fails with `Conflict`.
    #[instrument(skip(self, input), fields(facebook_order_id = %input.facebook_order_id, cart_id = %input.cart_id))]
    pub async fn create_order(&self, input: CreateOrderInput) -> Result<OrderView, ServiceError> {
        input.validate()?;
        let store_id = self
            .system_config
            .store_id_for_external_business_id(&input.external_business_id)
            .await?;

        match self.submit(store_id, &input).await {
            Ok(view) => Ok(view),
            Err(err) => {
                self.telemetry
                    .log_exception(
                        &err,
                        ExceptionContext::new("create_order", "order_create_api")
                            .with_store(store_id)
                            .with("cart_id", input.cart_id.as_str())
                            .with("facebook_order_id", input.facebook_order_id.as_str())
                            .with("email", input.email.as_str())
                            .with("first_name", input.first_name.as_str())
                            .with("last_name", input.last_name.as_str())
                            .with("channel", input.channel.as_str()),
                    )
                    .await;
                Err(err)
            }
        }
    }

    async fn default_status_is_processing(&self, store_id: i32) -> Result<bool, ServiceError> {
        let configured = self
            .system_config
            .get(store_id, paths::ORDER_STATUS)
            .await?
            .unwrap_or_else(|| self.config.default_order_status.clone());
        Ok(matches!(
            OrderStatus::from_str(configured.trim()),
            Ok(OrderStatus::Processing)
        ))
    }

    async fn submit(&self, store_id: i32, input: &CreateOrderInput) -> Result<OrderView, ServiceError> {
        let processing =
            input.create_invoice || self.default_status_is_processing(store_id).await?;
        let ctx = PricingContext::load(&self.system_config, &self.config, store_id).await?;

        let txn = self.db.begin().await?;

        let cart = Cart::find()
            .filter(cart::Column::MaskedId.eq(input.cart_id.as_str()))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NoSuchCart(input.cart_id.clone()))?;

        // a resubmitted order finds its cart already converted
        let duplicate = FacebookOrder::find()
            .filter(facebook_order::Column::FacebookOrderId.eq(input.facebook_order_id.as_str()))
            .one(&txn)
            .await?
            .is_some();
        if duplicate {
            counter!("meta_bridge_orders.duplicates", 1);
            return Err(duplicate_order(&input.facebook_order_id));
        }

        if !cart.is_active {
            return Err(ServiceError::InvalidOperation(format!(
                "Cart {} is not active",
                input.cart_id
            )));
        }
        match cart.store_id {
            None => {
                return Err(ServiceError::InvalidOperation(format!(
                    "Cart {} has no store",
                    input.cart_id
                )))
            }
            Some(owner) if owner != store_id => {
                return Err(ServiceError::NoSuchCart(input.cart_id.clone()))
            }
            Some(_) => {}
        }
        if cart_items(&txn, cart.id).await?.is_empty() {
            return Err(ServiceError::InvalidOperation(format!(
                "Cart {} has no items",
                input.cart_id
            )));
        }

        let cart_id = cart.id;
        let email = cart
            .customer_email
            .clone()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| input.email.clone());
        let first_name = cart
            .customer_firstname
            .clone()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| input.first_name.clone());
        let last_name = cart
            .customer_lastname
            .clone()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| input.last_name.clone());

        let mut active: cart::ActiveModel = cart.into();
        active.payment_method = Set(Some(FACEBOOK_PAYMENT_METHOD.to_string()));
        active.customer_email = Set(Some(email.clone()));
        active.customer_firstname = Set(Some(first_name.clone()));
        active.customer_lastname = Set(Some(last_name.clone()));
        let cart = active.update(&txn).await?;
        let view = recalculate(&txn, cart.clone(), &ctx).await?;

        self.event_sender
            .send_or_log(Event::CheckoutSubmitBefore {
                cart_id,
                facebook_order_id: input.facebook_order_id.clone(),
            })
            .await;

        let now = Utc::now();
        let (state, status) = if processing {
            (OrderState::Processing, OrderStatus::Processing)
        } else {
            (OrderState::New, OrderStatus::Pending)
        };
        let totals = &view.totals;

        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            increment_id: Set(increment_id("ORD")),
            store_id: Set(store_id),
            cart_id: Set(cart_id),
            state: Set(state),
            status: Set(status),
            customer_email: Set(email),
            customer_firstname: Set(first_name),
            customer_lastname: Set(last_name),
            payment_method: Set(FACEBOOK_PAYMENT_METHOD.to_string()),
            coupon_code: Set(cart.coupon_code.clone()),
            currency: Set(totals.currency.clone()),
            subtotal: Set(totals.subtotal),
            discount_amount: Set(totals.discount_amount),
            tax_amount: Set(totals.tax_amount),
            shipping_amount: Set(totals.shipping_amount),
            grand_total: Set(totals.grand_total),
            shipping_method: Set(cart.shipping_method.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(view.items.len());
        for (item, line) in view.items.iter().zip(totals.items.iter()) {
            let inserted = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                sku: Set(item.sku.clone()),
                name: Set(item.name.clone()),
                qty_ordered: Set(item.qty),
                price: Set(item.price),
                row_total: Set(line.row_total),
                discount_amount: Set(line.discount_amount),
                tax_amount: Set(line.tax_amount),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            items.push(inserted);
        }

        if totals.discount_amount > Decimal::ZERO {
            if let Some(code) = &cart.coupon_code {
                record_coupon_usage(&txn, code).await?;
            }
        }

        let mut active: cart::ActiveModel = cart.into();
        active.is_active = Set(false);
        active.reserved_order_id = Set(Some(order.increment_id.clone()));
        active.updated_at = Set(now);
        active.update(&txn).await?;

        let invoice_id = if processing {
            let invoice = invoice::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                increment_id: Set(increment_id("INV")),
                state: Set(InvoiceState::Paid),
                grand_total: Set(order.grand_total),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            Some(invoice.id)
        } else {
            None
        };

        facebook_order::ActiveModel {
            magento_order_id: Set(order.id),
            facebook_order_id: Set(input.facebook_order_id.clone()),
            channel: Set(input.channel.clone()),
            extra_data: Set(json!({
                "email_remarketing_option": input.buyer_remarketing_status,
            })),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| match ServiceError::conflict_on_unique(e, "") {
            ServiceError::Conflict(_) => {
                counter!("meta_bridge_orders.duplicates", 1);
                duplicate_order(&input.facebook_order_id)
            }
            other => other,
        })?;

        txn.commit().await?;

        self.after_submit(
            input,
            Submitted {
                order,
                items,
                invoice_id,
                cart_id,
            },
        )
        .await
    }

    async fn after_submit(
        &self,
        input: &CreateOrderInput,
        submitted: Submitted,
    ) -> Result<OrderView, ServiceError> {
        let Submitted {
            order,
            items,
            invoice_id,
            cart_id,
        } = submitted;

        self.session.record(
            &input.external_business_id,
            LastOrder {
                last_cart_id: input.cart_id.clone(),
                last_success_cart_id: input.cart_id.clone(),
                order_id: order.id,
                increment_id: order.increment_id.clone(),
                status: order.status,
            },
        );

        self.event_sender
            .send_or_log(Event::CheckoutSubmitAfter {
                cart_id,
                order_id: order.id,
            })
            .await;
        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id: order.id,
                increment_id: order.increment_id.clone(),
                store_id: order.store_id,
                grand_total: order.grand_total,
            })
            .await;
        self.event_sender
            .send_or_log(Event::MetaOrderCorrelated {
                order_id: order.id,
                facebook_order_id: input.facebook_order_id.clone(),
                channel: input.channel.clone(),
            })
            .await;
        if let Some(invoice_id) = invoice_id {
            self.event_sender
                .send_or_log(Event::InvoiceCreated {
                    invoice_id,
                    order_id: order.id,
                })
                .await;
        }

        counter!("meta_bridge_orders.created", 1);
        info!(
            "Created order {} for Meta order {}",
            order.increment_id, input.facebook_order_id
        );

        Ok(order_view(order, items, invoice_id, input.facebook_order_id.clone()))
    }

    /// Store order created for a Meta order id, for reconciliation.
    #[instrument(skip(self))]
    pub async fn get_order_by_facebook_id(
        &self,
        external_business_id: &str,
        facebook_order_id: &str,
    ) -> Result<OrderView, ServiceError> {
        let store_id = self
            .system_config
            .store_id_for_external_business_id(external_business_id)
            .await?;
        let not_found = || {
            ServiceError::NotFound(format!(
                "Order with Facebook ID {} not found",
                facebook_order_id
            ))
        };

        let correlation = FacebookOrder::find()
            .filter(facebook_order::Column::FacebookOrderId.eq(facebook_order_id))
            .one(&*self.db)
            .await?
            .ok_or_else(not_found)?;
        let order = Order::find_by_id(correlation.magento_order_id)
            .one(&*self.db)
            .await?
            .filter(|order| order.store_id == store_id)
            .ok_or_else(not_found)?;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .order_by_asc(order_item::Column::Sku)
            .all(&*self.db)
            .await?;
        let invoice_id = Invoice::find()
            .filter(invoice::Column::OrderId.eq(order.id))
            .one(&*self.db)
            .await?
            .map(|invoice| invoice.id);

        Ok(order_view(order, items, invoice_id, correlation.facebook_order_id))
    }
}

fn duplicate_order(facebook_order_id: &str) -> ServiceError {
    ServiceError::Conflict(format!(
        "Order with Facebook ID {} already exists",
        facebook_order_id
    ))
}

/// `{prefix}-` followed by eight uppercase hex digits.
fn increment_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, hex[..8].to_uppercase())
}

fn order_view(
    order: order::Model,
    items: Vec<OrderItemModel>,
    invoice_id: Option<Uuid>,
    facebook_order_id: String,
) -> OrderView {
    OrderView {
        id: order.id,
        increment_id: order.increment_id,
        state: order.state,
        status: order.status,
        grand_total: order.grand_total,
        currency: order.currency,
        invoice_id,
        facebook_order_id,
        items,
    }
}
