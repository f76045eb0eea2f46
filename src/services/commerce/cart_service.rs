use crate::{
    config::AppConfig,
    entities::commerce::{cart, cart_item, product, Cart, CartItem, CartItemModel, CartModel, Product},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        commerce::{
            discount_service::find_valid_coupon,
            tax::store_tax_rate,
            totals::{recalculate_totals, CartTotals},
        },
        meta::{
            shipping::{ShippingData, ShippingProfile},
            telemetry::{ExceptionContext, TelemetrySink},
        },
        system_config::{paths, SystemConfigService},
    },
};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

const MASKED_ID_LENGTH: usize = 32;

/// Guest cart builder for Meta checkouts.
///
/// Carts are addressed by their masked id and always scoped to the store that owns
/// the external business id in the request. A cart of another store is reported as
/// missing, never as forbidden.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
    system_config: Arc<SystemConfigService>,
    telemetry: Arc<dyn TelemetrySink>,
}

/// Store level settings needed to price a cart. Loaded before a transaction opens.
#[derive(Debug, Clone)]
pub struct PricingContext {
    pub store_id: i32,
    pub tax_rate: Decimal,
    pub currency: String,
    pub carriers: Vec<ShippingProfile>,
}

impl PricingContext {
    pub async fn load(
        system_config: &SystemConfigService,
        config: &AppConfig,
        store_id: i32,
    ) -> Result<Self, ServiceError> {
        let tax_rate = store_tax_rate(system_config, config, store_id).await?;
        let currency = system_config
            .get(store_id, paths::DEFAULT_CURRENCY)
            .await?
            .unwrap_or_else(|| config.default_currency.clone());
        let carriers = ShippingData::for_store(system_config, store_id).await?;

        Ok(Self {
            store_id,
            tax_rate,
            currency,
            carriers,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CartItemInput {
    #[validate(length(min = 1))]
    pub sku: String,
    #[validate(range(min = 1))]
    pub qty: i32,
    /// Tax Meta computed for the line
    #[serde(default)]
    pub tax_amount: Option<Decimal>,
}

/// Buyer identity for a cart. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CartCustomerInput {
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 1))]
    pub first_name: Option<String>,
    #[validate(length(min = 1))]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartItemView {
    pub item_id: Uuid,
    pub sku: String,
    pub name: String,
    pub qty: i32,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartView {
    pub cart_id: String,
    pub is_active: bool,
    pub currency: String,
    pub coupon_code: Option<String>,
    pub customer_email: Option<String>,
    pub customer_firstname: Option<String>,
    pub customer_lastname: Option<String>,
    pub shipping_method: Option<String>,
    pub items: Vec<CartItemView>,
    pub totals: CartTotals,
}

impl CartView {
    fn new(cart: &CartModel, items: &[CartItemModel], totals: CartTotals) -> Self {
        Self {
            cart_id: cart.masked_id.clone(),
            is_active: cart.is_active,
            currency: cart.currency.clone(),
            coupon_code: cart.coupon_code.clone(),
            customer_email: cart.customer_email.clone(),
            customer_firstname: cart.customer_firstname.clone(),
            customer_lastname: cart.customer_lastname.clone(),
            shipping_method: cart.shipping_method.clone(),
            items: items
                .iter()
                .map(|item| CartItemView {
                    item_id: item.id,
                    sku: item.sku.clone(),
                    name: item.name.clone(),
                    qty: item.qty,
                    price: item.price,
                })
                .collect(),
            totals,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShippingOption {
    pub carrier_code: String,
    pub method_code: String,
    pub title: String,
    pub method_name: String,
    pub price: Decimal,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        system_config: Arc<SystemConfigService>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
            system_config,
            telemetry,
        }
    }

    pub async fn pricing_context(&self, external_business_id: &str) -> Result<PricingContext, ServiceError> {
        let store_id = self
            .system_config
            .store_id_for_external_business_id(external_business_id)
            .await?;
        PricingContext::load(&self.system_config, &self.config, store_id).await
    }

    /// Creates an empty active cart for the business's store and returns its masked id.
    #[instrument(skip(self))]
    pub async fn create_cart(&self, external_business_id: &str) -> Result<String, ServiceError> {
        let ctx = self.pricing_context(external_business_id).await?;
        let result = self.insert_cart(&ctx).await;
        self.observe(result, || {
            ExceptionContext::new("create_cart", "cart_builder").with_store(ctx.store_id)
        })
        .await
    }

    async fn insert_cart(&self, ctx: &PricingContext) -> Result<String, ServiceError> {
        let masked_id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(MASKED_ID_LENGTH)
            .map(char::from)
            .collect();
        let now = Utc::now();

        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            masked_id: Set(masked_id.clone()),
            store_id: Set(Some(ctx.store_id)),
            is_active: Set(true),
            customer_email: Set(None),
            customer_firstname: Set(None),
            customer_lastname: Set(None),
            payment_method: Set(None),
            coupon_code: Set(None),
            currency: Set(ctx.currency.clone()),
            subtotal: Set(Decimal::ZERO),
            discount_amount: Set(Decimal::ZERO),
            tax_amount: Set(Decimal::ZERO),
            shipping_amount: Set(Decimal::ZERO),
            grand_total: Set(Decimal::ZERO),
            shipping_method: Set(None),
            reserved_order_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::CartCreated {
                cart_id: cart.id,
                masked_id: masked_id.clone(),
                store_id: ctx.store_id,
            })
            .await;

        info!("Created cart {} for store {}", cart.id, ctx.store_id);
        Ok(masked_id)
    }

    /// Adds products by SKU. A SKU already in the cart has its quantity increased.
    #[instrument(skip(self, items))]
    pub async fn add_cart_items(
        &self,
        external_business_id: &str,
        masked_id: &str,
        items: Vec<CartItemInput>,
    ) -> Result<CartView, ServiceError> {
        let ctx = self.pricing_context(external_business_id).await?;
        let skus: Vec<String> = items.iter().map(|i| i.sku.clone()).collect();
        let result = self.add_items_in_txn(&ctx, masked_id, &items).await;
        self.observe(result, || {
            ExceptionContext::new("add_cart_items", "cart_builder")
                .with_store(ctx.store_id)
                .with("cart_id", masked_id)
                .with("skus", skus)
        })
        .await
    }

    async fn add_items_in_txn(
        &self,
        ctx: &PricingContext,
        masked_id: &str,
        items: &[CartItemInput],
    ) -> Result<CartView, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::ValidationError(
                "At least one cart item is required".to_string(),
            ));
        }
        for input in items {
            input.validate()?;
        }

        let txn = self.db.begin().await?;
        let cart = load_active_cart(&txn, ctx.store_id, masked_id).await?;
        let now = Utc::now();
        let mut added = Vec::with_capacity(items.len());

        for input in items {
            let product = Product::find()
                .filter(product::Column::Sku.eq(input.sku.as_str()))
                .filter(product::Column::IsActive.eq(true))
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product with SKU {} not found", input.sku))
                })?;

            let existing = CartItem::find()
                .filter(cart_item::Column::CartId.eq(cart.id))
                .filter(cart_item::Column::Sku.eq(input.sku.as_str()))
                .one(&txn)
                .await?;

            let item = match existing {
                Some(line) => {
                    let qty = line.qty + input.qty;
                    let external_tax = input.tax_amount.or(line.external_tax_amount);
                    let mut active: cart_item::ActiveModel = line.into();
                    active.qty = Set(qty);
                    active.external_tax_amount = Set(external_tax);
                    active.updated_at = Set(now);
                    active.update(&txn).await?
                }
                None => {
                    cart_item::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        cart_id: Set(cart.id),
                        sku: Set(product.sku.clone()),
                        name: Set(product.name.clone()),
                        qty: Set(input.qty),
                        price: Set(product.price),
                        row_total: Set(product.price * Decimal::from(input.qty)),
                        discount_amount: Set(Decimal::ZERO),
                        external_tax_amount: Set(input.tax_amount),
                        created_at: Set(now),
                        updated_at: Set(now),
                    }
                    .insert(&txn)
                    .await?
                }
            };
            added.push((item.id, item.sku, input.qty));
        }

        let cart_id = cart.id;
        let view = recalculate(&txn, cart, ctx).await?;
        txn.commit().await?;

        for (item_id, sku, qty) in added {
            self.event_sender
                .send_or_log(Event::CartItemAdded {
                    cart_id,
                    item_id,
                    sku,
                    qty,
                })
                .await;
        }
        Ok(view)
    }

    /// Sets the quantity of one cart line, optionally replacing its external tax.
    #[instrument(skip(self))]
    pub async fn update_cart_item(
        &self,
        external_business_id: &str,
        masked_id: &str,
        item_id: Uuid,
        qty: i32,
        tax_amount: Option<Decimal>,
    ) -> Result<CartView, ServiceError> {
        let ctx = self.pricing_context(external_business_id).await?;
        let result = self
            .update_item_in_txn(&ctx, masked_id, item_id, qty, tax_amount)
            .await;
        self.observe(result, || {
            ExceptionContext::new("update_cart_item", "cart_builder")
                .with_store(ctx.store_id)
                .with("cart_id", masked_id)
                .with("item_id", item_id.to_string())
        })
        .await
    }

    async fn update_item_in_txn(
        &self,
        ctx: &PricingContext,
        masked_id: &str,
        item_id: Uuid,
        qty: i32,
        tax_amount: Option<Decimal>,
    ) -> Result<CartView, ServiceError> {
        if qty < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let cart = load_active_cart(&txn, ctx.store_id, masked_id).await?;
        let item = load_item(&txn, &cart, item_id).await?;

        let external_tax = tax_amount.or(item.external_tax_amount);
        let mut active: cart_item::ActiveModel = item.into();
        active.qty = Set(qty);
        active.external_tax_amount = Set(external_tax);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        let cart_id = cart.id;
        let view = recalculate(&txn, cart, ctx).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated {
                cart_id,
                item_id,
                qty,
            })
            .await;
        Ok(view)
    }

    #[instrument(skip(self))]
    pub async fn delete_cart_item(
        &self,
        external_business_id: &str,
        masked_id: &str,
        item_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let ctx = self.pricing_context(external_business_id).await?;
        let result = self.delete_item_in_txn(&ctx, masked_id, item_id).await;
        self.observe(result, || {
            ExceptionContext::new("delete_cart_item", "cart_builder")
                .with_store(ctx.store_id)
                .with("cart_id", masked_id)
                .with("item_id", item_id.to_string())
        })
        .await
    }

    async fn delete_item_in_txn(
        &self,
        ctx: &PricingContext,
        masked_id: &str,
        item_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = load_active_cart(&txn, ctx.store_id, masked_id).await?;
        let item = load_item(&txn, &cart, item_id).await?;
        item.delete(&txn).await?;

        let cart_id = cart.id;
        recalculate(&txn, cart, ctx).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved { cart_id, item_id })
            .await;
        Ok(true)
    }

    /// Applies a coupon code. Invalid, expired or exhausted codes are rejected as not found.
    #[instrument(skip(self))]
    pub async fn add_cart_coupon(
        &self,
        external_business_id: &str,
        masked_id: &str,
        code: &str,
    ) -> Result<CartView, ServiceError> {
        let ctx = self.pricing_context(external_business_id).await?;
        let result = self.apply_coupon_in_txn(&ctx, masked_id, code).await;
        self.observe(result, || {
            ExceptionContext::new("add_cart_coupon", "cart_builder")
                .with_store(ctx.store_id)
                .with("cart_id", masked_id)
                .with("coupon_code", code)
        })
        .await
    }

    async fn apply_coupon_in_txn(
        &self,
        ctx: &PricingContext,
        masked_id: &str,
        code: &str,
    ) -> Result<CartView, ServiceError> {
        let code = code.trim();
        let txn = self.db.begin().await?;
        let cart = load_active_cart(&txn, ctx.store_id, masked_id).await?;
        let (coupon, _rule) = find_valid_coupon(&txn, code, ctx.store_id, Utc::now()).await?;

        let cart_id = cart.id;
        let mut active: cart::ActiveModel = cart.into();
        active.coupon_code = Set(Some(coupon.code.clone()));
        let cart = active.update(&txn).await?;

        let view = recalculate(&txn, cart, ctx).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartCouponApplied {
                cart_id,
                code: coupon.code,
            })
            .await;
        Ok(view)
    }

    /// Removes the applied coupon. Returns false when none was applied.
    #[instrument(skip(self))]
    pub async fn delete_cart_coupon(
        &self,
        external_business_id: &str,
        masked_id: &str,
    ) -> Result<bool, ServiceError> {
        let ctx = self.pricing_context(external_business_id).await?;
        let result = self.remove_coupon_in_txn(&ctx, masked_id).await;
        self.observe(result, || {
            ExceptionContext::new("delete_cart_coupon", "cart_builder")
                .with_store(ctx.store_id)
                .with("cart_id", masked_id)
        })
        .await
    }

    async fn remove_coupon_in_txn(
        &self,
        ctx: &PricingContext,
        masked_id: &str,
    ) -> Result<bool, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = load_active_cart(&txn, ctx.store_id, masked_id).await?;
        if cart.coupon_code.is_none() {
            txn.rollback().await?;
            return Ok(false);
        }

        let cart_id = cart.id;
        let mut active: cart::ActiveModel = cart.into();
        active.coupon_code = Set(None);
        let cart = active.update(&txn).await?;
        recalculate(&txn, cart, ctx).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartCouponRemoved { cart_id })
            .await;
        Ok(true)
    }

    /// Records who is buying. Checkout keeps these values over the ones in the order request.
    #[instrument(skip(self, customer))]
    pub async fn set_cart_customer(
        &self,
        external_business_id: &str,
        masked_id: &str,
        customer: CartCustomerInput,
    ) -> Result<CartView, ServiceError> {
        let ctx = self.pricing_context(external_business_id).await?;
        let result = self.set_customer_in_txn(&ctx, masked_id, customer).await;
        self.observe(result, || {
            ExceptionContext::new("set_cart_customer", "cart_builder")
                .with_store(ctx.store_id)
                .with("cart_id", masked_id)
        })
        .await
    }

    async fn set_customer_in_txn(
        &self,
        ctx: &PricingContext,
        masked_id: &str,
        customer: CartCustomerInput,
    ) -> Result<CartView, ServiceError> {
        customer.validate()?;

        let txn = self.db.begin().await?;
        let cart = load_active_cart(&txn, ctx.store_id, masked_id).await?;
        let cart_id = cart.id;

        let mut active: cart::ActiveModel = cart.into();
        if let Some(email) = customer.email {
            active.customer_email = Set(Some(email.trim().to_lowercase()));
        }
        if let Some(first_name) = customer.first_name {
            active.customer_firstname = Set(Some(first_name));
        }
        if let Some(last_name) = customer.last_name {
            active.customer_lastname = Set(Some(last_name));
        }
        active.updated_at = Set(Utc::now());
        let cart = active.update(&txn).await?;

        let view = recalculate(&txn, cart, ctx).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartCustomerAssigned { cart_id })
            .await;
        Ok(view)
    }

    /// Selects one of the shipping options currently offered for the cart.
    #[instrument(skip(self))]
    pub async fn select_shipping_method(
        &self,
        external_business_id: &str,
        masked_id: &str,
        method_code: &str,
    ) -> Result<CartView, ServiceError> {
        let ctx = self.pricing_context(external_business_id).await?;
        let result = self.select_shipping_in_txn(&ctx, masked_id, method_code).await;
        self.observe(result, || {
            ExceptionContext::new("select_shipping_method", "cart_builder")
                .with_store(ctx.store_id)
                .with("cart_id", masked_id)
                .with("method_code", method_code)
        })
        .await
    }

    async fn select_shipping_in_txn(
        &self,
        ctx: &PricingContext,
        masked_id: &str,
        method_code: &str,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = load_active_cart(&txn, ctx.store_id, masked_id).await?;
        let (_, totals) = price_cart(&txn, &cart, ctx).await?;

        let offered = shipping_options(ctx, &totals)
            .iter()
            .any(|option| option.method_code == method_code);
        if !offered {
            return Err(ServiceError::InvalidInput(format!(
                "Shipping method {} is not available",
                method_code
            )));
        }

        let mut active: cart::ActiveModel = cart.into();
        active.shipping_method = Set(Some(method_code.to_string()));
        let cart = active.update(&txn).await?;
        let view = recalculate(&txn, cart, ctx).await?;
        txn.commit().await?;
        Ok(view)
    }

    #[instrument(skip(self))]
    pub async fn get_cart(
        &self,
        external_business_id: &str,
        masked_id: &str,
    ) -> Result<CartView, ServiceError> {
        let ctx = self.pricing_context(external_business_id).await?;
        let cart = load_cart(&*self.db, ctx.store_id, masked_id).await?;
        let (items, totals) = price_cart(&*self.db, &cart, &ctx).await?;
        Ok(CartView::new(&cart, &items, totals))
    }

    #[instrument(skip(self))]
    pub async fn cart_totals(
        &self,
        external_business_id: &str,
        masked_id: &str,
    ) -> Result<CartTotals, ServiceError> {
        Ok(self.get_cart(external_business_id, masked_id).await?.totals)
    }

    /// Carriers of the store that currently apply to the cart, with their prices.
    #[instrument(skip(self))]
    pub async fn cart_shipping_options(
        &self,
        external_business_id: &str,
        masked_id: &str,
    ) -> Result<Vec<ShippingOption>, ServiceError> {
        let ctx = self.pricing_context(external_business_id).await?;
        let cart = load_cart(&*self.db, ctx.store_id, masked_id).await?;
        let (_, totals) = price_cart(&*self.db, &cart, &ctx).await?;
        Ok(shipping_options(&ctx, &totals))
    }

    /// Logs a failed cart operation with its context and hands the result back unchanged.
    async fn observe<T>(
        &self,
        result: Result<T, ServiceError>,
        context: impl FnOnce() -> ExceptionContext,
    ) -> Result<T, ServiceError> {
        if let Err(err) = &result {
            if !matches!(err, ServiceError::NoSuchCart(_)) {
                self.telemetry.log_exception(err, context()).await;
            }
        }
        result
    }
}

/// Cart by masked id, provided it belongs to `store_id`.
pub async fn load_cart<C: ConnectionTrait>(
    conn: &C,
    store_id: i32,
    masked_id: &str,
) -> Result<CartModel, ServiceError> {
    Cart::find()
        .filter(cart::Column::MaskedId.eq(masked_id))
        .one(conn)
        .await?
        .filter(|cart| cart.store_id == Some(store_id))
        .ok_or_else(|| ServiceError::NoSuchCart(masked_id.to_string()))
}

async fn load_active_cart<C: ConnectionTrait>(
    conn: &C,
    store_id: i32,
    masked_id: &str,
) -> Result<CartModel, ServiceError> {
    let cart = load_cart(conn, store_id, masked_id).await?;
    if !cart.is_active {
        return Err(ServiceError::InvalidOperation(format!(
            "Cart {} is not active",
            masked_id
        )));
    }
    Ok(cart)
}

async fn load_item<C: ConnectionTrait>(
    conn: &C,
    cart: &CartModel,
    item_id: Uuid,
) -> Result<CartItemModel, ServiceError> {
    CartItem::find_by_id(item_id)
        .one(conn)
        .await?
        .filter(|item| item.cart_id == cart.id)
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "Cart {} doesn't contain item {}",
                cart.masked_id, item_id
            ))
        })
}

pub async fn cart_items<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
) -> Result<Vec<CartItemModel>, ServiceError> {
    Ok(CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .order_by_asc(cart_item::Column::CreatedAt)
        .order_by_asc(cart_item::Column::Sku)
        .all(conn)
        .await?)
}

/// Totals of a cart as it stands, without persisting anything. A coupon that is no
/// longer valid simply stops discounting.
pub async fn price_cart<C: ConnectionTrait>(
    conn: &C,
    cart: &CartModel,
    ctx: &PricingContext,
) -> Result<(Vec<CartItemModel>, CartTotals), ServiceError> {
    let items = cart_items(conn, cart.id).await?;

    let rule = match &cart.coupon_code {
        Some(code) => match find_valid_coupon(conn, code, ctx.store_id, Utc::now()).await {
            Ok((_, rule)) => Some(rule),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        },
        None => None,
    };

    let totals = recalculate_totals(&items, rule.as_ref(), ctx.tax_rate, &cart.currency);
    let shipping = cart
        .shipping_method
        .as_deref()
        .and_then(|code| ctx.carriers.iter().find(|p| p.method_code() == code))
        .and_then(|profile| profile.quote(totals.subtotal_after_discount(), totals.total_qty()))
        .unwrap_or(Decimal::ZERO);

    Ok((items, totals.with_shipping(shipping)))
}

/// Prices the cart and writes the line and cart totals back.
pub async fn recalculate<C: ConnectionTrait>(
    conn: &C,
    cart: CartModel,
    ctx: &PricingContext,
) -> Result<CartView, ServiceError> {
    let (items, totals) = price_cart(conn, &cart, ctx).await?;
    let now = Utc::now();

    let mut persisted = Vec::with_capacity(items.len());
    for (item, line) in items.into_iter().zip(totals.items.iter()) {
        if item.row_total == line.row_total && item.discount_amount == line.discount_amount {
            persisted.push(item);
            continue;
        }
        let mut active: cart_item::ActiveModel = item.into();
        active.row_total = Set(line.row_total);
        active.discount_amount = Set(line.discount_amount);
        active.updated_at = Set(now);
        persisted.push(active.update(conn).await?);
    }

    let mut active: cart::ActiveModel = cart.into();
    active.subtotal = Set(totals.subtotal);
    active.discount_amount = Set(totals.discount_amount);
    active.tax_amount = Set(totals.tax_amount);
    active.shipping_amount = Set(totals.shipping_amount);
    active.grand_total = Set(totals.grand_total);
    active.updated_at = Set(now);
    let cart = active.update(conn).await?;

    Ok(CartView::new(&cart, &persisted, totals))
}

fn shipping_options(ctx: &PricingContext, totals: &CartTotals) -> Vec<ShippingOption> {
    ctx.carriers
        .iter()
        .filter_map(|profile| {
            profile
                .quote(totals.subtotal_after_discount(), totals.total_qty())
                .map(|price| ShippingOption {
                    carrier_code: profile.carrier.to_string(),
                    method_code: profile.method_code(),
                    title: profile.title.clone(),
                    method_name: profile.method_name.clone(),
                    price,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::meta::telemetry::ExceptionContext;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        logged: Mutex<Vec<(String, ExceptionContext)>>,
    }

    #[async_trait]
    impl TelemetrySink for RecordingSink {
        async fn log_exception(&self, error: &ServiceError, context: ExceptionContext) {
            if let Ok(mut logged) = self.logged.lock() {
                logged.push((error.to_string(), context));
            }
        }
    }

    async fn setup() -> (CartService, Arc<RecordingSink>) {
        let db = Arc::new(crate::db::connect_in_memory().await.unwrap());
        let (tx, _rx) = tokio::sync::mpsc::channel(64);
        let system_config = Arc::new(SystemConfigService::new(db.clone()));
        for (store, ebid) in [(1, "biz_1"), (2, "biz_2")] {
            system_config
                .set(store, paths::EXTERNAL_BUSINESS_ID, Some(ebid))
                .await
                .unwrap();
        }
        system_config
            .set(0, paths::TAX_DEFAULT_RATE, Some("10"))
            .await
            .unwrap();

        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set("SKU1".into()),
            name: Set("Widget".into()),
            price: Set(dec!(12.50)),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*db)
        .await
        .unwrap();

        let sink = Arc::new(RecordingSink::default());
        let mut config = AppConfig::new("sqlite::memory:".into(), "127.0.0.1".into(), 0, "test".into());
        config.default_currency = "USD".into();
        let service = CartService::new(
            db,
            Arc::new(EventSender::new(tx)),
            Arc::new(config),
            system_config,
            sink.clone(),
        );
        (service, sink)
    }

    fn sku1(qty: i32) -> Vec<CartItemInput> {
        vec![CartItemInput {
            sku: "SKU1".into(),
            qty,
            tax_amount: None,
        }]
    }

    #[tokio::test]
    async fn adding_same_sku_twice_merges_lines() {
        let (service, _) = setup().await;
        let cart = service.create_cart("biz_1").await.unwrap();
        assert_eq!(cart.len(), MASKED_ID_LENGTH);

        service.add_cart_items("biz_1", &cart, sku1(1)).await.unwrap();
        let view = service.add_cart_items("biz_1", &cart, sku1(2)).await.unwrap();

        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].qty, 3);
        assert_eq!(view.totals.subtotal.round_dp(2), dec!(37.50));
        assert_eq!(view.totals.tax_amount.round_dp(2), dec!(3.75));
        assert_eq!(view.totals.grand_total.round_dp(2), dec!(41.25));
    }

    #[tokio::test]
    async fn cart_of_other_store_is_not_found() {
        let (service, sink) = setup().await;
        let cart = service.create_cart("biz_1").await.unwrap();

        let result = service.add_cart_items("biz_2", &cart, sku1(1)).await;
        assert!(matches!(result, Err(ServiceError::NoSuchCart(id)) if id == cart));

        let unknown = service.get_cart("biz_1", "missing").await;
        assert!(matches!(unknown, Err(ServiceError::NoSuchCart(_))));
        assert!(sink.logged.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_sku_is_logged_with_context() {
        let (service, sink) = setup().await;
        let cart = service.create_cart("biz_1").await.unwrap();
        let result = service
            .add_cart_items(
                "biz_1",
                &cart,
                vec![CartItemInput {
                    sku: "NOPE".into(),
                    qty: 1,
                    tax_amount: None,
                }],
            )
            .await;
        assert!(matches!(result, Err(ServiceError::NotFound(msg)) if msg.contains("NOPE")));

        let logged = sink.logged.lock().unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].1.event, "add_cart_items");
        assert_eq!(logged[0].1.extra["cart_id"], cart.as_str());
    }

    #[tokio::test]
    async fn zero_quantity_update_is_rejected() {
        let (service, _) = setup().await;
        let cart = service.create_cart("biz_1").await.unwrap();
        let view = service.add_cart_items("biz_1", &cart, sku1(1)).await.unwrap();
        let item_id = view.items[0].item_id;

        let result = service.update_cart_item("biz_1", &cart, item_id, 0, None).await;
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));

        let updated = service
            .update_cart_item("biz_1", &cart, item_id, 4, Some(dec!(1.00)))
            .await
            .unwrap();
        assert_eq!(updated.items[0].qty, 4);
        assert_eq!(updated.totals.tax_amount.round_dp(2), dec!(1.00));
    }

    #[tokio::test]
    async fn deleting_item_clears_totals() {
        let (service, _) = setup().await;
        let cart = service.create_cart("biz_1").await.unwrap();
        let view = service.add_cart_items("biz_1", &cart, sku1(2)).await.unwrap();

        assert!(service
            .delete_cart_item("biz_1", &cart, view.items[0].item_id)
            .await
            .unwrap());
        let totals = service.cart_totals("biz_1", &cart).await.unwrap();
        assert_eq!(totals.grand_total, Decimal::ZERO);

        let again = service
            .delete_cart_item("biz_1", &cart, view.items[0].item_id)
            .await;
        assert!(matches!(again, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn invalid_coupon_is_rejected() {
        let (service, _) = setup().await;
        let cart = service.create_cart("biz_1").await.unwrap();
        let result = service.add_cart_coupon("biz_1", &cart, "BOGUS").await;
        assert!(
            matches!(result, Err(ServiceError::NotFound(msg)) if msg == "The coupon code \"BOGUS\" is not valid")
        );
        assert!(!service.delete_cart_coupon("biz_1", &cart).await.unwrap());
    }

    #[tokio::test]
    async fn flat_rate_is_offered_and_selectable() {
        let (service, _) = setup().await;
        let cart = service.create_cart("biz_1").await.unwrap();
        service.add_cart_items("biz_1", &cart, sku1(2)).await.unwrap();

        let options = service.cart_shipping_options("biz_1", &cart).await.unwrap();
        let flat = options
            .iter()
            .find(|o| o.carrier_code == "flatrate")
            .expect("flat rate offered by default");

        let view = service
            .select_shipping_method("biz_1", &cart, &flat.method_code)
            .await
            .unwrap();
        assert_eq!(view.totals.shipping_amount, flat.price);

        let bogus = service
            .select_shipping_method("biz_1", &cart, "carrier_pigeon")
            .await;
        assert!(matches!(bogus, Err(ServiceError::InvalidInput(_))));
    }
}
