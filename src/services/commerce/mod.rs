/// Commerce services module - guest carts, checkout and discounts
pub mod cart_service;
pub mod checkout_service;
pub mod discount_service;
pub mod tax;
pub mod totals;

pub use cart_service::{CartCustomerInput, CartItemInput, CartService, CartView, PricingContext, ShippingOption};
pub use checkout_service::{CheckoutService, CheckoutSession, CreateOrderInput, LastOrder, OrderView};
pub use discount_service::{DiscountService, NewsletterResult};
pub use totals::CartTotals;
