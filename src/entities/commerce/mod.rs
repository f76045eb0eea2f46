/// Commerce entities module
pub mod cart;
pub mod cart_item;
pub mod coupon;
pub mod product;
pub mod sales_rule;

pub use cart::{Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use coupon::{Entity as Coupon, Model as CouponModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use sales_rule::{CouponFormat, DiscountType, Entity as SalesRule, Model as SalesRuleModel};
