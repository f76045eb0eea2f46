pub mod commerce;
pub mod invoice;
pub mod meta;
pub mod newsletter_subscriber;
pub mod order;
pub mod order_item;
pub mod system_config;

pub use invoice::{Entity as Invoice, Model as InvoiceModel};
pub use newsletter_subscriber::{Entity as NewsletterSubscriber, Model as NewsletterSubscriberModel};
pub use order::{Entity as Order, Model as OrderModel};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use system_config::{Entity as SystemConfig, Model as SystemConfigModel};
