/// Entities owned by the Meta integration
pub mod facebook_order;
pub mod installed_feature;

pub use facebook_order::{Entity as FacebookOrder, Model as FacebookOrderModel};
pub use installed_feature::{Entity as InstalledFeature, Model as InstalledFeatureModel};
