// Cart, checkout and coupon services
pub mod commerce;

// Graph API, telemetry and shipping export
pub mod meta;

// Store scoped settings
pub mod system_config;
