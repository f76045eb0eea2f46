/// Meta integration services: Graph API access, telemetry, connection management and feed export
pub mod connection;
pub mod graph_api;
pub mod shipping;
pub mod telemetry;

pub use connection::{ConnectionService, InstalledFeatureInput, MetaSettingsUpdate, MetaSettingsView};
pub use graph_api::{GraphApiClient, GraphApiError};
pub use shipping::{ShippingData, ShippingFileBuilder, ShippingProfile, ShippingSyncer, SyncResult};
pub use telemetry::{ExceptionContext, MetaTelemetry, TelemetrySink};
