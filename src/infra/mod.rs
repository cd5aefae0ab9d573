pub mod alert_adapter;
pub mod in_memory_staging;
pub mod line_source;
pub mod offset_store;
pub mod publisher_adapter;
pub mod sqlite_staging;

pub use alert_adapter::{HttpAlertChannel, LogAlertChannel};
pub use in_memory_staging::InMemoryStagingStore;
pub use line_source::{LineSourceOptions, LineStreamSource};
pub use offset_store::OffsetStore;
pub use publisher_adapter::{HttpEventPublisher, LogEventPublisher};
pub use sqlite_staging::{SqliteStagingStore, StagingTable};
