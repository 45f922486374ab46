//! Application services: the event bus, the character data manager, the
//! settings layer, and the market cache.

pub mod data_manager;
pub mod events;
pub mod market;
pub mod settings;

pub use data_manager::DataManager;
pub use events::{EventBus, EventKind, EventPayload, HandlerId};
pub use market::MarketDataCache;
pub use settings::SettingsService;
