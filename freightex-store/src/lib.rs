pub mod app_config;
pub mod memory;

pub use app_config::{AppConfig, BusinessRules, GeoRules};
pub use memory::{MemoryStore, StoreState};
