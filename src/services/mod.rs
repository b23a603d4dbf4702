pub mod dedup_store;
pub mod hyperliquid;
pub mod monitor;
pub mod notifier;
pub mod pattern_state;
pub mod provider;
