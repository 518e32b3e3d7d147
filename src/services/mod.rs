pub mod asset_names;
pub mod config_loader;
pub mod crown_tracker;
pub mod image_cache;
pub mod match_store;
pub mod match_sync;
