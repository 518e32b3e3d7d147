pub mod admin;
pub mod lobby;
pub mod overlay;
mod textures;
