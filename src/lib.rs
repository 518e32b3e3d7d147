pub mod models;
pub mod screens;
pub mod services;
