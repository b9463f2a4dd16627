pub mod config;
pub mod health;
pub mod page;
pub mod sessions;
