pub mod auth;
pub mod organizations;
pub mod public;
pub mod tasks;
pub mod users;
