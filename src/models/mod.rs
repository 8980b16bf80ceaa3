pub mod auth;
pub mod catalog;
pub mod chat;
pub mod instagram;
pub mod order;
pub mod patch;
