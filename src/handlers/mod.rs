pub mod auth;
pub mod catalog;
pub mod chats;
pub mod instagram;
pub mod orders;
