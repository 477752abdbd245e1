pub mod admin;
pub mod auth;
pub mod chat;
pub mod mood;
pub mod profile;
