pub mod chat;
pub mod completions;
pub mod health;
pub mod models;
pub mod openai;
pub mod platform;
