pub mod business;
pub mod chat;
pub mod stream;
