pub mod purchase;
pub mod user;
pub mod webhook;
