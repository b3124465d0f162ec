pub mod address;
pub mod error;
pub mod models;
pub mod negotiation;
pub mod settings;
