pub mod probe;
pub mod settings;
