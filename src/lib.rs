pub mod annotate;
pub mod chat;
pub mod commands;
pub mod logging;
pub mod runtime;
pub mod settings;
