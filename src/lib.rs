pub mod adf;
pub mod config;
pub mod errors;
pub mod execution;
pub mod gate;
pub mod process;
pub mod prompt;
pub mod server;
pub mod ticket;
