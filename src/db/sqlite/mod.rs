mod common;
mod facts;
mod hosts;

pub use facts::SqliteFactRepo;
pub use hosts::SqliteHostRepo;
