mod facts;
mod hosts;

pub use facts::PostgresFactRepo;
pub use hosts::PostgresHostRepo;
