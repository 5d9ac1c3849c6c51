pub mod cli;
pub mod client;
pub mod export;
pub mod extract;
pub mod fetch;
pub mod sql;
