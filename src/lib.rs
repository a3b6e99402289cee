pub mod auth;
pub mod brief;
pub mod catalog;
pub mod clock;
pub mod conf;
pub mod data;
pub mod docs;
pub mod error;
pub mod export;
pub mod generate;
pub mod identity;
pub mod jwt;
pub mod ledger;
pub mod parse;
pub mod prompt;
pub mod provider;
pub mod server;
pub mod service;
pub mod tracing;
pub mod types;
