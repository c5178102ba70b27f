pub mod compare;
pub mod config;
pub mod crawler;
pub mod download;
pub mod fetch;
pub mod filter;
pub mod listing;
pub mod retry;
