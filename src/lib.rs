//! Firmware scraper library
//!
//! This library provides the crawl/download engine behind the `fwscrape` CLI and the
//! decoded-artifact comparison harness behind `fwcompare`.

pub mod commands;
pub mod core;
pub mod error;
pub mod utils;
