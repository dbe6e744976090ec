//! API request handlers

pub mod config;
pub mod proxy;
