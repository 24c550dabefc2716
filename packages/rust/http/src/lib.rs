//! Outbound HTTP layer for leadscout.
//!
//! This crate provides:
//! - [`HttpClient`]: cached, retried, concurrency-bounded request client
//! - [`FetchChain`]: render → proxy → plain HTML fetch strategy

pub mod client;
pub mod strategy;

pub use client::{HttpClient, RequestOptions, default_cache_key};
pub use strategy::{FetchChain, FetchStage, FetchedHtml, looks_bot_blocked};
