//! Built-in per-lead enrichers.

mod contact_crawler;

pub use contact_crawler::ContactCrawler;
