pub mod analyzer;
pub mod config;
pub mod history;
pub mod news_search;
pub mod notifier;
pub mod sentinel;
