pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod extractors;
pub mod models;
pub mod notify;
pub mod parsers;
pub mod report;
pub mod scanner;
pub mod storage;
pub mod utils;
