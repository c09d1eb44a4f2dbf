pub mod cache;
pub mod cli;
pub mod config;
pub mod db;
pub mod decode;
pub mod error;
pub mod health;
pub mod history;
pub mod ingest;
pub mod model;
pub mod parsers;
pub mod pipeline;
pub mod report;
pub mod rules;
pub mod tree;
