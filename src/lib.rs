pub mod config;
pub mod error;
pub mod formats;
pub mod freezer;
pub mod job;
pub mod models;
pub mod pipeline;
pub mod quality;
pub mod retriever;
pub mod sentinels;
pub mod terminology;
pub mod textutil;
