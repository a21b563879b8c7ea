#![allow(async_fn_in_trait)]

pub mod config;
pub mod engage;
pub mod report;
pub mod scrape;
pub mod selectors;
pub mod util;
