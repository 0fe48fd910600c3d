pub mod rss;
pub mod scrape;
