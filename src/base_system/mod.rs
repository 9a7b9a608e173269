pub mod book_paths;
pub mod book_url;
pub mod config;
pub mod context;
pub mod logging;
