/// Shared modules for the markets panel
pub mod config;
pub mod controller;
pub mod debounce;
pub mod favorites;
pub mod flash;
pub mod format;
pub mod notify;
pub mod sort_filter;
pub mod storage;
pub mod table;
