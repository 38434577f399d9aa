pub mod db_utils;
pub mod username_cache;
pub mod username_filter;
