pub mod config;
pub mod db;
pub mod downloads;
pub mod favorites;
