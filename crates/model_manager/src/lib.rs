//! Model manager
//!
//! Catalogs local AI model files and enriches them with metadata from civitai.com.

pub mod commands;
