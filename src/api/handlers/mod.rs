//! HTTP request handlers

pub mod root;
