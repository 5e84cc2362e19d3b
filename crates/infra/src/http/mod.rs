//! HTTP client plumbing shared by the uploader and connectivity probe

pub mod client;

pub use client::{HttpClient, HttpClientBuilder};
