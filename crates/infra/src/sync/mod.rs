//! Network adapters for the sync coordinator
//!
//! - [`HttpSubmissionUploader`]: POSTs each submission to its type's endpoint
//! - [`HttpConnectivityProbe`]: reachability check against a health URL

pub mod connectivity;
pub mod uploader;

pub use connectivity::HttpConnectivityProbe;
pub use uploader::HttpSubmissionUploader;
