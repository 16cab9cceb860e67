//! Remote collaborators for nva
//!
//! [`Client`] is the seam between the graph/blob handles and the service
//! that stores agents, graphs, entries and bytes. [`HttpClient`] talks to
//! the GraphQL API; [`MemoryClient`] keeps everything in process.

pub mod client;
pub mod http;
pub mod memory;

pub use client::{Client, EntryParent, RemoteBlobs, RemoteGraph};
pub use http::HttpClient;
pub use memory::{Fault, MemoryClient};
