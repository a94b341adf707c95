//! Clients for the external generation and embedding services.

pub mod embedding;
pub mod http;
pub mod provider;
