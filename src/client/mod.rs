//! Document submission client.

mod api;
mod document;
mod transport;

pub use api::CrptApi;
pub use document::{DocType, Document, DocumentRequest, Product};
pub use transport::{DocumentTransport, HttpTransport};
