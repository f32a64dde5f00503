//! Document schema for the "introduce goods" submission.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Document type accepted by the creation endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocType {
    /// Introduction of goods into circulation
    #[default]
    #[serde(rename = "LP_INTRODUCE_GOODS")]
    IntroduceGoods,
}

/// A goods introduction document.
///
/// Field names follow the remote API's JSON schema, which mixes camelCase
/// and snake_case keys. Dates serialize as `yyyy-MM-dd`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "participantInn")]
    pub participant_inn: String,
    pub doc_id: String,
    pub doc_status: String,
    #[serde(default)]
    pub doc_type: DocType,
    #[serde(rename = "importRequest")]
    pub import_request: bool,
    pub owner_inn: String,
    pub producer_inn: String,
    pub production_date: NaiveDate,
    pub production_type: String,
    #[serde(default)]
    pub products: Vec<Product>,
    pub reg_date: NaiveDate,
    pub reg_number: String,
}

/// A product line within a [`Document`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub certificate_document: String,
    pub certificate_document_date: NaiveDate,
    pub certificate_document_number: String,
    pub owner_inn: String,
    pub producer_inn: String,
    pub production_date: NaiveDate,
    pub tnved_code: String,
    pub uit_code: String,
    pub uitu_code: String,
}

/// Request body: the document plus its detached signature.
#[derive(Debug, Serialize)]
pub struct DocumentRequest<'a> {
    pub description: &'a Document,
    pub signature: &'a str,
}

impl<'a> DocumentRequest<'a> {
    /// Pair a document with its signature.
    pub fn new(description: &'a Document, signature: &'a str) -> Self {
        Self {
            description,
            signature,
        }
    }

    /// Serialize the request body to JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
