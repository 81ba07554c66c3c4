//! Catalogue product model

use serde::{Deserialize, Serialize};

use crate::types::ProductId;

/// A product as the inventory core sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    /// Pairs per box; always positive
    pub box_contents: i64,
}
