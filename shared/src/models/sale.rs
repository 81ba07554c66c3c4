//! Point-of-sale models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{ColorId, LocationId, ProductId, SizeId};

/// One line of a sale; always sold in pairs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleItem {
    pub product_id: ProductId,
    pub color_id: ColorId,
    pub size_id: SizeId,
    pub quantity: i64,
    pub price_per_item: Decimal,
}

impl SaleItem {
    /// Quantity × price, or `None` when the product overflows
    pub fn line_amount(&self) -> Option<Decimal> {
        Decimal::from(self.quantity).checked_mul(self.price_per_item)
    }
}

/// A point-of-sale order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrder {
    pub location_id: LocationId,
    pub items: Vec<SaleItem>,
    /// Must equal the sum of the line amounts
    pub total_amount: Decimal,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SalesOrder {
    /// Sum of the line amounts, or `None` when any step overflows
    pub fn computed_total(&self) -> Option<Decimal> {
        self.items.iter().try_fold(Decimal::ZERO, |total, item| {
            total.checked_add(item.line_amount()?)
        })
    }
}
