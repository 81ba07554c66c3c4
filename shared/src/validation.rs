//! Input validation for movement requests
//!
//! Every validator collects all problems of a request before failing, so a
//! caller can fix a whole form in one round trip.

use rust_decimal::Decimal;

use crate::error::{violations_to_result, InventoryResult, Violation};
use crate::models::{
    OpnameAdjustment, PhysicalCount, ReceiveGoods, RejectRequest, SalesOrder, StartConversion,
    TransferItem, TransferRequest,
};
use crate::types::StockKind;

/// Longest accepted reference id
pub const MAX_REFERENCE_LEN: usize = 64;

/// Decimal places kept for prices and totals
pub const MONEY_SCALE: u32 = 2;

/// Exclusive upper bound of a stored price or total (`NUMERIC(14, 2)`)
pub const MONEY_LIMIT: i64 = 1_000_000_000_000;

// ============================================================================
// Field Validations
// ============================================================================

/// Validate that a quantity is strictly positive
pub fn validate_positive_quantity(quantity: i64) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("must be greater than zero");
    }
    Ok(())
}

/// Validate that a count is not negative
pub fn validate_count(count: i64) -> Result<(), &'static str> {
    if count < 0 {
        return Err("cannot be negative");
    }
    Ok(())
}

/// Validate pairs-per-box of a product
pub fn validate_box_contents(box_contents: i64) -> Result<(), &'static str> {
    if box_contents <= 0 {
        return Err("box contents must be greater than zero");
    }
    Ok(())
}

/// Validate a mandatory free-text reason
pub fn validate_reason(reason: &str) -> Result<(), &'static str> {
    if reason.trim().is_empty() {
        return Err("reason is required");
    }
    Ok(())
}

/// Validate an amount of money against what the ledger can store exactly
pub fn validate_money(amount: Decimal) -> Result<(), &'static str> {
    if amount < Decimal::ZERO {
        return Err("cannot be negative");
    }
    if amount.normalize().scale() > MONEY_SCALE {
        return Err("at most two decimal places are allowed");
    }
    if amount >= Decimal::from(MONEY_LIMIT) {
        return Err("exceeds the largest storable amount");
    }
    Ok(())
}

/// Validate a unit price
pub fn validate_price(price: Decimal) -> Result<(), &'static str> {
    validate_money(price)
}

/// Validate that a sales total is storable and equals the sum of its lines
pub fn validate_sales_total(order: &SalesOrder) -> Result<(), &'static str> {
    validate_money(order.total_amount)?;
    match order.computed_total() {
        Some(total) if total == order.total_amount => Ok(()),
        Some(_) => Err("total amount must equal the sum of quantity × price per item"),
        None => Err("sum of quantity × price per item is too large"),
    }
}

fn reference_violation(reference_id: Option<&str>) -> Option<Violation> {
    let reference = reference_id?;
    if reference.trim().is_empty() {
        return Some(Violation::new("reference_id", "cannot be blank"));
    }
    if reference.len() > MAX_REFERENCE_LEN {
        return Some(Violation::new(
            "reference_id",
            format!("must be at most {} characters", MAX_REFERENCE_LEN),
        ));
    }
    None
}

fn push_err(violations: &mut Vec<Violation>, field: &str, result: Result<(), &'static str>) {
    if let Err(message) = result {
        violations.push(Violation::new(field, message));
    }
}

// ============================================================================
// Request Validations
// ============================================================================

/// Validate an optional caller-supplied reference
pub fn validate_reference(reference_id: Option<&str>) -> InventoryResult<()> {
    violations_to_result(reference_violation(reference_id).into_iter().collect())
}

pub fn validate_receipt(request: &ReceiveGoods) -> InventoryResult<()> {
    let mut violations = Vec::new();
    push_err(&mut violations, "boxes", validate_positive_quantity(request.boxes));
    violations.extend(reference_violation(request.reference_id.as_deref()));
    violations_to_result(violations)
}

fn item_violations(kind: StockKind, index: usize, item: &TransferItem) -> Vec<Violation> {
    let mut violations = Vec::new();
    if let Err(message) = validate_positive_quantity(item.quantity) {
        violations.push(Violation::new("quantity", message).at_item(index));
    }
    match (kind, item.size_id) {
        (StockKind::Pasang, None) => violations
            .push(Violation::new("size_id", "required for pair transfers").at_item(index)),
        (StockKind::Dus, Some(_)) => violations
            .push(Violation::new("size_id", "not allowed for box transfers").at_item(index)),
        _ => {}
    }
    violations
}

pub fn validate_transfer(request: &TransferRequest) -> InventoryResult<()> {
    let mut violations = Vec::new();
    if request.source_location_id == request.destination_location_id {
        violations.push(Violation::new(
            "destination_location_id",
            "must differ from the source location",
        ));
    }
    if request.items.is_empty() {
        violations.push(Violation::new("items", "at least one item is required"));
    }
    for (index, item) in request.items.iter().enumerate() {
        violations.extend(item_violations(request.transfer_type, index, item));
    }
    violations.extend(reference_violation(request.reference_id.as_deref()));
    violations_to_result(violations)
}

pub fn validate_start_conversion(request: &StartConversion) -> InventoryResult<()> {
    let mut violations = Vec::new();
    push_err(&mut violations, "boxes", validate_positive_quantity(request.boxes));
    violations.extend(reference_violation(request.reference_id.as_deref()));
    violations_to_result(violations)
}

pub fn validate_physical_count(request: &PhysicalCount) -> InventoryResult<()> {
    let mut violations = Vec::new();
    push_err(&mut violations, "pairs", validate_count(request.pairs));
    violations.extend(reference_violation(request.reference_id.as_deref()));
    violations_to_result(violations)
}

pub fn validate_sale(order: &SalesOrder) -> InventoryResult<()> {
    let mut violations = Vec::new();
    if order.items.is_empty() {
        violations.push(Violation::new("items", "at least one item is required"));
    }
    for (index, item) in order.items.iter().enumerate() {
        if let Err(message) = validate_positive_quantity(item.quantity) {
            violations.push(Violation::new("quantity", message).at_item(index));
        }
        if let Err(message) = validate_price(item.price_per_item) {
            violations.push(Violation::new("price_per_item", message).at_item(index));
        }
    }
    push_err(&mut violations, "total_amount", validate_sales_total(order));
    violations.extend(reference_violation(order.reference_id.as_deref()));
    violations_to_result(violations)
}

pub fn validate_reject(request: &RejectRequest) -> InventoryResult<()> {
    let mut violations = Vec::new();
    push_err(&mut violations, "quantity", validate_positive_quantity(request.quantity));
    push_err(&mut violations, "reason", validate_reason(&request.reason));
    violations.extend(reference_violation(request.reference_id.as_deref()));
    violations_to_result(violations)
}

pub fn validate_opname(request: &OpnameAdjustment) -> InventoryResult<()> {
    let mut violations = Vec::new();
    push_err(&mut violations, "physical_count", validate_count(request.physical_count));
    push_err(&mut violations, "system_count", validate_count(request.system_count));
    match (request.stock_kind, request.size_id) {
        (StockKind::Pasang, None) => {
            violations.push(Violation::new("size_id", "required for pair stock"))
        }
        (StockKind::Dus, Some(_)) => {
            violations.push(Violation::new("size_id", "not allowed for box stock"))
        }
        _ => {}
    }
    violations.extend(reference_violation(request.reference_id.as_deref()));
    violations_to_result(violations)
}
