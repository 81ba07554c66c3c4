//! Movement engine tests
//!
//! Tests for the stock mutations the API exposes:
//! - Receipts, sales, rejects and opname adjustments
//! - One-shot transfers
//! - Reference idempotency and all-or-nothing failure

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    Balance, CellKey, ColorId, InventoryError, LocationId, MovementEngine, MovementKind,
    OpnameAdjustment, ProductId, ReceiveGoods, RejectRequest, SaleItem, SalesOrder, SizeId,
    StockKind, StockLedger, TransferItem, TransferRequest,
};

fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

fn box_cell(location: i64) -> CellKey {
    CellKey::dus(LocationId(location), ProductId(1), ColorId(1))
}

fn pair_cell(location: i64, size: i64) -> CellKey {
    CellKey::pasang(LocationId(location), ProductId(1), ColorId(1), SizeId(size))
}

fn engine_with(balances: Vec<(CellKey, Balance)>) -> MovementEngine {
    MovementEngine::from_parts(
        StockLedger::with_opening_balances(balances),
        Default::default(),
        [],
    )
}

fn sale(location: i64, size: i64, quantity: i64) -> SalesOrder {
    let price = Decimal::new(150_000, 0);
    SalesOrder {
        location_id: LocationId(location),
        items: vec![SaleItem {
            product_id: ProductId(1),
            color_id: ColorId(1),
            size_id: SizeId(size),
            quantity,
            price_per_item: price,
        }],
        total_amount: price * Decimal::from(quantity),
        reference_id: None,
        notes: None,
    }
}

fn pair_transfer(from: i64, to: i64, items: Vec<(i64, i64)>) -> TransferRequest {
    TransferRequest {
        source_location_id: LocationId(from),
        destination_location_id: LocationId(to),
        transfer_type: StockKind::Pasang,
        items: items
            .into_iter()
            .map(|(size, quantity)| TransferItem {
                product_id: ProductId(1),
                color_id: ColorId(1),
                size_id: Some(SizeId(size)),
                quantity,
            })
            .collect(),
        reference_id: None,
        notes: None,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Receiving boxes into an empty cell
    #[test]
    fn test_receive_goods_into_empty_cell() {
        let mut engine = MovementEngine::new();
        let outcome = engine
            .receive_goods(
                ReceiveGoods {
                    location_id: LocationId(1),
                    product_id: ProductId(1),
                    color_id: ColorId(1),
                    boxes: 10,
                    supplier: Some("CV Sumber Jaya".to_string()),
                    reference_id: Some("RCV-0001".to_string()),
                    notes: None,
                },
                at(),
            )
            .unwrap();

        assert_eq!(engine.ledger().get_balance(&box_cell(1)).box_stock, 10);
        assert_eq!(outcome.records.len(), 1);
        let record = &outcome.records[0];
        assert_eq!(record.kind, MovementKind::Receipt);
        assert_eq!(record.box_delta, Some(10));
        assert_eq!(record.pair_delta, None);
        assert_eq!(record.reference_id, "RCV-0001");
        assert_eq!(record.counterparty.as_deref(), Some("CV Sumber Jaya"));
    }

    /// A sale larger than stock fails and changes nothing
    #[test]
    fn test_oversell_is_rejected() {
        let mut engine = engine_with(vec![(pair_cell(1, 40), Balance::new(0, 20))]);

        let err = engine.sell(sale(1, 40, 25), at()).unwrap_err();

        match err {
            InventoryError::InsufficientStock { shortages } => {
                assert_eq!(shortages.len(), 1);
                assert_eq!(shortages[0].cell, pair_cell(1, 40));
                assert_eq!(shortages[0].requested, 25);
                assert_eq!(shortages[0].available, 20);
                assert_eq!(shortages[0].shortfall(), 5);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(engine.ledger().get_balance(&pair_cell(1, 40)).pair_stock, 20);
        assert!(engine.ledger().records().is_empty());
    }

    /// Transfer of pairs between two locations
    #[test]
    fn test_transfer_moves_pairs() {
        let mut engine = engine_with(vec![(pair_cell(1, 40), Balance::new(0, 10))]);

        let outcome = engine
            .transfer(pair_transfer(1, 2, vec![(40, 5)]), at())
            .unwrap();

        assert_eq!(engine.ledger().get_balance(&pair_cell(1, 40)).pair_stock, 5);
        assert_eq!(engine.ledger().get_balance(&pair_cell(2, 40)).pair_stock, 5);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].kind, MovementKind::TransferOut);
        assert_eq!(outcome.records[1].kind, MovementKind::TransferIn);
        assert_eq!(outcome.records[0].reference_id, outcome.records[1].reference_id);
        assert_eq!(outcome.records[0].pair_delta, Some(-5));
        assert_eq!(outcome.records[1].pair_delta, Some(5));
    }

    /// Opname records both counts for audit
    #[test]
    fn test_opname_applies_difference() {
        let mut engine = engine_with(vec![(pair_cell(1, 41), Balance::new(0, 45))]);

        let outcome = engine
            .adjust_opname(
                OpnameAdjustment {
                    location_id: LocationId(1),
                    stock_kind: StockKind::Pasang,
                    product_id: ProductId(1),
                    color_id: ColorId(1),
                    size_id: Some(SizeId(41)),
                    physical_count: 50,
                    system_count: 45,
                    reason: Some("monthly count".to_string()),
                    reference_id: None,
                },
                at(),
            )
            .unwrap();

        assert_eq!(engine.ledger().get_balance(&pair_cell(1, 41)).pair_stock, 50);
        let record = &outcome.records[0];
        assert_eq!(record.kind, MovementKind::OpnameAdjust);
        assert_eq!(record.pair_delta, Some(5));
        assert_eq!(record.system_count, Some(45));
        assert_eq!(record.physical_count, Some(50));
    }

    /// A count that matches the system still leaves an audit record
    #[test]
    fn test_opname_without_difference_is_recorded() {
        let mut engine = engine_with(vec![(box_cell(1), Balance::new(7, 0))]);

        let outcome = engine
            .adjust_opname(
                OpnameAdjustment {
                    location_id: LocationId(1),
                    stock_kind: StockKind::Dus,
                    product_id: ProductId(1),
                    color_id: ColorId(1),
                    size_id: None,
                    physical_count: 7,
                    system_count: 7,
                    reason: None,
                    reference_id: None,
                },
                at(),
            )
            .unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].box_delta, Some(0));
        assert_eq!(engine.ledger().get_balance(&box_cell(1)).box_stock, 7);
    }

    /// Opname may not bring a cell below zero
    #[test]
    fn test_opname_cannot_go_negative() {
        let mut engine = engine_with(vec![(pair_cell(1, 40), Balance::new(0, 3))]);

        let err = engine
            .adjust_opname(
                OpnameAdjustment {
                    location_id: LocationId(1),
                    stock_kind: StockKind::Pasang,
                    product_id: ProductId(1),
                    color_id: ColorId(1),
                    size_id: Some(SizeId(40)),
                    physical_count: 0,
                    system_count: 10,
                    reason: None,
                    reference_id: None,
                },
                at(),
            )
            .unwrap_err();

        assert!(matches!(err, InventoryError::InsufficientStock { .. }));
        assert_eq!(engine.ledger().get_balance(&pair_cell(1, 40)).pair_stock, 3);
    }

    /// Rejects need a reason and remove pairs
    #[test]
    fn test_reject_requires_reason() {
        let mut engine = engine_with(vec![(pair_cell(1, 42), Balance::new(0, 4))]);
        let reject = |reason: &str| RejectRequest {
            location_id: LocationId(1),
            product_id: ProductId(1),
            color_id: ColorId(1),
            size_id: SizeId(42),
            quantity: 1,
            reason: reason.to_string(),
            reference_id: None,
        };

        assert!(matches!(
            engine.record_reject(reject("  "), at()),
            Err(InventoryError::InvalidMovement { .. })
        ));

        let outcome = engine.record_reject(reject("sole detached"), at()).unwrap();
        assert_eq!(outcome.records[0].kind, MovementKind::Reject);
        assert_eq!(outcome.records[0].notes.as_deref(), Some("sole detached"));
        assert_eq!(engine.ledger().get_balance(&pair_cell(1, 42)).pair_stock, 3);
    }

    /// Transfers to the same location are malformed
    #[test]
    fn test_transfer_to_same_location_is_invalid() {
        let mut engine = engine_with(vec![(pair_cell(1, 40), Balance::new(0, 10))]);

        let err = engine
            .transfer(pair_transfer(1, 1, vec![(40, 1)]), at())
            .unwrap_err();

        assert!(matches!(err, InventoryError::InvalidMovement { .. }));
    }

    /// Pair transfers need a size on every item
    #[test]
    fn test_pair_transfer_requires_size() {
        let mut engine = MovementEngine::new();
        let mut request = pair_transfer(1, 2, vec![(40, 1)]);
        request.items[0].size_id = None;

        match engine.transfer(request, at()).unwrap_err() {
            InventoryError::InvalidMovement { violations } => {
                assert!(violations.iter().any(|v| v.field == "size_id"));
            }
            other => panic!("expected InvalidMovement, got {other:?}"),
        }
    }

    /// A sale whose total does not add up is refused
    #[test]
    fn test_sale_total_must_match_items() {
        let mut engine = engine_with(vec![(pair_cell(1, 40), Balance::new(0, 10))]);
        let mut order = sale(1, 40, 2);
        order.total_amount += Decimal::ONE;

        assert!(matches!(
            engine.sell(order, at()),
            Err(InventoryError::InvalidMovement { .. })
        ));
        assert_eq!(engine.ledger().get_balance(&pair_cell(1, 40)).pair_stock, 10);
    }

    /// Line amounts too large to represent are refused, not panicked on
    #[test]
    fn test_sale_with_overflowing_amount() {
        let mut engine = engine_with(vec![(pair_cell(1, 40), Balance::new(0, 10))]);
        let mut order = sale(1, 40, 1);
        order.items[0].quantity = i64::MAX;
        order.items[0].price_per_item = Decimal::from(1_000_000_000_000i64);

        match engine.sell(order, at()) {
            Err(InventoryError::InvalidMovement { violations }) => {
                assert!(violations.iter().any(|v| v.field == "total_amount"));
            }
            other => panic!("expected InvalidMovement, got {other:?}"),
        }
        assert_eq!(engine.ledger().get_balance(&pair_cell(1, 40)).pair_stock, 10);
    }

    /// Prices finer than a cent would be rounded on storage
    #[test]
    fn test_sale_price_with_sub_cent_precision() {
        let mut engine = engine_with(vec![(pair_cell(1, 40), Balance::new(0, 10))]);
        let mut order = sale(1, 40, 1);
        order.items[0].price_per_item = Decimal::new(5, 3);
        order.total_amount = Decimal::new(5, 3);

        assert!(matches!(
            engine.sell(order, at()),
            Err(InventoryError::InvalidMovement { .. })
        ));
        assert!(engine.ledger().records().is_empty());
    }

    /// One short item fails the whole transfer
    #[test]
    fn test_partial_transfer_is_not_applied() {
        let mut engine = engine_with(vec![
            (pair_cell(1, 40), Balance::new(0, 10)),
            (pair_cell(1, 41), Balance::new(0, 1)),
        ]);

        let err = engine
            .transfer(pair_transfer(1, 2, vec![(40, 5), (41, 2)]), at())
            .unwrap_err();

        assert!(matches!(err, InventoryError::InsufficientStock { .. }));
        assert_eq!(engine.ledger().get_balance(&pair_cell(1, 40)).pair_stock, 10);
        assert_eq!(engine.ledger().get_balance(&pair_cell(2, 40)).pair_stock, 0);
        assert!(engine.ledger().records().is_empty());
    }

    /// Repeating a reference replays the first outcome
    #[test]
    fn test_repeated_reference_is_idempotent() {
        let mut engine = engine_with(vec![(pair_cell(1, 40), Balance::new(0, 10))]);
        let mut order = sale(1, 40, 3);
        order.reference_id = Some("POS-77".to_string());

        let first = engine.sell(order.clone(), at()).unwrap();
        let second = engine.sell(order, at()).unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.records, second.records);
        assert_eq!(engine.ledger().get_balance(&pair_cell(1, 40)).pair_stock, 7);
    }

    /// Errors serialize with a machine-readable code
    #[test]
    fn test_error_codes_are_stable() {
        let err = InventoryError::NoBoxesRemaining {
            batch_id: uuid::Uuid::nil(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "NO_BOXES_REMAINING");
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    #[derive(Debug, Clone)]
    enum Op {
        Sell { location: i64, size: i64, quantity: i64 },
        Transfer { from: i64, size: i64, quantity: i64 },
        Reject { location: i64, size: i64, quantity: i64 },
        Count { location: i64, size: i64, physical: i64 },
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        let location = 1i64..=2;
        let size = 40i64..=42;
        prop_oneof![
            (location.clone(), size.clone(), 1i64..=15)
                .prop_map(|(location, size, quantity)| Op::Sell { location, size, quantity }),
            (location.clone(), size.clone(), 1i64..=15)
                .prop_map(|(from, size, quantity)| Op::Transfer { from, size, quantity }),
            (location.clone(), size.clone(), 1i64..=5)
                .prop_map(|(location, size, quantity)| Op::Reject { location, size, quantity }),
            (location, size, 0i64..=30)
                .prop_map(|(location, size, physical)| Op::Count { location, size, physical }),
        ]
    }

    fn apply(engine: &mut MovementEngine, op: &Op) -> Result<(), InventoryError> {
        match op {
            Op::Sell { location, size, quantity } => {
                engine.sell(sale(*location, *size, *quantity), at()).map(|_| ())
            }
            Op::Transfer { from, size, quantity } => engine
                .transfer(pair_transfer(*from, 3 - *from, vec![(*size, *quantity)]), at())
                .map(|_| ()),
            Op::Reject { location, size, quantity } => engine
                .record_reject(
                    RejectRequest {
                        location_id: LocationId(*location),
                        product_id: ProductId(1),
                        color_id: ColorId(1),
                        size_id: SizeId(*size),
                        quantity: *quantity,
                        reason: "damaged".to_string(),
                        reference_id: None,
                    },
                    at(),
                )
                .map(|_| ()),
            Op::Count { location, size, physical } => {
                let system = engine.ledger().available(&pair_cell(*location, *size));
                engine
                    .adjust_opname(
                        OpnameAdjustment {
                            location_id: LocationId(*location),
                            stock_kind: StockKind::Pasang,
                            product_id: ProductId(1),
                            color_id: ColorId(1),
                            size_id: Some(SizeId(*size)),
                            physical_count: *physical,
                            system_count: system,
                            reason: None,
                            reference_id: None,
                        },
                        at(),
                    )
                    .map(|_| ())
            }
        }
    }

    fn all_cells() -> Vec<CellKey> {
        let mut cells = Vec::new();
        for location in 1..=2 {
            for size in 40..=42 {
                cells.push(pair_cell(location, size));
            }
        }
        cells
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Balances never go below zero, whatever is attempted
        #[test]
        fn prop_balances_never_negative(ops in prop::collection::vec(op_strategy(), 1..40)) {
            let mut engine = MovementEngine::new();
            for op in &ops {
                let _ = apply(&mut engine, op);
                for cell in all_cells() {
                    let balance = engine.ledger().get_balance(&cell);
                    prop_assert!(balance.pair_stock >= 0);
                    prop_assert!(balance.box_stock >= 0);
                }
            }
        }

        /// Folding the log from zero reproduces every stored balance
        #[test]
        fn prop_replay_matches_balances(ops in prop::collection::vec(op_strategy(), 1..40)) {
            let mut engine = MovementEngine::new();
            for op in &ops {
                let _ = apply(&mut engine, op);
            }
            for cell in all_cells() {
                prop_assert_eq!(
                    engine.ledger().rebuild_from_log(&cell),
                    engine.ledger().get_balance(&cell)
                );
            }
            prop_assert!(engine.ledger().verify_all().is_ok());
        }

        /// A failed movement leaves balances and log exactly as they were
        #[test]
        fn prop_failed_movement_changes_nothing(
            ops in prop::collection::vec(op_strategy(), 1..40)
        ) {
            let mut engine = MovementEngine::new();
            for op in &ops {
                let before: Vec<Balance> = all_cells()
                    .iter()
                    .map(|cell| engine.ledger().get_balance(cell))
                    .collect();
                let records_before = engine.ledger().records().len();

                if apply(&mut engine, op).is_err() {
                    let after: Vec<Balance> = all_cells()
                        .iter()
                        .map(|cell| engine.ledger().get_balance(cell))
                        .collect();
                    prop_assert_eq!(before, after);
                    prop_assert_eq!(records_before, engine.ledger().records().len());
                }
            }
        }

        /// Sales decrease pair stock by exactly the quantity sold
        #[test]
        fn prop_sale_decrements_exactly(stock in 0i64..100, quantity in 1i64..100) {
            let mut engine = engine_with(vec![(pair_cell(1, 40), Balance::new(0, stock))]);
            let result = engine.sell(sale(1, 40, quantity), at());

            if quantity <= stock {
                prop_assert!(result.is_ok());
                prop_assert_eq!(engine.ledger().available(&pair_cell(1, 40)), stock - quantity);
            } else {
                prop_assert!(
                    matches!(result, Err(InventoryError::InsufficientStock { .. })),
                    "expected InsufficientStock"
                );
                prop_assert_eq!(engine.ledger().available(&pair_cell(1, 40)), stock);
            }
        }
    }
}
