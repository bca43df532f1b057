//! Property-based tests for the stock ledger invariants.

use std::sync::Arc;

use inventory_service::{
    entities::MovementKind,
    errors::ServiceError,
    services::StockAdjustmentEngine,
    store::{InMemoryStore, NewProduct, StockStore},
};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn delta_strategy() -> impl Strategy<Value = i32> {
    prop_oneof![1i32..50, -50i32..=-1]
}

fn kind_for(delta: i32) -> MovementKind {
    if delta > 0 {
        MovementKind::Add
    } else {
        MovementKind::Deduct
    }
}

struct Outcome {
    final_stock: i32,
    applied: Vec<i32>,
    history: Vec<(i32, i32)>,
}

/// Applies `deltas` in order and reports which ones committed.
fn run_sequence(initial: i32, deltas: &[i32]) -> Outcome {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        let store = InMemoryStore::new();
        let product = store
            .create_product(NewProduct {
                name: "Prop".into(),
                sku: "PROP-1".into(),
                description: None,
                price: Decimal::ONE,
                stock: initial,
                low_stock_threshold: 0,
            })
            .await
            .unwrap();
        let engine = StockAdjustmentEngine::new(Arc::new(store.clone()));

        let mut applied = Vec::new();
        for &delta in deltas {
            match engine
                .adjust_stock(product.id, delta, kind_for(delta), "prop")
                .await
            {
                Ok(_) => applied.push(delta),
                Err(ServiceError::InsufficientStock { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        let final_stock = store.find_product(product.id).await.unwrap().unwrap().stock;
        let history = store
            .stock_history(product.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| (m.signed_quantity(), m.stock_after))
            .collect();

        Outcome {
            final_stock,
            applied,
            history,
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn stock_equals_initial_plus_committed_deltas(
        initial in 0i32..100,
        deltas in prop::collection::vec(delta_strategy(), 1..40),
    ) {
        let outcome = run_sequence(initial, &deltas);

        prop_assert!(outcome.final_stock >= 0);
        prop_assert_eq!(
            outcome.final_stock,
            initial + outcome.applied.iter().sum::<i32>()
        );
        prop_assert_eq!(outcome.history.len(), outcome.applied.len());
    }

    #[test]
    fn ledger_snapshots_form_a_running_total(
        initial in 0i32..100,
        deltas in prop::collection::vec(delta_strategy(), 1..40),
    ) {
        let outcome = run_sequence(initial, &deltas);

        let mut running = initial;
        for (expected_delta, (signed, stock_after)) in outcome.applied.iter().zip(&outcome.history) {
            prop_assert_eq!(expected_delta, signed);
            running += signed;
            prop_assert!(running >= 0);
            prop_assert_eq!(running, *stock_after);
        }
        prop_assert_eq!(running, outcome.final_stock);
    }

    #[test]
    fn rejected_deducts_are_exactly_the_overdrafts(
        initial in 0i32..30,
        deltas in prop::collection::vec(delta_strategy(), 1..30),
    ) {
        let outcome = run_sequence(initial, &deltas);

        // Replay the sequence: a delta is applied iff it keeps stock >= 0.
        let mut stock = initial;
        let mut expected = Vec::new();
        for &delta in &deltas {
            if stock + delta >= 0 {
                stock += delta;
                expected.push(delta);
            }
        }
        prop_assert_eq!(outcome.applied, expected);
        prop_assert_eq!(outcome.final_stock, stock);
    }
}
