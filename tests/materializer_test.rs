//! Materializer behavior: exactly-once order creation from completion events.

mod common;

use common::{sample_snapshot, spawn_app};
use rust_decimal_macros::dec;
use storefront_api::errors::ServiceError;
use storefront_api::events::Event;
use storefront_api::money::compute_totals;
use storefront_api::snapshot::{CartLine, Lines};

#[tokio::test]
async fn materializes_the_reference_scenario() {
    let app = spawn_app().await;
    let snapshot = sample_snapshot();
    let metadata = snapshot.encode().unwrap();

    let outcome = app
        .state
        .services
        .orders
        .materialize_paid_order("pi_ref_1", &metadata, Some(5038))
        .await
        .unwrap();

    assert!(outcome.is_created());
    let order = outcome.order();
    assert_eq!(order.payment_reference, "pi_ref_1");
    assert_eq!(order.status, "Paid");
    assert_eq!(order.subtotal, dec!(39.98));
    assert_eq!(order.tax, dec!(2.90));
    assert_eq!(order.shipping_rate, dec!(7.50));
    assert_eq!(order.total, dec!(50.38));
    assert_eq!(order.email, "ada@example.com");
    assert!(order.order_number.starts_with("ORD-"));

    let fetched = app
        .state
        .services
        .orders
        .get_by_reference("pi_ref_1")
        .await
        .unwrap()
        .expect("order should be queryable");
    assert_eq!(fetched.items.len(), 1);
    assert_eq!(fetched.items[0].name, "Widget");
    assert_eq!(fetched.items[0].quantity, 2);
    assert_eq!(fetched.items[0].unit_price, "$19.99");
}

#[tokio::test]
async fn repeated_delivery_is_idempotent() {
    let app = spawn_app().await;
    let metadata = sample_snapshot().encode().unwrap();

    let first = app
        .state
        .services
        .orders
        .materialize_paid_order("pi_dup", &metadata, None)
        .await
        .unwrap();
    assert!(first.is_created());

    for _ in 0..3 {
        let again = app
            .state
            .services
            .orders
            .materialize_paid_order("pi_dup", &metadata, None)
            .await
            .unwrap();
        assert!(!again.is_created());
        assert_eq!(again.order().order_number, first.order().order_number);
    }
}

#[tokio::test]
async fn concurrent_deliveries_produce_one_order() {
    let app = spawn_app().await;
    let metadata = sample_snapshot().encode().unwrap();
    let orders = &app.state.services.orders;

    let (a, b) = tokio::join!(
        orders.materialize_paid_order("pi_race", &metadata, None),
        orders.materialize_paid_order("pi_race", &metadata, None),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.order().id, b.order().id);
    assert_eq!(
        u32::from(a.is_created()) + u32::from(b.is_created()),
        1,
        "exactly one delivery creates the order"
    );
}

#[tokio::test]
async fn tampered_totals_fail_as_reconciliation_anomaly() {
    let app = spawn_app().await;
    let mut metadata = sample_snapshot().encode().unwrap();
    metadata.insert("total_amount".to_string(), "50.39".to_string());

    let err = app
        .state
        .services
        .orders
        .materialize_paid_order("pi_tampered", &metadata, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ReconciliationAnomaly { .. }));

    // Nothing was written.
    assert!(app
        .state
        .services
        .orders
        .get_by_reference("pi_tampered")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn charged_amount_must_match_the_carried_total() {
    let app = spawn_app().await;
    let metadata = sample_snapshot().encode().unwrap();

    let err = app
        .state
        .services
        .orders
        .materialize_paid_order("pi_short", &metadata, Some(5037))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ReconciliationAnomaly { .. }));
}

#[tokio::test]
async fn missing_required_fields_are_rejected() {
    let app = spawn_app().await;
    let mut metadata = sample_snapshot().encode().unwrap();
    metadata.remove("email");

    let err = app
        .state
        .services
        .orders
        .materialize_paid_order("pi_incomplete", &metadata, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn line_quantities_beyond_storage_range_are_rejected() {
    let app = spawn_app().await;
    let mut snapshot = sample_snapshot();
    let lines = vec![CartLine {
        name: "Confetti".to_string(),
        unit_price: 1,
        quantity: 3_000_000_000,
    }];
    snapshot.totals = compute_totals(&lines, snapshot.tax_rate, 750).unwrap();
    snapshot.lines = Lines::Itemized(lines);
    let metadata = snapshot.encode().unwrap();

    let err = app
        .state
        .services
        .orders
        .materialize_paid_order("pi_huge_qty", &metadata, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));

    // The transaction rolled back; no partial order row remains.
    assert!(app
        .state
        .services
        .orders
        .get_by_reference("pi_huge_qty")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn summarized_snapshots_still_materialize() {
    let app = spawn_app().await;
    let mut snapshot = sample_snapshot();
    snapshot.lines = Lines::Summarized("Widget x2".to_string());
    let metadata = snapshot.encode().unwrap();

    let outcome = app
        .state
        .services
        .orders
        .materialize_paid_order("pi_summary", &metadata, None)
        .await
        .unwrap();
    assert!(outcome.is_created());

    let fetched = app
        .state
        .services
        .orders
        .get_by_reference("pi_summary")
        .await
        .unwrap()
        .unwrap();
    // Per-line detail was lost in transport; totals still carried through.
    assert!(fetched.items.is_empty());
    assert_eq!(fetched.total, dec!(50.38));
}

#[tokio::test]
async fn creation_emits_a_fulfillment_event_once() {
    let mut app = spawn_app().await;
    let metadata = sample_snapshot().encode().unwrap();

    app.state
        .services
        .orders
        .materialize_paid_order("pi_evt", &metadata, None)
        .await
        .unwrap();
    app.state
        .services
        .orders
        .materialize_paid_order("pi_evt", &metadata, None)
        .await
        .unwrap();

    let Event::OrderMaterialized {
        payment_reference, ..
    } = app.receiver.recv().await.unwrap();
    assert_eq!(payment_reference, "pi_evt");
    // The duplicate delivery must not emit a second event.
    assert!(app.receiver.try_recv().is_err());
}
