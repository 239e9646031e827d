//! Integration tests for the order engine against the in-memory store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{AddressId, BuyerId, ProductId};
use domain::{
    Address, Buyer, InvoiceNumber, InvoiceNumberGenerator, Money, OrderError, OrderStatus,
    PlaceOrder, Product, UuidInvoiceNumbers, Weight,
};
use engine::{
    EngineConfig, EngineError, Entity, OrderAssembler, OrderLifecycleService, OrderQueries,
};
use store::{InMemoryOrderStore, OrderFilter, OrderScope};

struct TestHarness {
    store: InMemoryOrderStore,
    assembler: OrderAssembler<InMemoryOrderStore>,
    queries: OrderQueries<InMemoryOrderStore>,
    lifecycle: OrderLifecycleService<InMemoryOrderStore>,
}

impl TestHarness {
    /// Buyers 1 and 2 with addresses 1 and 2 respectively.
    fn new() -> Self {
        let store = InMemoryOrderStore::new();
        for id in 1..=2 {
            store.add_buyer(Buyer {
                id: BuyerId::new(id),
                name: format!("Buyer {id}"),
            });
            store.add_address(Address {
                id: AddressId::new(id),
                buyer_id: BuyerId::new(id),
                recipient_name: format!("Buyer {id}"),
                detail: format!("Street {id}"),
            });
        }

        Self {
            assembler: OrderAssembler::new(store.clone()),
            queries: OrderQueries::new(store.clone()),
            lifecycle: OrderLifecycleService::new(store.clone()),
            store,
        }
    }

    fn with_invoice_numbers(mut self, generator: Arc<dyn InvoiceNumberGenerator>) -> Self {
        self.assembler = OrderAssembler::new(self.store.clone()).with_invoice_numbers(generator);
        self
    }

    fn stock_product(&self, id: i64, price_cents: i64, stock: u32) {
        self.store.put_product(Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            description: format!("Description {id}"),
            price: Money::from_cents(price_cents),
            stock,
            weight: Weight::from_grams(200),
            images: vec![format!("{id}.jpg")],
        });
    }

    fn stock_of(&self, id: i64) -> u32 {
        self.store.product(ProductId::new(id)).unwrap().stock
    }
}

fn request(buyer: i64) -> PlaceOrder {
    PlaceOrder::new(buyer, buyer, Money::zero(), "bank_transfer")
}

/// Repeats its first number once, then behaves like the UUID generator.
struct RepeatingInvoiceNumbers {
    repeats: Mutex<u32>,
}

impl RepeatingInvoiceNumbers {
    fn new(repeats: u32) -> Self {
        Self {
            repeats: Mutex::new(repeats),
        }
    }
}

impl InvoiceNumberGenerator for RepeatingInvoiceNumbers {
    fn generate(&self) -> InvoiceNumber {
        let mut repeats = self.repeats.lock().unwrap();
        if *repeats > 0 {
            *repeats -= 1;
            InvoiceNumber::new("INV-FIXED")
        } else {
            UuidInvoiceNumbers.generate()
        }
    }
}

struct ConstantInvoiceNumbers;

impl InvoiceNumberGenerator for ConstantInvoiceNumbers {
    fn generate(&self) -> InvoiceNumber {
        InvoiceNumber::new("INV-CONSTANT")
    }
}

#[tokio::test]
async fn test_last_units_then_insufficient_stock() {
    let h = TestHarness::new();
    h.stock_product(1, 1000, 2);

    let order = h
        .assembler
        .create_order(
            PlaceOrder::new(1, 1, Money::from_cents(500), "bank_transfer").with_item(
                1,
                2,
                Money::from_cents(1000),
            ),
        )
        .await
        .unwrap();

    assert_eq!(order.total_amount().to_string(), "25.00");
    assert_eq!(order.status(), OrderStatus::Pending);
    assert!(order.invoice_number().as_str().starts_with("INV-"));
    assert_eq!(h.stock_of(1), 0);

    let second = h
        .assembler
        .create_order(request(2).with_item(1, 1, Money::from_cents(1000)))
        .await;
    assert!(matches!(
        second,
        Err(EngineError::InsufficientStock {
            requested: 1,
            available: 0,
            ..
        })
    ));
    assert_eq!(h.stock_of(1), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_orders_never_oversell() {
    let h = Arc::new(TestHarness::new());
    h.stock_product(1, 100, 10);

    let mut handles = Vec::new();
    for n in 0..40u32 {
        let h = Arc::clone(&h);
        let quantity = n % 3 + 1;
        handles.push(tokio::spawn(async move {
            let result = h
                .assembler
                .create_order(request(1).with_item(1, quantity, Money::from_cents(100)))
                .await;
            (quantity, result)
        }));
    }

    let mut sold = 0;
    for (quantity, result) in futures_util::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
    {
        match result {
            Ok(_) => sold += quantity,
            Err(e) => assert!(
                matches!(e, EngineError::InsufficientStock { .. }),
                "unexpected error: {e}"
            ),
        }
    }

    assert!(sold <= 10);
    assert_eq!(h.stock_of(1), 10 - sold);
    let page = h
        .queries
        .list(&OrderFilter::for_buyer(BuyerId::new(1)).page_size(100))
        .await
        .unwrap();
    let booked: u64 = page.orders.iter().map(|o| o.total_quantity()).sum();
    assert_eq!(booked, u64::from(sold));
}

#[tokio::test]
async fn test_failing_item_rolls_back_earlier_decrements() {
    let h = TestHarness::new();
    h.stock_product(1, 100, 5);
    h.stock_product(2, 100, 1);
    h.stock_product(3, 100, 5);

    let result = h
        .assembler
        .create_order(
            request(1)
                .with_item(1, 2, Money::from_cents(100))
                .with_item(2, 3, Money::from_cents(100))
                .with_item(3, 1, Money::from_cents(100)),
        )
        .await;

    match result {
        Err(EngineError::InsufficientStock { product_id, .. }) => {
            assert_eq!(product_id, ProductId::new(2));
        }
        other => panic!("expected insufficient stock, got {other:?}"),
    }
    assert_eq!(h.stock_of(1), 5);
    assert_eq!(h.stock_of(2), 1);
    assert_eq!(h.stock_of(3), 5);
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn test_missing_entities_are_not_found() {
    let h = TestHarness::new();
    h.stock_product(1, 100, 5);

    let unknown_buyer = h
        .assembler
        .create_order(PlaceOrder::new(9, 1, Money::zero(), "cod").with_item(1, 1, Money::zero()))
        .await;
    assert!(matches!(unknown_buyer, Err(EngineError::NotFound(Entity::Buyer))));

    let unknown_address = h
        .assembler
        .create_order(PlaceOrder::new(1, 9, Money::zero(), "cod").with_item(1, 1, Money::zero()))
        .await;
    assert!(matches!(
        unknown_address,
        Err(EngineError::NotFound(Entity::Address))
    ));

    let foreign_address = h
        .assembler
        .create_order(PlaceOrder::new(1, 2, Money::zero(), "cod").with_item(1, 1, Money::zero()))
        .await;
    assert!(matches!(
        foreign_address,
        Err(EngineError::NotFound(Entity::Address))
    ));

    let unknown_product = h
        .assembler
        .create_order(
            request(1)
                .with_item(1, 1, Money::zero())
                .with_item(99, 1, Money::zero()),
        )
        .await;
    assert!(matches!(
        unknown_product,
        Err(EngineError::NotFound(Entity::Product))
    ));
    assert_eq!(h.stock_of(1), 5);
}

#[tokio::test]
async fn test_invalid_requests_are_rejected_before_touching_stock() {
    let h = TestHarness::new();
    h.stock_product(1, 100, 5);

    let empty = h.assembler.create_order(request(1)).await;
    assert!(matches!(
        empty,
        Err(EngineError::InvalidInput(OrderError::NoItems))
    ));

    let zero_quantity = h
        .assembler
        .create_order(
            request(1)
                .with_item(1, 1, Money::zero())
                .with_item(1, 0, Money::zero()),
        )
        .await;
    assert!(matches!(
        zero_quantity,
        Err(EngineError::InvalidInput(OrderError::InvalidQuantity { index: 1, .. }))
    ));

    let negative_shipping = h
        .assembler
        .create_order(
            PlaceOrder::new(1, 1, Money::from_cents(-1), "cod").with_item(1, 1, Money::zero()),
        )
        .await;
    assert!(matches!(
        negative_shipping,
        Err(EngineError::InvalidInput(OrderError::InvalidShippingCost { .. }))
    ));

    assert_eq!(h.stock_of(1), 5);
}

#[tokio::test]
async fn test_snapshot_survives_product_edit_and_removal() {
    let h = TestHarness::new();
    h.stock_product(1, 1500, 5);

    let order = h
        .assembler
        .create_order(request(1).with_item(1, 2, Money::from_cents(1500)))
        .await
        .unwrap();

    h.stock_product(1, 1, 100);
    h.store.remove_product(ProductId::new(1));

    let loaded = h.queries.get(order.id(), BuyerId::new(1)).await.unwrap();
    let snapshot = &loaded.lines()[0].snapshot;
    assert_eq!(snapshot.product_name, "Product 1");
    assert_eq!(snapshot.price, Money::from_cents(1500));
    assert_eq!(snapshot.images, vec!["1.jpg"]);
    assert_eq!(loaded.total_amount(), Money::from_cents(3000));
    assert_eq!(loaded, order);
}

#[tokio::test]
async fn test_invoice_numbers_unique_across_many_orders() {
    let h = TestHarness::new();
    h.stock_product(1, 1, 20_000);

    let mut invoices = std::collections::HashSet::new();
    for _ in 0..10_000 {
        let order = h
            .assembler
            .create_order(request(1).with_item(1, 1, Money::from_cents(1)))
            .await
            .unwrap();
        assert!(invoices.insert(order.invoice_number().clone()));
    }
    assert_eq!(h.store.order_count(), 10_000);
}

#[tokio::test]
async fn test_invoice_collision_is_retried_once() {
    let h = TestHarness::new().with_invoice_numbers(Arc::new(RepeatingInvoiceNumbers::new(2)));
    h.stock_product(1, 100, 5);

    let first = h
        .assembler
        .create_order(request(1).with_item(1, 1, Money::from_cents(100)))
        .await
        .unwrap();
    assert_eq!(first.invoice_number().as_str(), "INV-FIXED");

    let second = h
        .assembler
        .create_order(request(1).with_item(1, 1, Money::from_cents(100)))
        .await
        .unwrap();
    assert_ne!(second.invoice_number(), first.invoice_number());
    assert_eq!(h.stock_of(1), 3);
}

#[tokio::test]
async fn test_repeated_collision_is_a_conflict() {
    let h = TestHarness::new().with_invoice_numbers(Arc::new(ConstantInvoiceNumbers));
    h.stock_product(1, 100, 5);

    h.assembler
        .create_order(request(1).with_item(1, 1, Money::from_cents(100)))
        .await
        .unwrap();

    let result = h
        .assembler
        .create_order(request(1).with_item(1, 1, Money::from_cents(100)))
        .await;
    assert!(matches!(result, Err(EngineError::Conflict(_))));
    assert_eq!(h.stock_of(1), 4);
}

#[tokio::test]
async fn test_commit_failure_leaves_stock_untouched() {
    let h = TestHarness::new();
    h.stock_product(1, 100, 5);
    h.store.fail_next_commit();

    let result = h
        .assembler
        .create_order(request(1).with_item(1, 2, Money::from_cents(100)))
        .await;

    let err = result.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(h.stock_of(1), 5);
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn test_timeout_mid_order_releases_stock_and_locks() {
    let h = TestHarness::new();
    h.stock_product(1, 100, 5);
    h.stock_product(2, 100, 5);
    // begin and each decrement take 50ms, so the first item lands before the timeout.
    h.store.set_operation_delay(Duration::from_millis(50));

    let assembler = OrderAssembler::new(h.store.clone())
        .with_config(EngineConfig::new(Duration::from_millis(125)));
    let result = assembler
        .create_order(
            request(1)
                .with_item(1, 1, Money::from_cents(100))
                .with_item(2, 1, Money::from_cents(100)),
        )
        .await;

    assert!(matches!(result, Err(EngineError::Timeout(_))));
    assert!(result.unwrap_err().is_retryable());
    assert_eq!(h.stock_of(1), 5);
    assert_eq!(h.stock_of(2), 5);
    assert_eq!(h.store.order_count(), 0);

    h.store.set_operation_delay(Duration::ZERO);
    h.assembler
        .create_order(request(1).with_item(1, 5, Money::from_cents(100)))
        .await
        .unwrap();
    assert_eq!(h.stock_of(1), 0);
    assert_eq!(h.store.order_count(), 1);
}

#[tokio::test]
async fn test_failed_order_does_not_starve_concurrent_order() {
    let h = TestHarness::new();
    h.stock_product(1, 100, 1);
    h.stock_product(2, 100, 5);
    h.store.set_operation_delay(Duration::from_millis(30));
    h.store.fail_next_commit();

    let first = h.assembler.create_order(
        request(1)
            .with_item(1, 1, Money::from_cents(100))
            .with_item(2, 1, Money::from_cents(100)),
    );
    let second = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.assembler
            .create_order(request(2).with_item(1, 1, Money::from_cents(100)))
            .await
    };
    let (first, second) = tokio::join!(first, second);

    assert!(first.unwrap_err().is_retryable());
    let order = second.unwrap();
    assert_eq!(order.buyer_id(), BuyerId::new(2));
    assert_eq!(h.stock_of(1), 0);
    assert_eq!(h.stock_of(2), 5);
    assert_eq!(h.store.order_count(), 1);
}

#[tokio::test]
async fn test_orders_are_scoped_to_their_buyer() {
    let h = TestHarness::new();
    h.stock_product(1, 100, 5);

    let order = h
        .assembler
        .create_order(request(1).with_item(1, 1, Money::from_cents(100)))
        .await
        .unwrap();

    assert!(h.queries.get(order.id(), BuyerId::new(1)).await.is_ok());
    assert!(matches!(
        h.queries.get(order.id(), BuyerId::new(2)).await,
        Err(EngineError::NotFound(Entity::Order))
    ));
    assert!(matches!(
        h.lifecycle.cancel(order.id(), BuyerId::new(2)).await,
        Err(EngineError::NotFound(Entity::Order))
    ));
}

#[tokio::test]
async fn test_listing_filters_and_pages() {
    let h = TestHarness::new();
    h.stock_product(1, 100, 100);

    let mut ids = Vec::new();
    for n in 0..12 {
        let payment = if n % 2 == 0 { "bank_transfer" } else { "cod" };
        let order = h
            .assembler
            .create_order(
                PlaceOrder::new(1, 1, Money::zero(), payment).with_item(1, 1, Money::from_cents(100)),
            )
            .await
            .unwrap();
        ids.push(order.id());
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    h.lifecycle.cancel(ids[0], BuyerId::new(1)).await.unwrap();

    let first_page = h
        .queries
        .list(&OrderFilter::for_buyer(BuyerId::new(1)).page(0).page_size(0))
        .await
        .unwrap();
    assert_eq!(first_page.page, 1);
    assert_eq!(first_page.page_size, 10);
    assert_eq!(first_page.total, 12);
    assert_eq!(first_page.page_count(), 2);
    assert_eq!(first_page.orders[0].id(), ids[11]);

    let cod = h
        .queries
        .list(&OrderFilter::for_buyer(BuyerId::new(1)).payment_method("cod"))
        .await
        .unwrap();
    assert_eq!(cod.total, 6);
    assert!(cod.orders.iter().all(|o| o.payment_method() == "cod"));

    let cancelled = h
        .queries
        .list(&OrderFilter::for_buyer(BuyerId::new(1)).status(OrderStatus::Cancelled))
        .await
        .unwrap();
    assert_eq!(cancelled.total, 1);
    assert_eq!(cancelled.orders[0].id(), ids[0]);

    let stranger = h
        .queries
        .list(&OrderFilter::for_buyer(BuyerId::new(2)))
        .await
        .unwrap();
    assert_eq!(stranger.total, 0);
}

#[tokio::test]
async fn test_operator_walks_full_lifecycle() {
    let h = TestHarness::new();
    h.stock_product(1, 100, 5);
    let order = h
        .assembler
        .create_order(request(1).with_item(1, 1, Money::from_cents(100)))
        .await
        .unwrap();

    for target in [
        OrderStatus::Confirmed,
        OrderStatus::Paid,
        OrderStatus::Shipped,
        OrderStatus::Completed,
    ] {
        let tracking = (target == OrderStatus::Shipped).then(|| "JNE-123".to_string());
        let updated = h
            .lifecycle
            .transition(order.id(), OrderScope::Operator, target, tracking)
            .await
            .unwrap();
        assert_eq!(updated.status(), target);
    }

    let done = h.queries.get(order.id(), BuyerId::new(1)).await.unwrap();
    assert_eq!(done.status(), OrderStatus::Completed);
    assert_eq!(done.shipping_tracking(), Some("JNE-123"));
    assert!(done.lifecycle().paid_at().is_some());

    for target in OrderStatus::ALL {
        let result = h
            .lifecycle
            .transition(order.id(), OrderScope::Operator, target, None)
            .await;
        assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));
    }
}

#[tokio::test]
async fn test_buyer_cancellation_keeps_paid_at_unset_and_stock_consumed() {
    let h = TestHarness::new();
    h.stock_product(1, 100, 5);
    let order = h
        .assembler
        .create_order(request(1).with_item(1, 2, Money::from_cents(100)))
        .await
        .unwrap();

    h.lifecycle
        .transition(order.id(), OrderScope::Operator, OrderStatus::Confirmed, None)
        .await
        .unwrap();
    let cancelled = h.lifecycle.cancel(order.id(), BuyerId::new(1)).await.unwrap();

    assert_eq!(cancelled.status(), OrderStatus::Cancelled);
    assert!(cancelled.lifecycle().cancelled_at().is_some());
    assert!(cancelled.lifecycle().paid_at().is_none());
    assert_eq!(h.stock_of(1), 3);

    let again = h.lifecycle.cancel(order.id(), BuyerId::new(1)).await;
    assert!(matches!(again, Err(EngineError::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_buyer_cannot_advance_status() {
    let h = TestHarness::new();
    h.stock_product(1, 100, 5);
    let order = h
        .assembler
        .create_order(request(1).with_item(1, 1, Money::from_cents(100)))
        .await
        .unwrap();

    let result = h
        .lifecycle
        .transition(
            order.id(),
            OrderScope::Buyer(BuyerId::new(1)),
            OrderStatus::Confirmed,
            None,
        )
        .await;
    assert!(matches!(
        result,
        Err(EngineError::InvalidTransition {
            from: OrderStatus::Pending,
            to: OrderStatus::Confirmed,
        })
    ));
}
