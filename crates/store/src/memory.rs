use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;
use common::{AddressId, BuyerId, OrderId, ProductId};
use domain::{Address, Buyer, InvoiceNumber, Order, Product, StatusChange};

use crate::{
    OrderFilter, OrderPage, OrderScope, Result, StoreError,
    store::{OrderStore, StockDecrement, UnitOfWork},
};

#[derive(Default)]
struct State {
    buyers: HashMap<BuyerId, Buyer>,
    addresses: HashMap<AddressId, Address>,
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
    invoices: HashSet<InvoiceNumber>,
}

/// One async lock per product, standing in for a row lock.
type RowLocks = Mutex<HashMap<ProductId, Arc<tokio::sync::Mutex<()>>>>;

#[derive(Default)]
struct Faults {
    fail_next_commit: AtomicBool,
    delay_ms: AtomicU64,
}

impl Faults {
    async fn delay(&self) {
        let ms = self.delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

/// In-memory order store implementation for testing and local runs.
///
/// A unit of work takes a product's row lock on its first decrement and
/// holds it until commit, rollback or drop, so contending units of work
/// wait for the holder the way they would on a Postgres row lock.
/// Decrements and orders stay pending inside the unit of work and are
/// applied to the shared state only on commit. Units of work that lock
/// products in opposite orders wait on each other until the caller's
/// timeout drops one of them.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<Mutex<State>>,
    row_locks: Arc<RowLocks>,
    faults: Arc<Faults>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    pub fn add_buyer(&self, buyer: Buyer) {
        self.lock().buyers.insert(buyer.id, buyer);
    }

    pub fn add_address(&self, address: Address) {
        self.lock().addresses.insert(address.id, address);
    }

    /// Inserts or replaces a catalogue product.
    pub fn put_product(&self, product: Product) {
        self.lock().products.insert(product.id, product);
    }

    /// Removes a product from the catalogue.
    pub fn remove_product(&self, product_id: ProductId) -> Option<Product> {
        self.lock().products.remove(&product_id)
    }

    /// Returns the committed catalogue entry for a product.
    pub fn product(&self, product_id: ProductId) -> Option<Product> {
        self.lock().products.get(&product_id).cloned()
    }

    /// Returns the number of committed orders.
    pub fn order_count(&self) -> usize {
        self.lock().orders.len()
    }

    /// Makes the next commit fail with `Unavailable`.
    pub fn fail_next_commit(&self) {
        self.faults.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Delays `begin` and every stock decrement by `delay`. Zero disables it.
    pub fn set_operation_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.faults.delay_ms.store(ms, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Unit of work over an [`InMemoryOrderStore`].
pub struct InMemoryUnitOfWork {
    state: Arc<Mutex<State>>,
    row_locks: Arc<RowLocks>,
    faults: Arc<Faults>,
    held: HashMap<ProductId, OwnedMutexGuard<()>>,
    reserved: HashMap<ProductId, u32>,
    staged: Vec<Order>,
    closed: bool,
}

impl InMemoryUnitOfWork {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(StoreError::TransactionClosed);
        }
        Ok(())
    }

    /// The product as this unit of work sees it: committed stock minus its
    /// own pending decrements.
    fn own_view(&self, product: &Product) -> Product {
        let reserved = self.reserved.get(&product.id).copied().unwrap_or(0);
        let mut product = product.clone();
        product.stock = product.stock.saturating_sub(reserved);
        product
    }

    async fn lock_row(&mut self, product_id: ProductId) {
        if self.held.contains_key(&product_id) {
            return;
        }
        let row = Arc::clone(lock(&self.row_locks).entry(product_id).or_default());
        let guard = row.lock_owned().await;
        self.held.insert(product_id, guard);
    }

    /// Discards pending work and releases every row lock.
    fn close(&mut self) {
        self.reserved.clear();
        self.staged.clear();
        self.held.clear();
        self.closed = true;
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn find_buyer(&mut self, buyer_id: BuyerId) -> Result<Option<Buyer>> {
        self.ensure_open()?;
        Ok(lock(&self.state).buyers.get(&buyer_id).cloned())
    }

    async fn find_address(&mut self, address_id: AddressId) -> Result<Option<Address>> {
        self.ensure_open()?;
        Ok(lock(&self.state).addresses.get(&address_id).cloned())
    }

    async fn find_product(&mut self, product_id: ProductId) -> Result<Option<Product>> {
        self.ensure_open()?;
        let product = lock(&self.state).products.get(&product_id).cloned();
        Ok(product.map(|product| self.own_view(&product)))
    }

    async fn decrement_stock(
        &mut self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<StockDecrement> {
        self.ensure_open()?;
        self.faults.delay().await;
        self.lock_row(product_id).await;

        let committed = lock(&self.state).products.get(&product_id).cloned();
        let Some(committed) = committed else {
            return Ok(StockDecrement::Missing);
        };

        let mut after = self.own_view(&committed);
        if !after.has_stock_for(quantity) {
            return Ok(StockDecrement::Insufficient {
                available: after.stock,
            });
        }

        after.stock -= quantity;
        *self.reserved.entry(product_id).or_default() += quantity;
        Ok(StockDecrement::Applied(after))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.ensure_open()?;

        let taken = lock(&self.state)
            .invoices
            .contains(order.invoice_number())
            || self
                .staged
                .iter()
                .any(|staged| staged.invoice_number() == order.invoice_number());
        if taken {
            return Err(StoreError::DuplicateInvoice(order.invoice_number().clone()));
        }

        self.staged.push(order.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;

        if self.faults.fail_next_commit.swap(false, Ordering::SeqCst) {
            self.close();
            return Err(StoreError::Unavailable("commit failed".to_string()));
        }

        let mut state = lock(&self.state);
        // Another unit of work may have committed the same invoice since insert.
        if let Some(order) = self
            .staged
            .iter()
            .find(|order| state.invoices.contains(order.invoice_number()))
        {
            let invoice = order.invoice_number().clone();
            drop(state);
            self.close();
            return Err(StoreError::DuplicateInvoice(invoice));
        }

        for (product_id, quantity) in self.reserved.drain() {
            // A product removed from the catalogue meanwhile has nothing left to take.
            if let Some(product) = state.products.get_mut(&product_id) {
                product.stock = product.stock.saturating_sub(quantity);
            }
        }
        for order in self.staged.drain(..) {
            state.invoices.insert(order.invoice_number().clone());
            state.orders.insert(order.id(), order);
        }
        drop(state);

        self.close();
        tracing::debug!("In-memory unit of work committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.close();
        tracing::debug!("In-memory unit of work rolled back");
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        self.faults.delay().await;
        Ok(Box::new(InMemoryUnitOfWork {
            state: Arc::clone(&self.state),
            row_locks: Arc::clone(&self.row_locks),
            faults: Arc::clone(&self.faults),
            held: HashMap::new(),
            reserved: HashMap::new(),
            staged: Vec::new(),
            closed: false,
        }))
    }

    async fn find_order(&self, order_id: OrderId, scope: OrderScope) -> Result<Option<Order>> {
        let state = self.lock();
        Ok(state
            .orders
            .get(&order_id)
            .filter(|order| scope.permits(order.buyer_id()))
            .cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<OrderPage> {
        let state = self.lock();
        let mut matching: Vec<&Order> = state
            .orders
            .values()
            .filter(|order| filter.matches(order))
            .collect();
        matching.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });

        let total = matching.len() as u64;
        let offset = usize::try_from(filter.offset()).unwrap_or(usize::MAX);
        let page_size = filter.effective_page_size();
        let orders = matching
            .into_iter()
            .skip(offset)
            .take(page_size as usize)
            .cloned()
            .collect();

        Ok(OrderPage {
            orders,
            total,
            page: filter.effective_page(),
            page_size,
        })
    }

    async fn update_status(&self, order_id: OrderId, change: &StatusChange) -> Result<()> {
        let mut state = self.lock();
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        let stale = StoreError::StatusChanged {
            order_id,
            expected: change.from,
        };
        if order.status() != change.from {
            return Err(stale);
        }
        order
            .transition(change.to, change.at, change.shipping_tracking.clone())
            .map_err(|_| stale)?;
        Ok(())
    }
}
