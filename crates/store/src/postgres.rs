use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AddressId, BuyerId, OrderId, OrderLineId, ProductId};
use domain::{
    Address, Buyer, InvoiceNumber, Lifecycle, Money, Order, OrderLine, OrderRecord, OrderStatus,
    Product, ProductSnapshot, StatusChange, Weight,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    OrderFilter, OrderPage, OrderScope, Result, StoreError,
    store::{OrderStore, StockDecrement, UnitOfWork},
};

const INVOICE_CONSTRAINT: &str = "orders_invoice_number_key";

const PRODUCT_COLUMNS: &str = "id, name, description, price_cents, stock, weight_grams, images";

const ORDER_COLUMNS: &str = "id, buyer_id, address_id, invoice_number, total_cents, \
     shipping_cost_cents, payment_method, status, shipping_courier, shipping_tracking, \
     confirmed_at, paid_at, shipped_at, completed_at, cancelled_at, created_at, updated_at";

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn load_lines(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderLine>>> {
        if order_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT l.id, l.order_id, l.product_id, l.quantity, l.unit_price_cents,
                   s.product_name, s.description, s.price_cents, s.weight_grams, s.images,
                   s.captured_at
            FROM order_lines l
            JOIN product_snapshots s ON s.order_line_id = l.id
            WHERE l.order_id = ANY($1)
            ORDER BY l.order_id, l.position ASC
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut lines: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        for row in rows {
            let order_id: Uuid = row.try_get("order_id")?;
            lines
                .entry(order_id)
                .or_default()
                .push(row_to_line(&row)?);
        }
        Ok(lines)
    }

    async fn hydrate(&self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut lines = self.load_lines(&ids).await?;

        rows.iter()
            .zip(ids)
            .map(|(row, id)| row_to_order(row, lines.remove(&id).unwrap_or_default()))
            .collect()
    }
}

fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::InvalidRow(format!("{column} = {value}")))
}

fn row_to_buyer(row: &PgRow) -> Result<Buyer> {
    Ok(Buyer {
        id: BuyerId::new(row.try_get("id")?),
        name: row.try_get("name")?,
    })
}

fn row_to_address(row: &PgRow) -> Result<Address> {
    Ok(Address {
        id: AddressId::new(row.try_get("id")?),
        buyer_id: BuyerId::new(row.try_get("buyer_id")?),
        recipient_name: row.try_get("recipient_name")?,
        detail: row.try_get("detail")?,
    })
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    let images: serde_json::Value = row.try_get("images")?;

    Ok(Product {
        id: ProductId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        stock: to_u32(row.try_get("stock")?, "stock")?,
        weight: Weight::from_grams(to_u32(row.try_get("weight_grams")?, "weight_grams")?),
        images: serde_json::from_value(images)?,
    })
}

fn row_to_line(row: &PgRow) -> Result<OrderLine> {
    let images: serde_json::Value = row.try_get("images")?;

    Ok(OrderLine {
        id: OrderLineId::from_uuid(row.try_get("id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        snapshot: ProductSnapshot {
            product_name: row.try_get("product_name")?,
            description: row.try_get("description")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            weight: Weight::from_grams(to_u32(row.try_get("weight_grams")?, "weight_grams")?),
            images: serde_json::from_value(images)?,
            captured_at: row.try_get("captured_at")?,
        },
    })
}

fn row_to_order(row: &PgRow, lines: Vec<OrderLine>) -> Result<Order> {
    let status: String = row.try_get("status")?;
    let status: OrderStatus = status
        .parse()
        .map_err(|e: domain::OrderError| StoreError::InvalidRow(e.to_string()))?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    let mut entered_at = vec![(OrderStatus::Pending, created_at)];
    for entered in [
        OrderStatus::Confirmed,
        OrderStatus::Paid,
        OrderStatus::Shipped,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ] {
        if let Some(column) = timestamp_column(entered)
            && let Some(at) = row.try_get::<Option<DateTime<Utc>>, _>(column)?
        {
            entered_at.push((entered, at));
        }
    }

    Ok(Order::from(OrderRecord {
        id: OrderId::from_uuid(row.try_get("id")?),
        buyer_id: BuyerId::new(row.try_get("buyer_id")?),
        address_id: AddressId::new(row.try_get("address_id")?),
        invoice_number: InvoiceNumber::new(row.try_get::<String, _>("invoice_number")?),
        total_amount: Money::from_cents(row.try_get("total_cents")?),
        shipping_cost: Money::from_cents(row.try_get("shipping_cost_cents")?),
        payment_method: row.try_get("payment_method")?,
        shipping_courier: row.try_get("shipping_courier")?,
        shipping_tracking: row.try_get("shipping_tracking")?,
        lifecycle: Lifecycle::restore(status, entered_at),
        lines,
        created_at,
        updated_at: row.try_get("updated_at")?,
    }))
}

/// Column recording when an order entered `status`. `Pending` uses `created_at`.
fn timestamp_column(status: OrderStatus) -> Option<&'static str> {
    match status {
        OrderStatus::Pending => None,
        OrderStatus::Confirmed => Some("confirmed_at"),
        OrderStatus::Paid => Some("paid_at"),
        OrderStatus::Shipped => Some("shipped_at"),
        OrderStatus::Completed => Some("completed_at"),
        OrderStatus::Cancelled => Some("cancelled_at"),
    }
}

/// Unit of work backed by a database transaction.
///
/// The transaction rolls back when dropped without a commit.
pub struct PostgresUnitOfWork {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresUnitOfWork {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>> {
        self.tx.as_mut().ok_or(StoreError::TransactionClosed)
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn find_buyer(&mut self, buyer_id: BuyerId) -> Result<Option<Buyer>> {
        let tx = self.tx()?;
        let row = sqlx::query("SELECT id, name FROM buyers WHERE id = $1 AND deleted_at IS NULL")
            .bind(buyer_id.as_i64())
            .fetch_optional(&mut **tx)
            .await?;

        row.as_ref().map(row_to_buyer).transpose()
    }

    async fn find_address(&mut self, address_id: AddressId) -> Result<Option<Address>> {
        let tx = self.tx()?;
        let row = sqlx::query(
            r#"
            SELECT id, buyer_id, recipient_name, detail
            FROM addresses
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(address_id.as_i64())
        .fetch_optional(&mut **tx)
        .await?;

        row.as_ref().map(row_to_address).transpose()
    }

    async fn find_product(&mut self, product_id: ProductId) -> Result<Option<Product>> {
        let tx = self.tx()?;
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND deleted_at IS NULL");
        let row = sqlx::query(&sql)
            .bind(product_id.as_i64())
            .fetch_optional(&mut **tx)
            .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn decrement_stock(
        &mut self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<StockDecrement> {
        let tx = self.tx()?;

        // Test and decrement in one statement; the row lock serializes writers.
        let sql = format!(
            r#"
            UPDATE products
            SET stock = stock - $2, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL AND stock >= $2
            RETURNING {PRODUCT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(product_id.as_i64())
            .bind(i64::from(quantity))
            .fetch_optional(&mut **tx)
            .await?;

        if let Some(row) = row {
            return Ok(StockDecrement::Applied(row_to_product(&row)?));
        }

        let available: Option<i32> =
            sqlx::query_scalar("SELECT stock FROM products WHERE id = $1 AND deleted_at IS NULL")
                .bind(product_id.as_i64())
                .fetch_optional(&mut **tx)
                .await?;

        match available {
            Some(stock) => Ok(StockDecrement::Insufficient {
                available: to_u32(stock, "stock")?,
            }),
            None => Ok(StockDecrement::Missing),
        }
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        let tx = self.tx()?;
        let lifecycle = order.lifecycle();

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, buyer_id, address_id, invoice_number, total_cents, shipping_cost_cents,
                payment_method, status, shipping_courier, shipping_tracking,
                confirmed_at, paid_at, shipped_at, completed_at, cancelled_at,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.buyer_id().as_i64())
        .bind(order.address_id().as_i64())
        .bind(order.invoice_number().as_str())
        .bind(order.total_amount().cents())
        .bind(order.shipping_cost().cents())
        .bind(order.payment_method())
        .bind(order.status().as_str())
        .bind(order.shipping_courier())
        .bind(order.shipping_tracking())
        .bind(lifecycle.confirmed_at())
        .bind(lifecycle.paid_at())
        .bind(lifecycle.shipped_at())
        .bind(lifecycle.completed_at())
        .bind(lifecycle.cancelled_at())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(INVOICE_CONSTRAINT)
            {
                return StoreError::DuplicateInvoice(order.invoice_number().clone());
            }
            StoreError::Database(e)
        })?;

        for (position, line) in order.lines().iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| StoreError::InvalidRow(format!("line position {position}")))?;
            let quantity = i32::try_from(line.quantity)
                .map_err(|_| StoreError::InvalidRow(format!("quantity {}", line.quantity)))?;

            sqlx::query(
                r#"
                INSERT INTO order_lines (id, order_id, position, product_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(line.id.as_uuid())
            .bind(order.id().as_uuid())
            .bind(position)
            .bind(line.product_id.as_i64())
            .bind(quantity)
            .bind(line.unit_price.cents())
            .execute(&mut **tx)
            .await?;

            let snapshot = &line.snapshot;
            let weight = i32::try_from(snapshot.weight.grams())
                .map_err(|_| StoreError::InvalidRow(format!("weight {}", snapshot.weight)))?;

            sqlx::query(
                r#"
                INSERT INTO product_snapshots
                    (order_line_id, product_name, description, price_cents, weight_grams, images, captured_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(line.id.as_uuid())
            .bind(&snapshot.product_name)
            .bind(&snapshot.description)
            .bind(snapshot.price.cents())
            .bind(weight)
            .bind(serde_json::to_value(&snapshot.images)?)
            .bind(snapshot.captured_at)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.commit().await?;
        tracing::debug!("Order transaction committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.rollback().await?;
        tracing::debug!("Order transaction rolled back");
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresUnitOfWork { tx: Some(tx) }))
    }

    async fn find_order(&self, order_id: OrderId, scope: OrderScope) -> Result<Option<Order>> {
        let sql = format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE id = $1 AND deleted_at IS NULL AND ($2::BIGINT IS NULL OR buyer_id = $2)
            "#
        );
        let row = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .bind(scope.buyer_id().map(|id| id.as_i64()))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<OrderPage> {
        let mut conditions = String::from(" WHERE buyer_id = $1 AND deleted_at IS NULL");
        let mut param_count = 1;

        // Build dynamic filter
        if filter.status.is_some() {
            param_count += 1;
            conditions.push_str(&format!(" AND status = ${param_count}"));
        }
        if filter.payment_method.is_some() {
            param_count += 1;
            conditions.push_str(&format!(" AND payment_method = ${param_count}"));
        }

        let count_sql = format!("SELECT COUNT(*) FROM orders{conditions}");
        let page_sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders{conditions} ORDER BY created_at DESC, id DESC LIMIT ${} OFFSET ${}",
            param_count + 1,
            param_count + 2
        );

        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(filter.buyer_id.as_i64());
        let mut page_query = sqlx::query(&page_sql).bind(filter.buyer_id.as_i64());

        if let Some(status) = filter.status {
            count_query = count_query.bind(status.as_str());
            page_query = page_query.bind(status.as_str());
        }
        if let Some(ref payment_method) = filter.payment_method {
            count_query = count_query.bind(payment_method.clone());
            page_query = page_query.bind(payment_method.clone());
        }

        let page_size = filter.effective_page_size();
        let offset = i64::try_from(filter.offset()).unwrap_or(i64::MAX);

        let total = count_query.fetch_one(&self.pool).await?;
        let rows = page_query
            .bind(i64::from(page_size))
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(OrderPage {
            orders: self.hydrate(rows).await?,
            total: u64::try_from(total).unwrap_or(0),
            page: filter.effective_page(),
            page_size,
        })
    }

    async fn update_status(&self, order_id: OrderId, change: &StatusChange) -> Result<()> {
        let column = timestamp_column(change.to).ok_or_else(|| {
            StoreError::InvalidRow(format!("cannot move an order back to {}", change.to))
        })?;

        let sql = format!(
            r#"
            UPDATE orders
            SET status = $3, {column} = $4, updated_at = $4,
                shipping_tracking = COALESCE($5, shipping_tracking)
            WHERE id = $1 AND status = $2 AND deleted_at IS NULL
            "#
        );
        let result = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .bind(change.from.as_str())
            .bind(change.to.as_str())
            .bind(change.at)
            .bind(change.shipping_tracking.as_deref())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1 AND deleted_at IS NULL)",
        )
        .bind(order_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        if exists {
            Err(StoreError::StatusChanged {
                order_id,
                expected: change.from,
            })
        } else {
            Err(StoreError::OrderNotFound(order_id))
        }
    }
}
