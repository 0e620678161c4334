use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::error::ErrorKind;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

use crate::{
    Customer, CustomerId, CustomerQuery, Lifecycle, Money, Order, OrderId, OrderItem,
    OrderItemId, OrderQuery, OrderStatus, Product, ProductId, ProductOrder, ProductQuery, Result,
    StoreError, Version,
    store::{Store, UnitOfWork},
};

const PRODUCT_COLUMNS: &str = "id, name, description, price_cents, stock, category, brand, lifecycle, created_at, updated_at, version";

const CUSTOMER_COLUMNS: &str = "id, name, email, phone, address, city, state, postal_code, lifecycle, created_at, updated_at, version";

const ORDER_COLUMNS: &str = "id, customer_id, order_date, shipped_date, delivered_date, status, sub_total_cents, tax_cents, total_cents, shipping_address, notes, created_at, updated_at, version";

const ORDER_ITEM_COLUMNS: &str =
    "id, order_id, line_no, product_id, quantity, unit_price_cents, created_at";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool with at most `max_connections` connections.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
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
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresUnitOfWork;

    async fn begin(&self) -> Result<PostgresUnitOfWork> {
        let tx = self.pool.begin().await?;
        Ok(PostgresUnitOfWork { tx })
    }
}

/// Unit of work backed by a single PostgreSQL transaction.
pub struct PostgresUnitOfWork {
    tx: sqlx::Transaction<'static, Postgres>,
}

/// Maps constraint violations onto their store error variants.
fn map_db_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        let constraint = db_err.constraint().unwrap_or_default().to_string();
        match db_err.kind() {
            ErrorKind::UniqueViolation => {
                tracing::debug!(%constraint, "unique constraint violated");
                return StoreError::UniqueViolation { constraint };
            }
            ErrorKind::ForeignKeyViolation => {
                tracing::debug!(%constraint, "foreign key constraint violated");
                return StoreError::ForeignKeyViolation { constraint };
            }
            _ => {}
        }
    }
    StoreError::Database(e)
}

/// Converts a page bound for binding as BIGINT. Bounds past `i64::MAX` are
/// clamped, which selects the same rows as the unclamped value would.
fn sql_bound(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn parse_column<T>(column: &str, raw: String) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse()
        .map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
}

fn row_to_product(row: PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        stock: row.try_get("stock")?,
        category: row.try_get("category")?,
        brand: row.try_get("brand")?,
        lifecycle: parse_column::<Lifecycle>("lifecycle", row.try_get("lifecycle")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: Version::new(row.try_get("version")?),
    })
}

fn row_to_customer(row: PgRow) -> Result<Customer> {
    Ok(Customer {
        id: CustomerId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        address: row.try_get("address")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        postal_code: row.try_get("postal_code")?,
        lifecycle: parse_column::<Lifecycle>("lifecycle", row.try_get("lifecycle")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: Version::new(row.try_get("version")?),
    })
}

/// Decodes an order header; items are attached by the caller.
fn row_to_order(row: PgRow) -> Result<Order> {
    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
        order_date: row.try_get("order_date")?,
        shipped_date: row.try_get("shipped_date")?,
        delivered_date: row.try_get("delivered_date")?,
        status: parse_column::<OrderStatus>("status", row.try_get("status")?)?,
        sub_total: Money::from_cents(row.try_get("sub_total_cents")?),
        tax: Money::from_cents(row.try_get("tax_cents")?),
        total: Money::from_cents(row.try_get("total_cents")?),
        shipping_address: row.try_get("shipping_address")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: Version::new(row.try_get("version")?),
        items: Vec::new(),
    })
}

fn row_to_order_item(row: &PgRow) -> Result<(Uuid, OrderItem)> {
    let order_id: Uuid = row.try_get("order_id")?;
    let item = OrderItem {
        id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        quantity: row.try_get("quantity")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        created_at: row.try_get("created_at")?,
    };
    Ok((order_id, item))
}

impl PostgresUnitOfWork {
    /// Explains why a versioned UPDATE matched no row.
    async fn stale_write(
        &mut self,
        table: &str,
        entity: &'static str,
        id: Uuid,
        expected: Version,
    ) -> StoreError {
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = $1)");
        let exists = sqlx::query_scalar::<_, bool>(&sql)
            .bind(id)
            .fetch_one(&mut *self.tx)
            .await;

        match exists {
            Ok(true) => {
                tracing::debug!(entity, %id, %expected, "stale version rejected");
                StoreError::ConcurrencyConflict {
                    entity,
                    id: id.to_string(),
                    expected,
                }
            }
            Ok(false) => StoreError::NotFound {
                entity,
                id: id.to_string(),
            },
            Err(e) => StoreError::Database(e),
        }
    }

    async fn load_items(&mut self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
        let sql = format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, line_no"
        );
        let rows = sqlx::query(&sql)
            .bind(order_ids.to_vec())
            .fetch_all(&mut *self.tx)
            .await?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in &rows {
            let (order_id, item) = row_to_order_item(row)?;
            items.entry(order_id).or_default().push(item);
        }
        Ok(items)
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn find_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_product).transpose()
    }

    async fn find_products(&mut self, query: &ProductQuery) -> Result<Vec<Product>> {
        let mut sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.lifecycle.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND lifecycle = ${param_count}"));
        }
        if query.ids.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND id = ANY(${param_count})"));
        }
        if query.category.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND lower(category) = lower(${param_count})"));
        }
        if query.stock_below.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND stock < ${param_count}"));
        }

        match query.order {
            ProductOrder::Name => sql.push_str(" ORDER BY name ASC, id ASC"),
            ProductOrder::StockAscending => {
                sql.push_str(" ORDER BY stock ASC, name ASC, id ASC")
            }
        }

        if query.page.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.page.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(lifecycle) = query.lifecycle {
            sqlx_query = sqlx_query.bind(lifecycle.as_str());
        }
        if let Some(ref ids) = query.ids {
            let ids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();
            sqlx_query = sqlx_query.bind(ids);
        }
        if let Some(ref category) = query.category {
            sqlx_query = sqlx_query.bind(category.clone());
        }
        if let Some(threshold) = query.stock_below {
            sqlx_query = sqlx_query.bind(threshold);
        }
        if let Some(limit) = query.page.limit {
            sqlx_query = sqlx_query.bind(sql_bound(limit));
        }
        if let Some(offset) = query.page.offset {
            sqlx_query = sqlx_query.bind(sql_bound(offset));
        }

        let rows = sqlx_query.fetch_all(&mut *self.tx).await?;
        rows.into_iter().map(row_to_product).collect()
    }

    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>> {
        // Consistent lock order so concurrent orders cannot deadlock.
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        );
        let ids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();
        let rows = sqlx::query(&sql)
            .bind(ids)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(row_to_product).collect()
    }

    async fn insert_product(&mut self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price_cents, stock, category, brand, lifecycle, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(product.stock)
        .bind(&product.category)
        .bind(&product.brand)
        .bind(product.lifecycle.as_str())
        .bind(product.created_at)
        .bind(product.updated_at)
        .bind(product.version.as_i64())
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    async fn replace_product(&mut self, product: &Product) -> Result<Version> {
        let version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products SET
                name = $2, description = $3, price_cents = $4, stock = $5, category = $6,
                brand = $7, lifecycle = $8, updated_at = $9, version = version + 1
            WHERE id = $1 AND version = $10
            RETURNING version
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(product.stock)
        .bind(&product.category)
        .bind(&product.brand)
        .bind(product.lifecycle.as_str())
        .bind(product.updated_at)
        .bind(product.version.as_i64())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        match version {
            Some(v) => Ok(Version::new(v)),
            None => Err(self
                .stale_write("products", "Product", product.id.as_uuid(), product.version)
                .await),
        }
    }

    async fn find_customer(&mut self, id: CustomerId) -> Result<Option<Customer>> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_customer).transpose()
    }

    async fn find_customers(&mut self, query: &CustomerQuery) -> Result<Vec<Customer>> {
        let mut sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE 1=1");
        let mut param_count = 0;

        if query.lifecycle.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND lifecycle = ${param_count}"));
        }
        if query.ids.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND id = ANY(${param_count})"));
        }

        sql.push_str(" ORDER BY name ASC, id ASC");

        if query.page.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.page.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(lifecycle) = query.lifecycle {
            sqlx_query = sqlx_query.bind(lifecycle.as_str());
        }
        if let Some(ref ids) = query.ids {
            let ids: Vec<Uuid> = ids.iter().map(CustomerId::as_uuid).collect();
            sqlx_query = sqlx_query.bind(ids);
        }
        if let Some(limit) = query.page.limit {
            sqlx_query = sqlx_query.bind(sql_bound(limit));
        }
        if let Some(offset) = query.page.offset {
            sqlx_query = sqlx_query.bind(sql_bound(offset));
        }

        let rows = sqlx_query.fetch_all(&mut *self.tx).await?;
        rows.into_iter().map(row_to_customer).collect()
    }

    async fn insert_customer(&mut self, customer: &Customer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO customers (id, name, email, phone, address, city, state, postal_code, lifecycle, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(customer.id.as_uuid())
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(&customer.address)
        .bind(&customer.city)
        .bind(&customer.state)
        .bind(&customer.postal_code)
        .bind(customer.lifecycle.as_str())
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .bind(customer.version.as_i64())
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    async fn replace_customer(&mut self, customer: &Customer) -> Result<Version> {
        let version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE customers SET
                name = $2, email = $3, phone = $4, address = $5, city = $6, state = $7,
                postal_code = $8, lifecycle = $9, updated_at = $10, version = version + 1
            WHERE id = $1 AND version = $11
            RETURNING version
            "#,
        )
        .bind(customer.id.as_uuid())
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(&customer.address)
        .bind(&customer.city)
        .bind(&customer.state)
        .bind(&customer.postal_code)
        .bind(customer.lifecycle.as_str())
        .bind(customer.updated_at)
        .bind(customer.version.as_i64())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        match version {
            Some(v) => Ok(Version::new(v)),
            None => Err(self
                .stale_write("customers", "Customer", customer.id.as_uuid(), customer.version)
                .await),
        }
    }

    async fn delete_customer(&mut self, id: CustomerId) -> Result<()> {
        let result = sqlx::query("DELETE FROM customers WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "Customer",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn active_email_exists(
        &mut self,
        email: &str,
        excluding: Option<CustomerId>,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM customers
                WHERE email = $1 AND lifecycle = 'active' AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(email)
        .bind(excluding.map(|id| id.as_uuid()))
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(exists)
    }

    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut order = row_to_order(row)?;
        let mut items = self.load_items(&[id.as_uuid()]).await?;
        order.items = items.remove(&id.as_uuid()).unwrap_or_default();
        Ok(Some(order))
    }

    async fn find_orders(&mut self, query: &OrderQuery) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut param_count = 0;

        if query.customer_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND customer_id = ${param_count}"));
        }

        sql.push_str(" ORDER BY order_date DESC, id ASC");

        if query.page.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.page.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(customer_id) = query.customer_id {
            sqlx_query = sqlx_query.bind(customer_id.as_uuid());
        }
        if let Some(limit) = query.page.limit {
            sqlx_query = sqlx_query.bind(sql_bound(limit));
        }
        if let Some(offset) = query.page.offset {
            sqlx_query = sqlx_query.bind(sql_bound(offset));
        }

        let rows = sqlx_query.fetch_all(&mut *self.tx).await?;
        let mut orders: Vec<Order> = rows
            .into_iter()
            .map(row_to_order)
            .collect::<Result<_>>()?;

        if orders.is_empty() {
            return Ok(orders);
        }

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id.as_uuid()).collect();
        let mut items = self.load_items(&ids).await?;
        for order in &mut orders {
            order.items = items.remove(&order.id.as_uuid()).unwrap_or_default();
        }
        Ok(orders)
    }

    async fn customer_has_orders(&mut self, id: CustomerId) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE customer_id = $1)")
                .bind(id.as_uuid())
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(exists)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, order_date, shipped_date, delivered_date, status, sub_total_cents, tax_cents, total_cents, shipping_address, notes, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.customer_id.as_uuid())
        .bind(order.order_date)
        .bind(order.shipped_date)
        .bind(order.delivered_date)
        .bind(order.status.as_str())
        .bind(order.sub_total.cents())
        .bind(order.tax.cents())
        .bind(order.total.cents())
        .bind(&order.shipping_address)
        .bind(&order.notes)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.version.as_i64())
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        for (line_no, item) in (1_i32..).zip(&order.items) {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, line_no, product_id, quantity, unit_price_cents, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(order.id.as_uuid())
            .bind(line_no)
            .bind(item.product_id.as_uuid())
            .bind(item.quantity)
            .bind(item.unit_price.cents())
            .bind(item.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        }

        Ok(())
    }

    async fn replace_order(&mut self, order: &Order) -> Result<Version> {
        let version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE orders SET
                customer_id = $2, order_date = $3, shipped_date = $4, delivered_date = $5,
                status = $6, sub_total_cents = $7, tax_cents = $8, total_cents = $9,
                shipping_address = $10, notes = $11, updated_at = $12, version = version + 1
            WHERE id = $1 AND version = $13
            RETURNING version
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.customer_id.as_uuid())
        .bind(order.order_date)
        .bind(order.shipped_date)
        .bind(order.delivered_date)
        .bind(order.status.as_str())
        .bind(order.sub_total.cents())
        .bind(order.tax.cents())
        .bind(order.total.cents())
        .bind(&order.shipping_address)
        .bind(&order.notes)
        .bind(order.updated_at)
        .bind(order.version.as_i64())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        match version {
            Some(v) => Ok(Version::new(v)),
            None => Err(self
                .stale_write("orders", "Order", order.id.as_uuid(), order.version)
                .await),
        }
    }

    async fn delete_order(&mut self, id: OrderId, expected: Version) -> Result<()> {
        // order_items rows go with it (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM orders WHERE id = $1 AND version = $2")
            .bind(id.as_uuid())
            .bind(expected.as_i64())
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(self
                .stale_write("orders", "Order", id.as_uuid(), expected)
                .await);
        }
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
