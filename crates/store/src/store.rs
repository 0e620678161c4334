use async_trait::async_trait;

use crate::{
    Customer, CustomerId, CustomerQuery, Order, OrderId, OrderQuery, Product, ProductId,
    ProductQuery, Result, Version,
};

/// Entry point to the persistence layer.
///
/// All implementations must be thread-safe (Send + Sync) so a single store
/// can be shared by every request handler.
#[async_trait]
pub trait Store: Send + Sync {
    /// The unit of work type handed out by [`Store::begin`].
    type Tx: UnitOfWork + 'static;

    /// Starts a new unit of work.
    ///
    /// Nothing written through the unit of work is visible to others until
    /// [`UnitOfWork::commit`] succeeds. Dropping it without committing
    /// discards every change.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// One atomic transaction spanning every read and write of a request.
///
/// `replace_*` methods perform an optimistic version check: the write only
/// applies if the stored version equals the version on the given record, and
/// the new version is returned. A failed check is reported as
/// `StoreError::NotFound` when the record is gone and
/// `StoreError::ConcurrencyConflict` otherwise.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Finds a product by id, whatever its lifecycle.
    async fn find_product(&mut self, id: ProductId) -> Result<Option<Product>>;

    /// Retrieves products matching a query.
    async fn find_products(&mut self, query: &ProductQuery) -> Result<Vec<Product>>;

    /// Loads the given products and holds a write lock on them until the unit
    /// of work ends. Missing ids are skipped.
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>>;

    async fn insert_product(&mut self, product: &Product) -> Result<()>;

    async fn replace_product(&mut self, product: &Product) -> Result<Version>;

    /// Finds a customer by id, whatever its lifecycle.
    async fn find_customer(&mut self, id: CustomerId) -> Result<Option<Customer>>;

    async fn find_customers(&mut self, query: &CustomerQuery) -> Result<Vec<Customer>>;

    async fn insert_customer(&mut self, customer: &Customer) -> Result<()>;

    async fn replace_customer(&mut self, customer: &Customer) -> Result<Version>;

    /// Physically removes a customer. Fails with a foreign key violation if
    /// any order still references it.
    async fn delete_customer(&mut self, id: CustomerId) -> Result<()>;

    /// Returns true if an active customer other than `excluding` uses `email`.
    async fn active_email_exists(
        &mut self,
        email: &str,
        excluding: Option<CustomerId>,
    ) -> Result<bool>;

    /// Finds an order and its items.
    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    async fn find_orders(&mut self, query: &OrderQuery) -> Result<Vec<Order>>;

    async fn customer_has_orders(&mut self, id: CustomerId) -> Result<bool>;

    /// Inserts an order together with all of its items.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Replaces the order header. Items are left untouched.
    async fn replace_order(&mut self, order: &Order) -> Result<Version>;

    /// Removes an order and, by cascade, its items, if its stored version is
    /// still `expected`.
    async fn delete_order(&mut self, id: OrderId, expected: Version) -> Result<()>;

    /// Makes every change of this unit of work durable and visible.
    async fn commit(self) -> Result<()>;
}
