use crate::{Customer, CustomerId, Lifecycle, Order, Product, ProductId};

/// Limit/offset window applied after filtering and sorting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    /// Maximum number of records to return.
    pub limit: Option<usize>,

    /// Number of records to skip.
    pub offset: Option<usize>,
}

impl Page {
    /// Returns every record.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(limit: Option<usize>, offset: Option<usize>) -> Self {
        Self { limit, offset }
    }

    pub(crate) fn apply<T>(&self, records: Vec<T>) -> Vec<T> {
        let records = records.into_iter().skip(self.offset.unwrap_or(0));
        match self.limit {
            Some(limit) => records.take(limit).collect(),
            None => records.collect(),
        }
    }
}

/// Sort order for product listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProductOrder {
    /// Alphabetical by name.
    #[default]
    Name,

    /// Lowest stock first, ties broken by name.
    StockAscending,
}

/// Builder for product lookups.
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    /// Filter by lifecycle.
    pub lifecycle: Option<Lifecycle>,

    /// Filter to these ids.
    pub ids: Option<Vec<ProductId>>,

    /// Filter by category, compared case-insensitively.
    pub category: Option<String>,

    /// Filter to stock strictly below this value.
    pub stock_below: Option<i32>,

    pub order: ProductOrder,

    pub page: Page,
}

impl ProductQuery {
    /// Creates a query matching every product.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for active products only.
    pub fn active() -> Self {
        Self::new().lifecycle(Lifecycle::Active)
    }

    pub fn lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    pub fn ids(mut self, ids: Vec<ProductId>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn stock_below(mut self, threshold: i32) -> Self {
        self.stock_below = Some(threshold);
        self
    }

    pub fn order_by(mut self, order: ProductOrder) -> Self {
        self.order = order;
        self
    }

    pub fn page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }

    pub(crate) fn matches(&self, product: &Product) -> bool {
        if let Some(lifecycle) = self.lifecycle
            && product.lifecycle != lifecycle
        {
            return false;
        }
        if let Some(ref ids) = self.ids
            && !ids.contains(&product.id)
        {
            return false;
        }
        if let Some(ref category) = self.category
            && product.category.to_lowercase() != category.to_lowercase()
        {
            return false;
        }
        if let Some(threshold) = self.stock_below
            && product.stock >= threshold
        {
            return false;
        }
        true
    }
}

/// Builder for customer lookups. Results are ordered by name.
#[derive(Debug, Clone, Default)]
pub struct CustomerQuery {
    /// Filter by lifecycle.
    pub lifecycle: Option<Lifecycle>,

    /// Filter to these ids.
    pub ids: Option<Vec<CustomerId>>,

    pub page: Page,
}

impl CustomerQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for active customers only.
    pub fn active() -> Self {
        Self::new().lifecycle(Lifecycle::Active)
    }

    pub fn lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    pub fn ids(mut self, ids: Vec<CustomerId>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }

    pub(crate) fn matches(&self, customer: &Customer) -> bool {
        if let Some(lifecycle) = self.lifecycle
            && customer.lifecycle != lifecycle
        {
            return false;
        }
        if let Some(ref ids) = self.ids
            && !ids.contains(&customer.id)
        {
            return false;
        }
        true
    }
}

/// Builder for order lookups. Results are ordered newest first.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Filter by the owning customer.
    pub customer_id: Option<CustomerId>,

    pub page: Page,
}

impl OrderQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for one customer's orders.
    pub fn for_customer(customer_id: CustomerId) -> Self {
        Self {
            customer_id: Some(customer_id),
            ..Default::default()
        }
    }

    pub fn page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }

    pub(crate) fn matches(&self, order: &Order) -> bool {
        match self.customer_id {
            Some(customer_id) => order.customer_id == customer_id,
            None => true,
        }
    }
}
