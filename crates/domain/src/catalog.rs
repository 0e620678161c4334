//! Product catalog.

use chrono::Utc;
use store::{
    Lifecycle, Money, Page, Product, ProductId, ProductOrder, ProductQuery, Store, UnitOfWork,
    Version,
};

use crate::error::DomainError;
use crate::validation;

/// Active products with stock strictly below this value are reported as low.
pub const LOW_STOCK_THRESHOLD: i32 = 20;

/// Input for creating a product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: i32,
    pub category: String,
    pub brand: String,
}

/// Full replacement of a product's mutable fields.
///
/// `version` must be the version the caller read; a stale version is
/// rejected with [`DomainError::ConcurrencyConflict`].
#[derive(Debug, Clone)]
pub struct ProductReplacement {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: i32,
    pub category: String,
    pub brand: String,
    pub lifecycle: Lifecycle,
    pub version: Version,
}

fn validate_fields(
    name: &str,
    description: &str,
    price: Money,
    stock: i32,
    category: &str,
    brand: &str,
) -> Result<(), DomainError> {
    validation::required("name", name, 100)?;
    validation::max_len("description", description, 500)?;
    validation::max_len("category", category, 50)?;
    validation::max_len("brand", brand, 50)?;
    if price.is_negative() {
        return Err(DomainError::ValidationFailed(
            "price must not be negative".to_string(),
        ));
    }
    if stock < 0 {
        return Err(DomainError::ValidationFailed(
            "stock must not be negative".to_string(),
        ));
    }
    Ok(())
}

/// Service for browsing and maintaining the product catalog.
///
/// Deactivated products are invisible to every read operation here but are
/// kept in the store so existing orders can still resolve them.
pub struct CatalogService<S: Store> {
    store: S,
}

impl<S: Store> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Lists active products ordered by name.
    #[tracing::instrument(skip(self))]
    pub async fn list_active(&self, page: Page) -> Result<Vec<Product>, DomainError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.find_products(&ProductQuery::active().page(page)).await?)
    }

    /// Returns an active product.
    #[tracing::instrument(skip(self))]
    pub async fn get_active(&self, id: ProductId) -> Result<Product, DomainError> {
        let mut tx = self.store.begin().await?;
        tx.find_product(id)
            .await?
            .filter(Product::is_active)
            .ok_or_else(|| DomainError::not_found("Product", id))
    }

    /// Lists active products in a category, compared case-insensitively.
    #[tracing::instrument(skip(self))]
    pub async fn by_category(
        &self,
        category: &str,
        page: Page,
    ) -> Result<Vec<Product>, DomainError> {
        let mut tx = self.store.begin().await?;
        let query = ProductQuery::active().category(category).page(page);
        Ok(tx.find_products(&query).await?)
    }

    /// Lists active products below [`LOW_STOCK_THRESHOLD`], lowest stock first.
    #[tracing::instrument(skip(self))]
    pub async fn low_stock(&self, page: Page) -> Result<Vec<Product>, DomainError> {
        let mut tx = self.store.begin().await?;
        let query = ProductQuery::active()
            .stock_below(LOW_STOCK_THRESHOLD)
            .order_by(ProductOrder::StockAscending)
            .page(page);
        Ok(tx.find_products(&query).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn create(&self, new: NewProduct) -> Result<Product, DomainError> {
        validate_fields(
            &new.name,
            &new.description,
            new.price,
            new.stock,
            &new.category,
            &new.brand,
        )?;

        let product = Product {
            id: ProductId::new(),
            name: new.name,
            description: new.description,
            price: new.price,
            stock: new.stock,
            category: new.category,
            brand: new.brand,
            lifecycle: Lifecycle::Active,
            created_at: Utc::now(),
            updated_at: None,
            version: Version::first(),
        };

        let mut tx = self.store.begin().await?;
        tx.insert_product(&product).await?;
        tx.commit().await?;

        tracing::info!(product_id = %product.id, "product created");
        Ok(product)
    }

    /// Replaces a product. The product may be reactivated this way.
    #[tracing::instrument(skip(self))]
    pub async fn replace(
        &self,
        id: ProductId,
        replacement: ProductReplacement,
    ) -> Result<Product, DomainError> {
        if replacement.id != id {
            return Err(DomainError::ValidationFailed(format!(
                "body id {} does not match path id {id}",
                replacement.id
            )));
        }
        validate_fields(
            &replacement.name,
            &replacement.description,
            replacement.price,
            replacement.stock,
            &replacement.category,
            &replacement.brand,
        )?;

        let mut tx = self.store.begin().await?;
        let existing = tx
            .find_product(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Product", id))?;

        let mut product = Product {
            id,
            name: replacement.name,
            description: replacement.description,
            price: replacement.price,
            stock: replacement.stock,
            category: replacement.category,
            brand: replacement.brand,
            lifecycle: replacement.lifecycle,
            created_at: existing.created_at,
            updated_at: Some(Utc::now()),
            version: replacement.version,
        };
        product.version = tx.replace_product(&product).await?;
        tx.commit().await?;

        Ok(product)
    }

    /// Soft-deletes a product.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate(&self, id: ProductId) -> Result<(), DomainError> {
        let mut tx = self.store.begin().await?;
        let mut product = tx
            .find_product(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Product", id))?;

        product.lifecycle = Lifecycle::Deactivated;
        product.updated_at = Some(Utc::now());
        tx.replace_product(&product).await?;
        tx.commit().await?;

        tracing::info!(product_id = %id, "product deactivated");
        Ok(())
    }
}
