//! Customer directory.

use chrono::Utc;
use store::{
    Customer, CustomerId, CustomerQuery, Lifecycle, Order, OrderQuery, Page, Store, StoreError,
    UnitOfWork, Version,
};

use crate::error::DomainError;
use crate::validation;

/// Input for registering a customer.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
}

/// Full replacement of a customer's mutable fields.
#[derive(Debug, Clone)]
pub struct CustomerReplacement {
    pub id: CustomerId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub lifecycle: Lifecycle,
    pub version: Version,
}

/// An active customer together with its orders, newest first.
#[derive(Debug, Clone)]
pub struct CustomerWithOrders {
    pub customer: Customer,
    pub orders: Vec<Order>,
}

/// Which branch a customer delete took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The customer has orders and was soft-deleted.
    Deactivated,
    /// The customer had no orders and was removed.
    Removed,
}

#[allow(clippy::too_many_arguments)]
fn validate_fields(
    name: &str,
    email: &str,
    phone: &str,
    address: &str,
    city: &str,
    state: &str,
    postal_code: &str,
) -> Result<(), DomainError> {
    validation::required("name", name, 100)?;
    validation::email(email)?;
    validation::max_len("phone", phone, 20)?;
    validation::max_len("address", address, 200)?;
    validation::max_len("city", city, 50)?;
    validation::max_len("state", state, 50)?;
    validation::max_len("postal_code", postal_code, 20)
}

fn map_duplicate_email(e: StoreError, email: &str) -> DomainError {
    if e.is_duplicate_email() {
        DomainError::DuplicateEmail {
            email: email.to_string(),
        }
    } else {
        e.into()
    }
}

/// Service for registering and maintaining customers.
///
/// Email addresses are unique among active customers only, so the address of
/// a deactivated customer can be registered again.
pub struct DirectoryService<S: Store> {
    store: S,
}

impl<S: Store> DirectoryService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Lists active customers ordered by name.
    #[tracing::instrument(skip(self))]
    pub async fn list_active(&self, page: Page) -> Result<Vec<Customer>, DomainError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.find_customers(&CustomerQuery::active().page(page)).await?)
    }

    /// Returns an active customer and its orders.
    #[tracing::instrument(skip(self))]
    pub async fn get_active_with_orders(
        &self,
        id: CustomerId,
    ) -> Result<CustomerWithOrders, DomainError> {
        let mut tx = self.store.begin().await?;
        let customer = tx
            .find_customer(id)
            .await?
            .filter(Customer::is_active)
            .ok_or_else(|| DomainError::not_found("Customer", id))?;
        let orders = tx.find_orders(&OrderQuery::for_customer(id)).await?;

        Ok(CustomerWithOrders { customer, orders })
    }

    #[tracing::instrument(skip(self))]
    pub async fn create(&self, new: NewCustomer) -> Result<Customer, DomainError> {
        validate_fields(
            &new.name,
            &new.email,
            &new.phone,
            &new.address,
            &new.city,
            &new.state,
            &new.postal_code,
        )?;

        let mut tx = self.store.begin().await?;
        if tx.active_email_exists(&new.email, None).await? {
            return Err(DomainError::DuplicateEmail { email: new.email });
        }

        let customer = Customer {
            id: CustomerId::new(),
            name: new.name,
            email: new.email,
            phone: new.phone,
            address: new.address,
            city: new.city,
            state: new.state,
            postal_code: new.postal_code,
            lifecycle: Lifecycle::Active,
            created_at: Utc::now(),
            updated_at: None,
            version: Version::first(),
        };
        tx.insert_customer(&customer)
            .await
            .map_err(|e| map_duplicate_email(e, &customer.email))?;
        tx.commit().await?;

        tracing::info!(customer_id = %customer.id, "customer created");
        Ok(customer)
    }

    /// Replaces a customer. The email check only applies when the result is
    /// active.
    #[tracing::instrument(skip(self))]
    pub async fn replace(
        &self,
        id: CustomerId,
        replacement: CustomerReplacement,
    ) -> Result<Customer, DomainError> {
        if replacement.id != id {
            return Err(DomainError::ValidationFailed(format!(
                "body id {} does not match path id {id}",
                replacement.id
            )));
        }
        validate_fields(
            &replacement.name,
            &replacement.email,
            &replacement.phone,
            &replacement.address,
            &replacement.city,
            &replacement.state,
            &replacement.postal_code,
        )?;

        let mut tx = self.store.begin().await?;
        let existing = tx
            .find_customer(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Customer", id))?;

        if replacement.lifecycle.is_active()
            && tx.active_email_exists(&replacement.email, Some(id)).await?
        {
            return Err(DomainError::DuplicateEmail {
                email: replacement.email,
            });
        }

        let mut customer = Customer {
            id,
            name: replacement.name,
            email: replacement.email,
            phone: replacement.phone,
            address: replacement.address,
            city: replacement.city,
            state: replacement.state,
            postal_code: replacement.postal_code,
            lifecycle: replacement.lifecycle,
            created_at: existing.created_at,
            updated_at: Some(Utc::now()),
            version: replacement.version,
        };
        customer.version = tx
            .replace_customer(&customer)
            .await
            .map_err(|e| map_duplicate_email(e, &customer.email))?;
        tx.commit().await?;

        Ok(customer)
    }

    /// Deletes a customer: soft if it has placed orders, hard otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: CustomerId) -> Result<DeleteOutcome, DomainError> {
        let mut tx = self.store.begin().await?;
        let mut customer = tx
            .find_customer(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Customer", id))?;

        let outcome = if tx.customer_has_orders(id).await? {
            customer.lifecycle = Lifecycle::Deactivated;
            customer.updated_at = Some(Utc::now());
            tx.replace_customer(&customer).await?;
            DeleteOutcome::Deactivated
        } else {
            tx.delete_customer(id).await?;
            DeleteOutcome::Removed
        };
        tx.commit().await?;

        tracing::info!(customer_id = %id, ?outcome, "customer deleted");
        Ok(outcome)
    }
}
