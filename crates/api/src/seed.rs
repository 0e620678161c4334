//! Demo catalog and customers for local runs.

use domain::{DomainError, Money, NewCustomer, NewProduct, Page};
use store::Store;

use crate::AppState;

fn demo_products() -> Vec<NewProduct> {
    [
        (
            "Arroz Premium",
            "Arroz de grano largo, bolsa de 1 kg",
            250,
            100,
            "Granos",
        ),
        (
            "Frijoles Negros",
            "Frijoles negros seleccionados, bolsa de 1 kg",
            180,
            150,
            "Granos",
        ),
        (
            "Aceite de Cocina",
            "Aceite vegetal, botella de 1 litro",
            320,
            75,
            "Aceites",
        ),
    ]
    .into_iter()
    .map(|(name, description, cents, stock, category)| NewProduct {
        name: name.to_string(),
        description: description.to_string(),
        price: Money::from_cents(cents),
        stock,
        category: category.to_string(),
        brand: "Don Pepe".to_string(),
    })
    .collect()
}

fn demo_customers() -> Vec<NewCustomer> {
    vec![
        NewCustomer {
            name: "María García".to_string(),
            email: "maria.garcia@email.com".to_string(),
            phone: "555-0101".to_string(),
            address: "Calle Principal 123".to_string(),
            city: "San José".to_string(),
            state: "San José".to_string(),
            postal_code: "10101".to_string(),
        },
        NewCustomer {
            name: "Juan Pérez".to_string(),
            email: "juan.perez@email.com".to_string(),
            phone: "555-0102".to_string(),
            address: "Avenida Central 456".to_string(),
            city: "Cartago".to_string(),
            state: "Cartago".to_string(),
            postal_code: "30101".to_string(),
        },
    ]
}

/// Inserts the demo products and customers unless the catalog already has
/// active products. Returns true if data was inserted.
#[tracing::instrument(skip(state))]
pub async fn seed_demo_data<S: Store>(state: &AppState<S>) -> Result<bool, DomainError> {
    let existing = state.catalog.list_active(Page::new(Some(1), None)).await?;
    if !existing.is_empty() {
        tracing::info!("catalog already populated, skipping demo data");
        return Ok(false);
    }

    for product in demo_products() {
        state.catalog.create(product).await?;
    }
    for customer in demo_customers() {
        match state.directory.create(customer).await {
            Ok(_) | Err(DomainError::DuplicateEmail { .. }) => {}
            Err(e) => return Err(e),
        }
    }

    tracing::info!("demo data seeded");
    Ok(true)
}
