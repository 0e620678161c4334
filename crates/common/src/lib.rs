//! Identifiers and value types shared by the store, domain and API crates.

mod money;
mod status;
mod types;

pub use money::Money;
pub use status::{Lifecycle, OrderStatus, ParseStatusError};
pub use types::{CustomerId, OrderId, OrderItemId, ProductId};
