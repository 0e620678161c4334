//! Order totals.

use store::{Money, OrderItem};

/// Sales tax applied to every order, in percent of the sub-total.
pub const TAX_RATE_PERCENT: i64 = 13;

/// Sub-total, tax and grand total of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub sub_total: Money,
    pub tax: Money,
    pub total: Money,
}

impl OrderTotals {
    /// Computes tax and total for a sub-total. Tax is rounded half away from
    /// zero to the cent. Returns `None` if the total does not fit in cents.
    pub fn from_sub_total(sub_total: Money) -> Option<Self> {
        let tax = sub_total.checked_percent(TAX_RATE_PERCENT)?;
        Some(Self {
            sub_total,
            tax,
            total: sub_total.checked_add(tax)?,
        })
    }

    /// Computes totals over a set of line items, or `None` on overflow.
    pub fn for_items(items: &[OrderItem]) -> Option<Self> {
        let sub_total = items.iter().try_fold(Money::zero(), |acc, item| {
            item.unit_price
                .checked_multiply(item.quantity)
                .and_then(|line| acc.checked_add(line))
        })?;
        Self::from_sub_total(sub_total)
    }
}
