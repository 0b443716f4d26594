//! Credit ledger entries - append-only record of balance changes per tenant

use crate::domain::types::TenantId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One balance-affecting transaction; immutable once written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditLedgerEntry {
    /// UUIDv7 so entries sort by creation time
    pub id: Uuid,
    pub tenant: TenantId,
    /// Positive for top-ups, negative for debits
    pub amount: Decimal,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl CreditLedgerEntry {
    pub fn new(tenant: TenantId, amount: Decimal, description: &str) -> Self {
        Self {
            id: Uuid::now_v7(),
            tenant,
            amount,
            description: description.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[inline]
    pub fn is_debit(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }
}

/// Tenant balance is the plain sum of its entries
pub fn balance_of<'a>(entries: impl IntoIterator<Item = &'a CreditLedgerEntry>) -> Decimal {
    entries.into_iter().map(|e| e.amount).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_is_sum_of_entries() {
        let tenant = TenantId::new("acme");
        let entries = vec![
            CreditLedgerEntry::new(tenant.clone(), Decimal::new(500, 2), "top-up"),
            CreditLedgerEntry::new(tenant.clone(), Decimal::new(-50, 2), "route"),
            CreditLedgerEntry::new(tenant, Decimal::new(-50, 2), "route"),
        ];
        assert_eq!(balance_of(&entries), Decimal::new(400, 2));
        assert!(entries[1].is_debit());
        assert!(!entries[0].is_debit());
    }

    #[test]
    fn test_entry_json_keeps_decimal_exact() {
        let entry = CreditLedgerEntry::new(TenantId::new("acme"), Decimal::new(-50, 2), "route");
        let json = serde_json::to_string(&entry).unwrap();
        let back: CreditLedgerEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.amount, Decimal::new(-50, 2));
        assert_eq!(back.tenant, entry.tenant);
    }
}
