//! Credit ledger collaborator
//!
//! Balance is always derived from the entries; nothing stores a running
//! total. Two implementations:
//! - `InMemoryCreditLedger` - tests and the command-line driver
//! - `JsonlCreditLedger` - append-only file, one JSON entry per line

use crate::domain::ledger::balance_of;
use crate::domain::{CreditLedgerEntry, LedgerError, TenantId};
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Sum of all entries for the tenant
    async fn balance(&self, tenant: &TenantId) -> Result<Decimal, LedgerError>;

    /// Insert a new entry; existing entries are never modified
    async fn append_entry(
        &self,
        tenant: &TenantId,
        amount: Decimal,
        description: &str,
    ) -> Result<CreditLedgerEntry, LedgerError>;

    async fn entries(&self, tenant: &TenantId) -> Result<Vec<CreditLedgerEntry>, LedgerError>;
}

#[derive(Default)]
pub struct InMemoryCreditLedger {
    entries: Mutex<FxHashMap<TenantId, Vec<CreditLedgerEntry>>>,
}

impl InMemoryCreditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger with one opening top-up for the tenant
    pub fn with_balance(tenant: &TenantId, amount: Decimal) -> Self {
        let ledger = Self::new();
        ledger.push(CreditLedgerEntry::new(tenant.clone(), amount, "opening balance"));
        ledger
    }

    fn push(&self, entry: CreditLedgerEntry) {
        self.entries.lock().entry(entry.tenant.clone()).or_default().push(entry);
    }
}

#[async_trait]
impl CreditLedger for InMemoryCreditLedger {
    async fn balance(&self, tenant: &TenantId) -> Result<Decimal, LedgerError> {
        let entries = self.entries.lock();
        Ok(entries.get(tenant).map(|e| balance_of(e)).unwrap_or_default())
    }

    async fn append_entry(
        &self,
        tenant: &TenantId,
        amount: Decimal,
        description: &str,
    ) -> Result<CreditLedgerEntry, LedgerError> {
        let entry = CreditLedgerEntry::new(tenant.clone(), amount, description);
        self.push(entry.clone());
        debug!(tenant = %tenant, amount = %amount, "ledger_entry_appended");
        Ok(entry)
    }

    async fn entries(&self, tenant: &TenantId) -> Result<Vec<CreditLedgerEntry>, LedgerError> {
        Ok(self.entries.lock().get(tenant).cloned().unwrap_or_default())
    }
}

/// Append-only JSONL ledger file shared by all tenants
pub struct JsonlCreditLedger {
    file_path: PathBuf,
    /// Serializes appends from concurrent tasks
    write_lock: Mutex<()>,
}

impl JsonlCreditLedger {
    pub fn new(file_path: impl AsRef<Path>) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        info!(file_path = %file_path.display(), "credit_ledger_initialized");
        Self { file_path, write_lock: Mutex::new(()) }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new().create(true).append(true).open(&self.file_path)?;
        writeln!(file, "{}", line)?;
        file.sync_data()?;
        debug!(file = %self.file_path.display(), bytes = %line.len(), "ledger_written");
        Ok(())
    }

    /// Read every entry for the tenant; unreadable lines are skipped with a warning
    fn read_entries(&self, tenant: &TenantId) -> Result<Vec<CreditLedgerEntry>, LedgerError> {
        let file = match std::fs::File::open(&self.file_path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CreditLedgerEntry>(&line) {
                Ok(entry) if &entry.tenant == tenant => entries.push(entry),
                Ok(_) => {}
                Err(e) => {
                    warn!(line = %(line_no + 1), error = %e, "ledger_line_unreadable");
                }
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl CreditLedger for JsonlCreditLedger {
    async fn balance(&self, tenant: &TenantId) -> Result<Decimal, LedgerError> {
        Ok(balance_of(&self.read_entries(tenant)?))
    }

    async fn append_entry(
        &self,
        tenant: &TenantId,
        amount: Decimal,
        description: &str,
    ) -> Result<CreditLedgerEntry, LedgerError> {
        let entry = CreditLedgerEntry::new(tenant.clone(), amount, description);
        let json = serde_json::to_string(&entry)?;
        self.append_line(&json)?;
        info!(
            tenant = %tenant,
            entry_id = %entry.id,
            amount = %amount,
            description = %description,
            "ledger_entry_appended"
        );
        Ok(entry)
    }

    async fn entries(&self, tenant: &TenantId) -> Result<Vec<CreditLedgerEntry>, LedgerError> {
        self.read_entries(tenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_balance_tracks_entries() {
        let tenant = TenantId::new("acme");
        let ledger = InMemoryCreditLedger::with_balance(&tenant, Decimal::new(100, 2));
        ledger.append_entry(&tenant, Decimal::new(-50, 2), "route").await.unwrap();

        assert_eq!(ledger.balance(&tenant).await.unwrap(), Decimal::new(50, 2));
        assert_eq!(ledger.entries(&tenant).await.unwrap().len(), 2);
        assert_eq!(ledger.balance(&TenantId::new("nobody")).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_jsonl_ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger").join("credits.jsonl");
        let acme = TenantId::new("acme");
        let other = TenantId::new("other");

        {
            let ledger = JsonlCreditLedger::new(&path);
            ledger.append_entry(&acme, Decimal::new(300, 2), "top-up").await.unwrap();
            ledger.append_entry(&other, Decimal::new(900, 2), "top-up").await.unwrap();
            ledger.append_entry(&acme, Decimal::new(-50, 2), "route").await.unwrap();
        }

        let reopened = JsonlCreditLedger::new(&path);
        assert_eq!(reopened.balance(&acme).await.unwrap(), Decimal::new(250, 2));
        assert_eq!(reopened.balance(&other).await.unwrap(), Decimal::new(900, 2));
        assert_eq!(reopened.entries(&acme).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_jsonl_ledger_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = JsonlCreditLedger::new(dir.path().join("absent.jsonl"));
        assert_eq!(ledger.balance(&TenantId::new("acme")).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_jsonl_ledger_skips_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credits.jsonl");
        let tenant = TenantId::new("acme");
        let ledger = JsonlCreditLedger::new(&path);
        ledger.append_entry(&tenant, Decimal::new(100, 2), "top-up").await.unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .and_then(|mut f| writeln!(f, "{{not json"))
            .unwrap();

        assert_eq!(ledger.balance(&tenant).await.unwrap(), Decimal::new(100, 2));
    }
}
