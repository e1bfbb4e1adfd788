//! StoreProvisioner: make sure an instrument's store is ACTIVE before a write.
//!
//! ABSENT stores are created and then polled until ACTIVE. The wait is
//! bounded by a [`RetryPolicy`]; running out of attempts is a
//! [`ProvisioningError::NotReady`] for that instrument only.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::{StoreBackend, StoreError, TableNaming, TableSpec, TableStatus};

/// Delay growth between readiness polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    Fixed,
    /// Doubles each attempt, capped at `max_interval`.
    Exponential { max_interval: Duration },
}

/// Bounded readiness polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    /// 2 s fixed interval, 150 attempts (five minutes).
    fn default() -> Self {
        Self {
            max_attempts: 150,
            interval: Duration::from_secs(2),
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            backoff: Backoff::Fixed,
        }
    }

    /// No waiting between polls. For tests and in-process backends.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::fixed(max_attempts, Duration::ZERO)
    }

    /// Delay before poll `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential { max_interval } => {
                let shift = attempt.saturating_sub(1).min(16);
                self.interval
                    .checked_mul(1u32 << shift)
                    .map_or(max_interval, |d| d.min(max_interval))
            }
        }
    }

    /// Upper bound on time spent sleeping across all attempts.
    pub fn total_wait(&self) -> Duration {
        (1..=self.max_attempts).map(|a| self.delay_for(a)).sum()
    }
}

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("backend rejected creation of '{table}': {source}")]
    CreateRejected {
        table: String,
        #[source]
        source: StoreError,
    },

    #[error("backend failure while provisioning '{table}': {source}")]
    Backend {
        table: String,
        #[source]
        source: StoreError,
    },

    #[error("table '{table}' not ACTIVE after {attempts} polls")]
    NotReady { table: String, attempts: u32 },
}

/// How `ensure_ready` reached ACTIVE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    AlreadyActive,
    /// Created (or found CREATING) and ACTIVE after this many polls.
    Created { polls: u32 },
}

pub struct StoreProvisioner {
    backend: Arc<dyn StoreBackend>,
    naming: TableNaming,
    policy: RetryPolicy,
}

impl StoreProvisioner {
    pub fn new(backend: Arc<dyn StoreBackend>, naming: TableNaming, policy: RetryPolicy) -> Self {
        Self {
            backend,
            naming,
            policy,
        }
    }

    pub fn backend(&self) -> &Arc<dyn StoreBackend> {
        &self.backend
    }

    pub fn naming(&self) -> &TableNaming {
        &self.naming
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn table_for(&self, instrument: &str) -> String {
        self.naming.table_for(instrument)
    }

    /// True if the instrument's store reports ACTIVE right now.
    pub fn is_active(&self, instrument: &str) -> Result<bool, ProvisioningError> {
        let table = self.table_for(instrument);
        self.describe(&table).map(|s| s == TableStatus::Active)
    }

    /// Block until the instrument's store is ACTIVE, creating it if absent.
    ///
    /// Never returns `Ok` while the store is CREATING.
    pub fn ensure_ready(&self, instrument: &str) -> Result<ProvisionOutcome, ProvisioningError> {
        let table = self.table_for(instrument);
        match self.describe(&table)? {
            TableStatus::Active => {
                tracing::debug!(table = %table, "store already active");
                return Ok(ProvisionOutcome::AlreadyActive);
            }
            TableStatus::Absent => self.create(&table)?,
            TableStatus::Creating => {
                tracing::info!(table = %table, "store creation already in progress");
            }
        }

        for attempt in 1..=self.policy.max_attempts {
            let delay = self.policy.delay_for(attempt);
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            let status = self.describe(&table)?;
            tracing::debug!(table = %table, attempt, status = %status, "polled store status");
            if status == TableStatus::Active {
                tracing::info!(table = %table, polls = attempt, "store active");
                return Ok(ProvisionOutcome::Created { polls: attempt });
            }
        }

        tracing::warn!(
            table = %table,
            attempts = self.policy.max_attempts,
            "store never became active"
        );
        Err(ProvisioningError::NotReady {
            table,
            attempts: self.policy.max_attempts,
        })
    }

    fn describe(&self, table: &str) -> Result<TableStatus, ProvisioningError> {
        self.backend
            .describe_table(table)
            .map_err(|source| ProvisioningError::Backend {
                table: table.to_string(),
                source,
            })
    }

    fn create(&self, table: &str) -> Result<(), ProvisioningError> {
        tracing::info!(table = %table, backend = self.backend.name(), "creating store");
        match self.backend.create_table(&TableSpec::trade_log(table)) {
            Ok(()) => Ok(()),
            // Another writer won the race; poll the table it created.
            Err(StoreError::TableExists(_)) => {
                tracing::debug!(table = %table, "store created concurrently");
                Ok(())
            }
            Err(source) => Err(ProvisioningError::CreateRejected {
                table: table.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn provisioner(store: Arc<MemoryStore>, attempts: u32) -> StoreProvisioner {
        StoreProvisioner::new(store, TableNaming::default(), RetryPolicy::immediate(attempts))
    }

    #[test]
    fn absent_store_goes_through_creating_to_active() {
        let store = Arc::new(MemoryStore::new().with_creation_delay(2));
        let p = provisioner(store.clone(), 10);

        let outcome = p.ensure_ready("EUR_USD").unwrap();
        assert_eq!(outcome, ProvisionOutcome::Created { polls: 3 });
        assert_eq!(
            store.observed_statuses("fx-trading-EUR_USD"),
            vec![
                TableStatus::Absent,
                TableStatus::Creating,
                TableStatus::Creating,
                TableStatus::Active
            ]
        );
    }

    #[test]
    fn second_call_is_a_fast_path() {
        let store = Arc::new(MemoryStore::new().with_creation_delay(1));
        let p = provisioner(store.clone(), 10);
        p.ensure_ready("EUR_USD").unwrap();
        let before = store.observed_statuses("fx-trading-EUR_USD").len();

        assert_eq!(p.ensure_ready("EUR_USD").unwrap(), ProvisionOutcome::AlreadyActive);
        assert_eq!(store.observed_statuses("fx-trading-EUR_USD").len(), before + 1);
        assert_eq!(store.table_names(), vec!["fx-trading-EUR_USD".to_string()]);
    }

    #[test]
    fn exhausted_budget_is_not_ready() {
        let store = Arc::new(MemoryStore::new().with_creation_delay(100));
        let p = provisioner(store, 3);
        match p.ensure_ready("GBP_USD") {
            Err(ProvisioningError::NotReady { table, attempts }) => {
                assert_eq!(table, "fx-trading-GBP_USD");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected NotReady, got {other:?}"),
        }
    }

    #[test]
    fn rejected_create_surfaces() {
        let store = Arc::new(MemoryStore::new().rejecting_creates());
        let p = provisioner(store, 3);
        assert!(matches!(
            p.ensure_ready("EUR_USD"),
            Err(ProvisioningError::CreateRejected { .. })
        ));
    }

    #[test]
    fn store_found_creating_is_polled_without_create() {
        let store = Arc::new(MemoryStore::new().with_creation_delay(1));
        store.create_table(&TableSpec::trade_log("fx-trading-EUR_USD")).unwrap();
        let p = provisioner(store.clone(), 5);
        // First describe spends the delay, the poll sees ACTIVE.
        assert_eq!(
            p.ensure_ready("EUR_USD").unwrap(),
            ProvisionOutcome::Created { polls: 1 }
        );
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            interval: Duration::from_millis(100),
            backoff: Backoff::Exponential {
                max_interval: Duration::from_millis(500),
            },
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
        assert_eq!(policy.total_wait(), Duration::from_millis(1700));
    }

    #[test]
    fn default_policy_waits_two_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(7), Duration::from_secs(2));
        assert_eq!(policy.total_wait(), Duration::from_secs(300));
    }
}
