//! Ledger-Backed Sequencer
//!
//! Computes executed and pending units from a provider and the ledger,
//! checks the ordering rules, and applies a direction/step through the
//! [`TransactionAdapter`].

use chrono::Utc;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::definitions::{Direction, LedgerRecord, ResultSet, Step, Target, UnitResult, UnitStatus};
use super::error::MigrationError;
use super::ledger::LedgerTable;
use super::naming::has_mixed_prefix_widths;
use super::unit::{UnitProvider, VersionedUnit};
use crate::backends::DatabaseConnection;
use crate::transaction::{TransactionAdapter, TransactionError};

/// Immutable sequencer settings
#[derive(Debug, Clone, Default)]
pub struct SequencerConfig {
    pub ledger: LedgerTable,
    /// Accept executed units that are not a prefix of the sorted unit list
    pub allow_unordered: bool,
}

impl SequencerConfig {
    pub fn new(ledger: LedgerTable) -> Self {
        Self {
            ledger,
            allow_unordered: false,
        }
    }

    pub fn allow_unordered(mut self, allow: bool) -> Self {
        self.allow_unordered = allow;
        self
    }
}

/// Derived state, recomputed at the start of every run
pub struct SequencerState<U: ?Sized> {
    /// Every unit from the provider, sorted by name
    pub all_units: Vec<Arc<U>>,
    /// Ledger rows in execution order
    pub executed: Vec<LedgerRecord>,
    /// Units without a ledger row, in sort order
    pub pending: Vec<Arc<U>>,
}

impl<U: VersionedUnit + ?Sized> SequencerState<U> {
    pub fn executed_names(&self) -> Vec<&str> {
        self.executed.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn last_executed_name(&self) -> Option<&str> {
        self.executed.last().map(|r| r.name.as_str())
    }

    pub fn pending_names(&self) -> Vec<&str> {
        self.pending.iter().map(|u| u.name()).collect()
    }

    pub fn unit(&self, name: &str) -> Option<&Arc<U>> {
        self.all_units.iter().find(|u| u.name() == name)
    }
}

impl<U: VersionedUnit + ?Sized> fmt::Debug for SequencerState<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequencerState")
            .field(
                "all_units",
                &self.all_units.iter().map(|u| u.name()).collect::<Vec<_>>(),
            )
            .field("executed", &self.executed_names())
            .field("pending", &self.pending_names())
            .finish()
    }
}

// Error payload of an atomic batch: what ran before the failure
struct BatchFailure {
    results: Vec<UnitResult>,
    error: MigrationError,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

/// Generic ordered executor over a [`UnitProvider`] and a [`LedgerTable`]
pub struct Sequencer<U: ?Sized + Send + Sync = dyn VersionedUnit> {
    provider: Arc<dyn UnitProvider<U>>,
    config: SequencerConfig,
    adapter: TransactionAdapter,
}

impl<U> Sequencer<U>
where
    U: VersionedUnit + ?Sized + 'static,
{
    pub fn new(provider: Arc<dyn UnitProvider<U>>, config: SequencerConfig) -> Self {
        Self {
            provider,
            config,
            adapter: TransactionAdapter::new(),
        }
    }

    /// Override transaction mode detection
    pub fn with_adapter(mut self, adapter: TransactionAdapter) -> Self {
        self.adapter = adapter;
        self
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// Ensure the ledger, load units and records, and validate them
    pub async fn state(
        &self,
        conn: &mut dyn DatabaseConnection,
    ) -> Result<SequencerState<U>, MigrationError> {
        self.config.ledger.ensure(conn).await?;

        let mut all_units = self.provider.units().await?;
        all_units.sort_by(|a, b| a.name().cmp(b.name()));

        if let Some(pair) = all_units.windows(2).find(|w| w[0].name() == w[1].name()) {
            return Err(MigrationError::Configuration(format!(
                "duplicate unit name '{}'",
                pair[0].name()
            )));
        }

        if has_mixed_prefix_widths(all_units.iter().map(|u| u.name())) {
            warn!(
                "Unit names have numeric prefixes of differing lengths; \
                 they are applied in string order, not numeric order"
            );
        }

        let executed = self.config.ledger.records(conn).await?;
        self.validate(&all_units, &executed)?;

        let executed_names: HashSet<&str> = executed.iter().map(|r| r.name.as_str()).collect();
        let pending = all_units
            .iter()
            .filter(|u| !executed_names.contains(u.name()))
            .cloned()
            .collect();

        Ok(SequencerState {
            all_units,
            executed,
            pending,
        })
    }

    fn validate(&self, all_units: &[Arc<U>], executed: &[LedgerRecord]) -> Result<(), MigrationError> {
        for record in executed {
            if !all_units.iter().any(|u| u.name() == record.name) {
                return Err(MigrationError::LedgerCorruption(format!(
                    "executed unit missing from provider: '{}'",
                    record.name
                )));
            }
        }

        if self.config.allow_unordered {
            return Ok(());
        }

        for (position, record) in executed.iter().enumerate() {
            if all_units[position].name() != record.name {
                let expected = all_units
                    .iter()
                    .position(|u| u.name() == record.name)
                    .unwrap_or(position);
                return Err(MigrationError::LedgerCorruption(format!(
                    "out-of-order execution detected: '{}' was executed at position {} \
                     but its expected index is {}",
                    record.name, position, expected
                )));
            }
        }

        Ok(())
    }

    /// Apply up to `step` units in `direction`.
    ///
    /// `Err` is reserved for conditions found before anything runs. Unit
    /// failures are captured in the returned [`ResultSet`].
    pub async fn apply(
        &self,
        conn: &mut dyn DatabaseConnection,
        direction: Direction,
        step: Step,
    ) -> Result<ResultSet, MigrationError> {
        let state = self.state(conn).await?;
        self.apply_with_state(conn, &state, direction, step).await
    }

    /// Move the ledger so that `target` is the last executed unit
    pub async fn apply_to(
        &self,
        conn: &mut dyn DatabaseConnection,
        target: Target,
    ) -> Result<ResultSet, MigrationError> {
        let state = self.state(conn).await?;
        let (direction, step) = Self::resolve_target(&state, &target)?;
        debug!(?target, %direction, ?step, "Resolved target");
        self.apply_with_state(conn, &state, direction, step).await
    }

    /// Translate a named target into a direction and step count
    pub fn resolve_target(
        state: &SequencerState<U>,
        target: &Target,
    ) -> Result<(Direction, Step), MigrationError> {
        let name = match target {
            Target::Zero => return Ok((Direction::Down, Step::All)),
            Target::Unit(name) => name,
        };

        if let Some(index) = state.executed.iter().position(|r| &r.name == name) {
            return Ok((Direction::Down, Step::Count(state.executed.len() - 1 - index)));
        }

        if let Some(index) = state.pending.iter().position(|u| u.name() == name) {
            return Ok((Direction::Up, Step::Count(index + 1)));
        }

        Err(MigrationError::Configuration(format!(
            "unit does not exist: '{}'",
            name
        )))
    }

    async fn apply_with_state(
        &self,
        conn: &mut dyn DatabaseConnection,
        state: &SequencerState<U>,
        direction: Direction,
        step: Step,
    ) -> Result<ResultSet, MigrationError> {
        let selected: Vec<Arc<U>> = match direction {
            Direction::Up => {
                let count = step.limit(state.pending.len());
                state.pending.iter().take(count).cloned().collect()
            }
            Direction::Down => {
                let count = step.limit(state.executed.len());
                state
                    .executed
                    .iter()
                    .rev()
                    .take(count)
                    .filter_map(|record| state.unit(&record.name).cloned())
                    .collect()
            }
        };

        if selected.is_empty() {
            debug!(%direction, "Nothing to apply");
            return Ok(ResultSet::empty(direction));
        }

        let mode = self.adapter.mode_for(&*conn);
        info!(%direction, count = selected.len(), %mode, "Applying units");

        let names: Vec<String> = selected.iter().map(|u| u.name().to_string()).collect();
        let ledger = self.config.ledger.clone();
        let outcome = self
            .adapter
            .run(conn, move |conn| {
                Box::pin(async move { run_batch(conn, &ledger, &selected, direction).await })
            })
            .await;

        let result_set = match outcome {
            Ok(results) => ResultSet {
                direction,
                results,
                error: None,
                rolled_back: false,
            },
            Err(TransactionError::Work { error, rolled_back }) => {
                if rolled_back {
                    warn!(%direction, "Batch rolled back; ledger unchanged");
                }
                ResultSet {
                    direction,
                    results: error.results,
                    error: Some(error.error),
                    rolled_back,
                }
            }
            Err(TransactionError::Begin(e)) => ResultSet {
                direction,
                results: not_executed(&names, direction),
                error: Some(MigrationError::Database(e)),
                rolled_back: false,
            },
            Err(TransactionError::Commit(e)) => ResultSet {
                direction,
                results: not_executed(&names, direction),
                error: Some(MigrationError::Database(e)),
                rolled_back: true,
            },
        };

        match &result_set.error {
            Some(e) => error!(%direction, "Apply stopped: {}", e),
            None => info!(%direction, count = result_set.results.len(), "Apply finished"),
        }

        Ok(result_set)
    }
}

fn not_executed(names: &[String], direction: Direction) -> Vec<UnitResult> {
    names
        .iter()
        .map(|name| UnitResult::new(name.clone(), direction, UnitStatus::NotExecuted))
        .collect()
}

async fn run_batch<U>(
    conn: &mut dyn DatabaseConnection,
    ledger: &LedgerTable,
    units: &[Arc<U>],
    direction: Direction,
) -> Result<Vec<UnitResult>, BatchFailure>
where
    U: VersionedUnit + ?Sized,
{
    let mut results = Vec::with_capacity(units.len());

    for (index, unit) in units.iter().enumerate() {
        let name = unit.name();
        debug!(unit = name, %direction, "Running unit");

        let procedure = match direction {
            Direction::Up => unit.up(conn).await,
            Direction::Down => unit.down(conn).await,
        };

        let failure = match procedure {
            Err(source) => Some(MigrationError::UnitExecution {
                unit: name.to_string(),
                direction,
                source,
            }),
            Ok(()) => {
                let write = match direction {
                    Direction::Up => ledger.insert(conn, name, Utc::now()).await,
                    Direction::Down => ledger.remove(conn, name).await.map(|_| ()),
                };
                match write {
                    Ok(()) => None,
                    Err(e) if e.is_unique_violation() => {
                        Some(MigrationError::AlreadyApplied(name.to_string()))
                    }
                    Err(e) => Some(MigrationError::Database(e)),
                }
            }
        };

        if let Some(error) = failure {
            results.push(UnitResult::new(name, direction, UnitStatus::Error));
            for rest in &units[index + 1..] {
                results.push(UnitResult::new(rest.name(), direction, UnitStatus::NotExecuted));
            }
            return Err(BatchFailure { results, error });
        }

        info!(unit = name, %direction, "Unit applied");
        results.push(UnitResult::new(name, direction, UnitStatus::Success));
    }

    Ok(results)
}
