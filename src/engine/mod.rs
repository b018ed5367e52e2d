mod capacity;
mod catalog;
mod cohort;
mod conflict;
mod error;
mod explain;
#[cfg(test)]
mod fixtures;
mod mutations;
pub mod overlap;
mod pipeline;
mod queries;
mod snapshot;

pub use capacity::{Headcount, validate_capacity};
pub use catalog::Catalog;
pub use cohort::CohortResolver;
pub use conflict::{Collision, Conflict, Dimension, find_conflict, pair_collision};
pub use error::{EngineError, Outcome, Rejection, RejectionKind, RowError};
pub use explain::{describe, explain};
pub use pipeline::{build_entry, check_rules, validate_batch, validate_candidate};
pub use snapshot::{ScheduleSource, Snapshot};

use std::io;
use std::ops::DerefMut;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedDayState = Arc<RwLock<DayState>>;
pub(super) type DayGuard = OwnedRwLockWriteGuard<DayState>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends.
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders with the shared result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut pending = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            pending = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = pending {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
    tracing::debug!("WAL writer stopped");
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(ref e) = result {
        tracing::error!(error = %e, events = batch.len(), "WAL flush failed");
    }
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &mut [(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so buffered bytes do not leak into
    // the next batch.
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// Timetable engine: reference data, per-date entry lists and the WAL.
///
/// Lock order is catalog first, then dates ascending. Mutations hold the
/// catalog read lock; registrations and compaction take it for writing.
pub struct Engine {
    pub(super) catalog: RwLock<Catalog>,
    pub(super) days: DashMap<NaiveDate, SharedDayState>,
    /// Reverse lookup: entry id → date it is stored under.
    pub(super) entry_dates: DashMap<Ulid, NaiveDate>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
}

fn day_mut<G: DerefMut<Target = DayState>>(days: &mut [G], date: NaiveDate) -> Option<&mut DayState> {
    days.iter_mut().find(|g| g.date == date).map(|g| &mut **g)
}

fn insert_into<G: DerefMut<Target = DayState>>(
    days: &mut [G],
    entry: ScheduleEntry,
    entry_dates: &DashMap<Ulid, NaiveDate>,
) {
    let date = entry.slot.date;
    if let Some(day) = day_mut(days, date) {
        entry_dates.insert(entry.id, date);
        day.insert_entry(entry);
    }
}

/// Apply an entry event to the locked days it touches. Catalog events are
/// ignored here.
fn apply_to_days<G: DerefMut<Target = DayState>>(
    days: &mut [G],
    event: &Event,
    entry_dates: &DashMap<Ulid, NaiveDate>,
) {
    match event {
        Event::EntryScheduled { entry } => insert_into(days, entry.clone(), entry_dates),
        Event::EntryRescheduled { entry, previous_date } => {
            if let Some(day) = day_mut(days, *previous_date) {
                day.remove_entry(entry.id);
            }
            insert_into(days, entry.clone(), entry_dates);
        }
        Event::EntryDeleted { id, date } => {
            if let Some(day) = day_mut(days, *date) {
                day.remove_entry(*id);
            }
            entry_dates.remove(id);
        }
        Event::BatchScheduled { entries } => {
            for entry in entries {
                insert_into(days, entry.clone(), entry_dates);
            }
        }
        _ => {}
    }
}

/// Dates an entry event touches, ascending and deduplicated.
fn event_dates(event: &Event) -> Vec<NaiveDate> {
    let mut dates = match event {
        Event::EntryScheduled { entry } => vec![entry.slot.date],
        Event::EntryRescheduled { entry, previous_date } => vec![*previous_date, entry.slot.date],
        Event::EntryDeleted { date, .. } => vec![*date],
        Event::BatchScheduled { entries } => entries.iter().map(|e| e.slot.date).collect(),
        _ => Vec::new(),
    };
    dates.sort();
    dates.dedup();
    dates
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut catalog = Catalog::new();
        let mut engine = Self {
            catalog: RwLock::new(Catalog::new()),
            days: DashMap::new(),
            entry_dates: DashMap::new(),
            wal_tx,
            notify,
        };

        // Sole owner of every Arc here, so try_write_owned never contends.
        for event in &events {
            if event.is_catalog() {
                catalog.apply_event(event);
                continue;
            }
            let mut guards = Vec::new();
            for date in event_dates(event) {
                let guard = engine
                    .day(date)
                    .try_write_owned()
                    .map_err(|_| io::Error::other(format!("replay: day {date} locked")))?;
                guards.push(guard);
            }
            apply_to_days(&mut guards, event, &engine.entry_dates);
        }
        *engine.catalog.get_mut() = catalog;

        metrics::gauge!(crate::observability::ENTRIES_ACTIVE).set(engine.entry_dates.len() as f64);
        tracing::info!(
            events = events.len(),
            entries = engine.entry_dates.len(),
            "replayed {}",
            wal_path.display()
        );
        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Infrastructure("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Infrastructure("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Infrastructure(e.to_string()))
    }

    /// The lock for `date`, created empty on first use.
    pub(super) fn day(&self, date: NaiveDate) -> SharedDayState {
        self.days
            .entry(date)
            .or_insert_with(|| Arc::new(RwLock::new(DayState::new(date))))
            .clone()
    }

    /// Write-lock every date in ascending order.
    pub(super) async fn lock_days(&self, dates: &[NaiveDate]) -> Vec<DayGuard> {
        let mut dates = dates.to_vec();
        dates.sort();
        dates.dedup();
        let mut guards = Vec::with_capacity(dates.len());
        for date in dates {
            guards.push(self.day(date).write_owned().await);
        }
        guards
    }

    /// Lock the date currently holding `id` plus `also`. Retries when the
    /// entry moved while waiting for the locks.
    pub(super) async fn lock_entry(
        &self,
        id: Ulid,
        also: Option<NaiveDate>,
    ) -> Result<(NaiveDate, Vec<DayGuard>), EngineError> {
        loop {
            let date = self.entry_date(&id)?;
            let mut dates = vec![date];
            dates.extend(also);
            let guards = self.lock_days(&dates).await;
            if guards.iter().any(|g| g.date == date && g.get(&id).is_some()) {
                return Ok((date, guards));
            }
        }
    }

    pub(super) fn entry_date(&self, id: &Ulid) -> Result<NaiveDate, EngineError> {
        self.entry_dates.get(id).map(|d| *d.value()).ok_or_else(|| EngineError::NotFound {
            what: "Jadwal",
            id: id.to_string(),
        })
    }

    /// WAL-append then apply to the already locked days.
    pub(super) async fn persist_and_apply(&self, guards: &mut [DayGuard], event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_days(guards, event, &self.entry_dates);
        metrics::gauge!(crate::observability::ENTRIES_ACTIVE).set(self.entry_dates.len() as f64);
        Ok(())
    }
}
