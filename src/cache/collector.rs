//! Collection passes.
//!
//! A pass runs in three phases:
//!
//! ```text
//!   1. detach   limbo + active ──take_all──▶ version < floor ? candidate : put back
//!   2. select   candidates ──select_victims──▶ evict | retain (second chance)
//!   3. reclaim  evict ──unpublish, compare version──▶ free | limbo
//! ```
//!
//! Only one pass runs at a time. Readers never wait for a pass and page
//! faults keep pushing onto the active list while it runs.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::cache::list::RecordList;
use crate::cache::policy::{select_victims, Candidate};
use crate::cache::record::{Reclaim, RecordPtr};
use crate::cache::Cache;
use crate::common::Epoch;

/// Name of the background collector thread.
pub const COLLECTOR_THREAD_NAME: &str = "page-cache-collector";

/// Summary of one collection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassReport {
    /// Pages with a version at or above this epoch were left alone.
    pub floor: Epoch,
    /// Records detached as candidates.
    pub candidates: usize,
    /// Candidates selected for eviction.
    pub evicted: usize,
    /// Selected records whose memory was released.
    pub freed: usize,
    pub reclaimed_bytes: u64,
    /// Selected records moved to limbo instead of freed.
    pub limbo: usize,
    /// Candidates returned to the active list.
    pub second_chance: usize,
    /// Usage when the pass finished.
    pub used_bytes: u64,
    pub elapsed: Duration,
}

/// Releases the collector claim when dropped, including on unwind.
struct CollectorClaim<'a> {
    cache: &'a Cache,
}

impl<'a> CollectorClaim<'a> {
    /// Claim the collector. `None` if a pass is already claimed.
    fn acquire(cache: &'a Cache) -> Option<Self> {
        if cache.collector_running.fetch_add(1, Ordering::AcqRel) == 0 {
            Some(Self { cache })
        } else {
            cache.collector_running.fetch_sub(1, Ordering::AcqRel);
            None
        }
    }
}

impl Drop for CollectorClaim<'_> {
    fn drop(&mut self) {
        self.cache.collector_running.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Records detached from `home` by the running pass.
///
/// Whatever is still held on drop goes back to `home` as a second chance, so
/// a pass that unwinds halfway leaves every record listed and accounted.
struct Detached<'a> {
    home: &'a RecordList,
    records: Vec<RecordPtr>,
}

impl Drop for Detached<'_> {
    fn drop(&mut self) {
        if self.records.is_empty() {
            return;
        }
        for &record in &self.records {
            // SAFETY: detached records are alive until reclaimed.
            unsafe { record.get() }.second_chance();
        }
        self.home.push_all(&self.records);
    }
}

impl Cache {
    /// Start a background pass unless one is already claimed.
    ///
    /// Never blocks the caller. If the thread cannot be spawned the claim is
    /// released and the next page fault over budget tries again.
    pub fn signal_collect(self: &Arc<Self>) {
        if self.collector_running.fetch_add(1, Ordering::AcqRel) != 0 {
            self.collector_running.fetch_sub(1, Ordering::AcqRel);
            return;
        }

        let cache = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(COLLECTOR_THREAD_NAME.into())
            .spawn(move || {
                let _claim = CollectorClaim { cache: &cache };
                if panic::catch_unwind(AssertUnwindSafe(|| cache.run_pass())).is_err() {
                    warn!("collection pass panicked; cache left consistent");
                }
            });

        if let Err(err) = spawned {
            self.collector_running.fetch_sub(1, Ordering::AcqRel);
            warn!(error = %err, "failed to spawn collector thread");
        }
    }

    /// Run one pass on the calling thread.
    ///
    /// Returns `None` without doing anything if another pass is claimed.
    pub fn collect(&self) -> Option<PassReport> {
        let _claim = CollectorClaim::acquire(self)?;
        Some(self.run_pass())
    }

    /// One full pass. The caller holds the collector claim.
    pub(crate) fn run_pass(&self) -> PassReport {
        let running = self.active_passes.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats
            .peak_concurrent_passes
            .fetch_max(u64::from(running), Ordering::Relaxed);

        let report = {
            let _gate = self.collector_gate.lock();
            self.run_pass_locked()
        };

        self.active_passes.fetch_sub(1, Ordering::SeqCst);
        self.stats.collection_passes.fetch_add(1, Ordering::Relaxed);

        debug!(
            floor = report.floor.0,
            candidates = report.candidates,
            evicted = report.evicted,
            reclaimed = report.reclaimed_bytes,
            limbo = report.limbo,
            second_chance = report.second_chance,
            used_bytes = report.used_bytes,
            elapsed_us = report.elapsed.as_micros() as u64,
            "collection pass"
        );

        report
    }

    fn run_pass_locked(&self) -> PassReport {
        let start = Instant::now();
        let floor = self.epochs.reclaim_floor();
        let mut report = PassReport {
            floor,
            ..PassReport::default()
        };

        let goal = self
            .used_bytes
            .load(Ordering::SeqCst)
            .saturating_sub(self.config.reclaim_target_bytes());

        if goal > 0 {
            let mut detached = self.detach_candidates(floor);
            report.candidates = detached.records.len();

            let candidates: Vec<Candidate<RecordPtr>> = detached
                .records
                .iter()
                .map(|&record| {
                    // SAFETY: detached records are alive until reclaimed.
                    let r = unsafe { record.get() };
                    Candidate {
                        item: record,
                        snapshot: r.version_snapshot(),
                        size: r.len() as u64,
                    }
                })
                .collect();

            let selection = select_victims(candidates, goal);
            report.evicted = selection.evict.len();
            report.second_chance = selection.retain.len();

            // Retained records go home now; only the victims stay detached.
            for &record in &selection.retain {
                // SAFETY: detached records are alive until reclaimed.
                unsafe { record.get() }.second_chance();
            }
            self.active.push_all(&selection.retain);
            detached.records = selection.evict;

            self.reclaim_victims(&mut detached, &mut report);
        }

        self.stats
            .pages_freed
            .fetch_add(report.freed as u64, Ordering::Relaxed);
        self.stats
            .bytes_reclaimed
            .fetch_add(report.reclaimed_bytes, Ordering::Relaxed);
        self.stats
            .limbo_moves
            .fetch_add(report.limbo as u64, Ordering::Relaxed);
        self.stats
            .second_chances
            .fetch_add(report.second_chance as u64, Ordering::Relaxed);

        report.used_bytes = self.used_bytes.load(Ordering::SeqCst);
        report.elapsed = start.elapsed();
        report
    }

    /// Phase 1: take both lists and detach every record older than `floor`.
    ///
    /// Limbo records are reconsidered first. Records at or above the floor
    /// go back to the list they came from.
    fn detach_candidates(&self, floor: Epoch) -> Detached<'_> {
        let mut detached = Detached {
            home: &self.active,
            records: Vec::new(),
        };

        for (list, records) in [
            (&self.limbo, self.limbo.take_all()),
            (&self.active, self.active.take_all()),
        ] {
            let mut stay = Vec::new();
            for record in records {
                // SAFETY: the collector owns taken records until it puts them
                // back or frees them.
                match unsafe { record.get() }.try_detach(floor) {
                    Some(_) => detached.records.push(record),
                    None => stay.push(record),
                }
            }
            list.push_all(&stay);
        }

        detached
    }

    /// Phase 3: unpublish each victim and free it, or park it in limbo if a
    /// reader touched it since detach.
    fn reclaim_victims(&self, victims: &mut Detached<'_>, report: &mut PassReport) {
        while let Some(record) = victims.records.pop() {
            // SAFETY: `record` is a Candidate of this pass and linked nowhere.
            match unsafe { record.reclaim() } {
                Reclaim::Freed(size) => {
                    let size = size as u64;
                    self.used_bytes.fetch_sub(size, Ordering::SeqCst);
                    report.freed += 1;
                    report.reclaimed_bytes += size;
                }
                Reclaim::Limbo(record) => {
                    self.limbo.push(record);
                    report.limbo += 1;
                }
            }
        }
    }
}
