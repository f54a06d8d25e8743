// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use syncdash_app::{CollectionKind, Stats, Store};
use time::OffsetDateTime;

use crate::{LoadOutcome, Slice, SliceWatch, SyncRuntime, report_stats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardSummary {
    pub stats: Stats,
    pub last_sync_time: Option<OffsetDateTime>,
    /// False while server-reported counts are ahead of the cached
    /// collections.
    pub stats_are_derived: bool,
    pub loading: bool,
}

/// Headline counts plus the explicit full-sync action.
#[derive(Debug)]
pub struct DashboardView {
    store: Store,
    watch: SliceWatch,
    last_error: Option<String>,
}

impl DashboardView {
    pub fn new(store: Store) -> Self {
        let watch = SliceWatch::new(&store, Slice::Stats);
        Self {
            store,
            watch,
            last_error: None,
        }
    }

    pub fn summary(&self) -> DashboardSummary {
        let snapshot = self.store.current_snapshot();
        DashboardSummary {
            stats: snapshot.stats,
            last_sync_time: snapshot.last_sync_time,
            stats_are_derived: snapshot.stats_are_derived(),
            loading: snapshot.loading.any(),
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn take_changed(&mut self) -> bool {
        self.watch.take_changed()
    }

    /// Pulls server-side totals as a stats override.
    pub fn refresh_stats<R: SyncRuntime + ?Sized>(&mut self, runtime: &mut R) -> LoadOutcome {
        match runtime.load_stats() {
            Ok(patch) => {
                self.store.update_stats(patch);
                self.last_error = None;
                LoadOutcome::Applied(1)
            }
            Err(error) => self.fail("stats refresh", error),
        }
    }

    /// Runs a full server-side sync, records its counts and time, then
    /// reloads the project list. Returns the number of projects loaded.
    ///
    /// Recording the sync time makes every grid binding on this store drop
    /// its cursors and restart from the first block.
    pub fn sync<R: SyncRuntime + ?Sized>(
        &mut self,
        runtime: &mut R,
        now: OffsetDateTime,
    ) -> LoadOutcome {
        let report = match runtime.sync_all() {
            Ok(report) => report,
            Err(error) => return self.fail("sync", error),
        };
        log::info!(
            "sync finished: {} projects, {} tables, {} tickets, {} users",
            report.bases,
            report.tables,
            report.tickets,
            report.users
        );
        self.store.update_stats(report_stats(&report));
        self.store.set_sync_time(now);

        self.store.begin_load(CollectionKind::Projects);
        let outcome = match runtime.load_projects() {
            Ok(projects) => {
                let received = projects.len();
                self.store.set_projects(projects);
                self.last_error = None;
                LoadOutcome::Applied(received)
            }
            Err(error) => self.fail("project refresh after sync", error),
        };
        self.store.finish_load(CollectionKind::Projects);
        outcome
    }

    fn fail(&mut self, what: &str, error: anyhow::Error) -> LoadOutcome {
        let error = error.context(format!("{what} failed"));
        log::warn!("{error:#}");
        let outcome = LoadOutcome::failed(&error);
        self.last_error = outcome.failure().map(str::to_owned);
        outcome
    }
}
