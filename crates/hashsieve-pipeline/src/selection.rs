//! Selection and removal of completed records.

use std::cmp::Ordering;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use hashsieve_core::{Digest, FileRecord, PipelineError, RecordId};
use hashsieve_hash::DigestEngine;
use hashsieve_ops::{Deleter, DeletionReport, OperationError};

use crate::event::EventKind;
use crate::scheduler::{Pipeline, Shared};
use crate::state::PipelineState;

/// Column used to order a view of completed records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[derive(Display, EnumString, EnumIter, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum CompletedSort {
    #[default]
    Name,
    Path,
    Digest,
    Elapsed,
    Size,
}

/// Sort direction for [`Pipeline::completed_sorted`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[derive(Display, EnumString, EnumIter, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl CompletedSort {
    fn compare(self, a: &FileRecord, b: &FileRecord) -> Ordering {
        match self {
            Self::Name => a.display_name().cmp(b.display_name()),
            Self::Path => a.path().cmp(b.path()),
            Self::Digest => a.digest().cmp(&b.digest()),
            Self::Elapsed => a.elapsed().cmp(&b.elapsed()),
            Self::Size => a.size().cmp(&b.size()),
        }
    }
}

impl<E: DigestEngine> Pipeline<E> {
    /// Select or deselect a completed record.
    pub fn set_selected(&self, id: RecordId, selected: bool) -> Result<(), PipelineError> {
        let mut state = self.shared.lock();
        let index = state
            .completed_index(id)
            .ok_or(PipelineError::UnknownRecord { id })?;

        if state.completed[index].is_selected() != selected {
            state.completed[index].set_selected(selected);
            self.shared
                .emit(&state, EventKind::SelectionChanged { id, selected });
        }
        Ok(())
    }

    /// Select every member of each duplicate group except the first one
    /// to complete.
    ///
    /// Returns the number of records that were newly selected.
    pub fn select_duplicates(&self) -> usize {
        let mut state = self.shared.lock();

        let mut groups: IndexMap<Digest, Vec<usize>> = IndexMap::new();
        for (index, record) in state.completed.iter().enumerate() {
            if let Some(digest) = record.digest().filter(|d| !d.is_empty()) {
                groups.entry(digest.clone()).or_default().push(index);
            }
        }

        let mut newly_selected = Vec::new();
        for indices in groups.values().filter(|g| g.len() > 1) {
            for &index in &indices[1..] {
                let record = &mut state.completed[index];
                if !record.is_selected() {
                    record.set_selected(true);
                    newly_selected.push(record.id());
                }
            }
        }

        for &id in &newly_selected {
            self.shared.emit(
                &state,
                EventKind::SelectionChanged { id, selected: true },
            );
        }
        tracing::debug!(count = newly_selected.len(), "selected duplicates");
        newly_selected.len()
    }

    /// Deselect every completed record.
    pub fn clear_selection(&self) {
        let mut state = self.shared.lock();
        let mut cleared = Vec::new();
        for record in state.completed.iter_mut().filter(|r| r.is_selected()) {
            record.set_selected(false);
            cleared.push(record.id());
        }

        for id in cleared {
            self.shared.emit(
                &state,
                EventKind::SelectionChanged {
                    id,
                    selected: false,
                },
            );
        }
    }

    /// Ids of selected completed records, in completion order.
    pub fn selected(&self) -> Vec<RecordId> {
        self.shared
            .lock()
            .completed
            .iter()
            .filter(|r| r.is_selected())
            .map(FileRecord::id)
            .collect()
    }

    /// Drop selected records from Completed without touching storage.
    ///
    /// Returns the number of records removed.
    pub fn remove_selected(&self) -> usize {
        let mut state = self.shared.lock();
        let targets: Vec<RecordId> = state
            .completed
            .iter()
            .rev()
            .filter(|r| r.is_selected())
            .map(FileRecord::id)
            .collect();

        for &id in &targets {
            self.shared.remove_completed(&mut state, id);
        }
        targets.len()
    }

    /// Delete the files of selected records and drop them from Completed.
    ///
    /// Records are visited last to first. A record whose file could not be
    /// deleted stays in Completed, still selected, and the error is
    /// collected in the report.
    pub fn delete_selected(&self, deleter: &dyn Deleter) -> DeletionReport {
        let targets: Vec<(RecordId, FileRecord)> = {
            let state = self.shared.lock();
            state
                .completed
                .iter()
                .rev()
                .filter(|r| r.is_selected())
                .map(|r| (r.id(), r.clone()))
                .collect()
        };

        let mut report = DeletionReport::default();
        for (id, record) in targets {
            // Storage is slow; only hold the lock for the removal itself.
            match deleter.delete(record.path()) {
                Ok(()) => {
                    let mut state = self.shared.lock();
                    if self.shared.remove_completed(&mut state, id).is_some() {
                        report.record_deleted(record.path().to_path_buf(), record.size());
                    }
                }
                Err(e) => {
                    tracing::warn!(%id, path = %record.path().display(), "delete failed: {e}");
                    report.record_error(OperationError::new(
                        record.path().to_path_buf(),
                        e.to_string(),
                    ));
                }
            }
        }

        tracing::info!(
            deleted = report.deleted_count(),
            failed = report.failed_count(),
            bytes_freed = report.bytes_freed,
            "deleted selected files"
        );
        report
    }

    /// Sorted snapshot of Completed. The collection itself keeps
    /// completion order.
    pub fn completed_sorted(
        &self,
        sort: CompletedSort,
        direction: SortDirection,
    ) -> Vec<FileRecord> {
        let mut records = self.completed();
        records.sort_by(|a, b| {
            let ordering = sort.compare(a, b);
            match direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        });
        records
    }
}

impl<E: DigestEngine> Shared<E> {
    /// Remove a completed record and keep the grouping consistent.
    fn remove_completed(&self, state: &mut PipelineState, id: RecordId) -> Option<FileRecord> {
        let index = state.completed_index(id)?;
        let record = state.completed.remove(index);
        state.untrack(record.path());
        self.emit(state, EventKind::Removed { id });

        if let Some(digest) = record.digest() {
            let PipelineState {
                grouper, completed, ..
            } = &mut *state;
            if let Some(survivor) = grouper.on_removed(digest, completed) {
                self.emit(state, EventKind::MarkerCleared { id: survivor });
            }
        }
        Some(record)
    }
}
