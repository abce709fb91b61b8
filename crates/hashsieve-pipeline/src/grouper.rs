//! Duplicate group marker assignment.

use hashsieve_core::{Digest, FileRecord, GroupMarker, RecordId};

/// Outcome of grouping a newly completed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerAssignment {
    /// Marker now carried by the new record.
    pub marker: GroupMarker,
    /// Earlier record that received the marker at the same time, if the
    /// group was just formed.
    pub newly_marked: Option<RecordId>,
}

/// Tags completed records that share a digest.
///
/// Markers are handed out sequentially in completion order, so the same
/// sequence of completions always produces the same markers.
#[derive(Debug, Clone, Default)]
pub struct DuplicateGrouper {
    next_marker: u32,
}

impl DuplicateGrouper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group `record`, which has just completed, against `completed`.
    ///
    /// `record` must not be in `completed` yet. The first completed record
    /// with the same digest decides the marker: its existing marker is
    /// reused, or a fresh one is allocated for both.
    pub fn on_completed(
        &mut self,
        record: &mut FileRecord,
        completed: &mut [FileRecord],
    ) -> Option<MarkerAssignment> {
        let digest = record.digest().filter(|d| !d.is_empty())?.clone();
        let first = completed
            .iter_mut()
            .find(|r| r.digest() == Some(&digest))?;

        let assignment = match first.marker() {
            Some(marker) => MarkerAssignment {
                marker,
                newly_marked: None,
            },
            None => {
                let marker = self.allocate();
                first.set_marker(Some(marker));
                MarkerAssignment {
                    marker,
                    newly_marked: Some(first.id()),
                }
            }
        };

        record.set_marker(Some(assignment.marker));
        Some(assignment)
    }

    /// Clear the marker of a group that shrank to a single record after a
    /// member with `digest` was removed. Returns the survivor whose marker
    /// was cleared.
    pub fn on_removed(&self, digest: &Digest, completed: &mut [FileRecord]) -> Option<RecordId> {
        let mut members = completed.iter_mut().filter(|r| r.digest() == Some(digest));
        let survivor = members.next()?;
        if members.next().is_some() || survivor.marker().is_none() {
            return None;
        }

        survivor.set_marker(None);
        Some(survivor.id())
    }

    /// Number of markers allocated so far.
    pub fn markers_allocated(&self) -> u32 {
        self.next_marker
    }

    fn allocate(&mut self) -> GroupMarker {
        let marker = GroupMarker(self.next_marker);
        self.next_marker += 1;
        marker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashsieve_core::HashAlgorithm;
    use std::time::Duration;

    fn completed(id: u64, digest: &[u8]) -> FileRecord {
        let mut record = FileRecord::new(RecordId(id), format!("/f{id}"), 1);
        record.begin(HashAlgorithm::Md5);
        record.complete(Digest::from_bytes(digest), Duration::ZERO);
        record
    }

    /// Feed records through the grouper in order, like the coordinator does.
    fn run(grouper: &mut DuplicateGrouper, records: Vec<FileRecord>) -> Vec<FileRecord> {
        let mut done = Vec::new();
        for mut record in records {
            grouper.on_completed(&mut record, &mut done);
            done.push(record);
        }
        done
    }

    #[test]
    fn test_unique_digest_has_no_marker() {
        let mut grouper = DuplicateGrouper::new();
        let done = run(&mut grouper, vec![completed(0, &[1]), completed(1, &[2])]);
        assert!(done.iter().all(|r| r.marker().is_none()));
        assert_eq!(grouper.markers_allocated(), 0);
    }

    #[test]
    fn test_second_match_marks_both() {
        let mut grouper = DuplicateGrouper::new();
        let mut done = vec![completed(0, &[1])];
        let mut second = completed(1, &[1]);

        let assignment = grouper.on_completed(&mut second, &mut done).unwrap();
        assert_eq!(assignment.marker, GroupMarker(0));
        assert_eq!(assignment.newly_marked, Some(RecordId(0)));
        assert_eq!(done[0].marker(), Some(GroupMarker(0)));
        assert_eq!(second.marker(), Some(GroupMarker(0)));
    }

    #[test]
    fn test_third_member_reuses_marker() {
        let mut grouper = DuplicateGrouper::new();
        let done = run(
            &mut grouper,
            vec![completed(0, &[1]), completed(1, &[1]), completed(2, &[1])],
        );
        assert!(done.iter().all(|r| r.marker() == Some(GroupMarker(0))));
        assert_eq!(grouper.markers_allocated(), 1);
    }

    #[test]
    fn test_groups_get_distinct_markers() {
        let mut grouper = DuplicateGrouper::new();
        let done = run(
            &mut grouper,
            vec![
                completed(0, &[1]),
                completed(1, &[2]),
                completed(2, &[2]),
                completed(3, &[1]),
                completed(4, &[3]),
            ],
        );

        assert_eq!(done[1].marker(), Some(GroupMarker(0)));
        assert_eq!(done[2].marker(), Some(GroupMarker(0)));
        assert_eq!(done[0].marker(), Some(GroupMarker(1)));
        assert_eq!(done[3].marker(), Some(GroupMarker(1)));
        assert_eq!(done[4].marker(), None);
    }

    #[test]
    fn test_removal_clears_lone_survivor() {
        let mut grouper = DuplicateGrouper::new();
        let mut done = run(&mut grouper, vec![completed(0, &[1]), completed(1, &[1])]);

        let removed = done.remove(1);
        let digest = removed.digest().unwrap();
        assert_eq!(grouper.on_removed(digest, &mut done), Some(RecordId(0)));
        assert_eq!(done[0].marker(), None);
    }

    #[test]
    fn test_removal_keeps_marker_for_larger_group() {
        let mut grouper = DuplicateGrouper::new();
        let mut done = run(
            &mut grouper,
            vec![completed(0, &[1]), completed(1, &[1]), completed(2, &[1])],
        );

        let removed = done.remove(0);
        assert_eq!(grouper.on_removed(removed.digest().unwrap(), &mut done), None);
        assert!(done.iter().all(|r| r.marker() == Some(GroupMarker(0))));
    }
}
