use serde::Serialize;

use super::PlaylistDelta;
use crate::service::{MediaCatalog, Playlist, Track};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStage {
    Remove,
    Add,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitFailure {
    pub stage: CommitStage,
    pub error: String,
}

/// What actually reached the server
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CommitOutcome {
    pub removed: Vec<Track>,
    pub added: Vec<Track>,
    /// Planned removals that were not applied
    pub pending_removals: Vec<Track>,
    /// Planned additions that were not applied
    pub pending_additions: Vec<Track>,
    pub failure: Option<CommitFailure>,
}

impl CommitOutcome {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    /// Some but not all changes were applied
    pub fn is_partial(&self) -> bool {
        self.failure.is_some() && (!self.removed.is_empty() || !self.added.is_empty())
    }
}

/// Split a batch at the number of tracks the server applied
fn split_applied(tracks: &[Track], applied: usize) -> (Vec<Track>, Vec<Track>) {
    let (done, pending) = tracks.split_at(applied.min(tracks.len()));
    (done.to_vec(), pending.to_vec())
}

/// Apply a delta: all removals first, then all additions.
///
/// Removing first keeps the original and replacement entries apart when they
/// share a title. Errors are captured in the outcome, split into the changes
/// the server applied before failing and the ones still pending.
pub async fn commit<C>(catalog: &mut C, playlist: &Playlist, delta: &PlaylistDelta) -> CommitOutcome
where
    C: MediaCatalog + ?Sized,
{
    let mut outcome = CommitOutcome::default();

    if !delta.remove.is_empty() {
        if let Err(e) = catalog.remove_tracks(playlist, &delta.remove).await {
            tracing::warn!("Removing tracks from \"{}\" failed: {}", playlist.title, e);
            let (removed, pending) = split_applied(&delta.remove, e.applied_changes());
            outcome.removed = removed;
            outcome.pending_removals = pending;
            outcome.pending_additions = delta.add.clone();
            outcome.failure = Some(CommitFailure {
                stage: CommitStage::Remove,
                error: e.to_string(),
            });
            return outcome;
        }
        outcome.removed = delta.remove.clone();
    }

    if !delta.add.is_empty() {
        if let Err(e) = catalog.add_tracks(playlist, &delta.add).await {
            tracing::warn!("Adding tracks to \"{}\" failed: {}", playlist.title, e);
            let (added, pending) = split_applied(&delta.add, e.applied_changes());
            outcome.added = added;
            outcome.pending_additions = pending;
            outcome.failure = Some(CommitFailure {
                stage: CommitStage::Add,
                error: e.to_string(),
            });
            return outcome;
        }
        outcome.added = delta.add.clone();
    }

    tracing::info!(
        "Committed {} removals and {} additions to \"{}\"",
        outcome.removed.len(),
        outcome.added.len(),
        playlist.title
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::memory::{track, MemoryCatalog, MutationCall};
    use crate::service::AudioCodec;

    /// Two replacements: 1 -> 10 and 2 -> 20
    async fn setup_two() -> (MemoryCatalog, Playlist, PlaylistDelta) {
        let mut catalog = MemoryCatalog::default().with_library(vec![
            track("10", "One", "Artist", AudioCodec::Flac, 900),
            track("20", "Two", "Artist", AudioCodec::Flac, 900),
        ]);
        let playlist = catalog.add_playlist(
            "Mix",
            vec![
                track("1", "One", "Artist", AudioCodec::Mp3, 128),
                track("2", "Two", "Artist", AudioCodec::Mp3, 128),
                track("3", "Three", "Artist", AudioCodec::Flac, 900),
            ],
        );
        let entries = catalog.get_playlist_tracks(&playlist).await.unwrap();
        let delta = PlaylistDelta {
            remove: entries[..2].to_vec(),
            add: vec![
                track("10", "One", "Artist", AudioCodec::Flac, 900),
                track("20", "Two", "Artist", AudioCodec::Flac, 900),
            ],
        };
        (catalog, playlist, delta)
    }

    fn ids(tracks: &[Track]) -> Vec<&str> {
        tracks.iter().map(|t| t.id.as_str()).collect()
    }

    async fn setup() -> (MemoryCatalog, Playlist, PlaylistDelta) {
        let mut catalog = MemoryCatalog::default()
            .with_library(vec![track("10", "Song", "Artist", AudioCodec::Flac, 900)]);
        let playlist = catalog.add_playlist(
            "Mix",
            vec![
                track("1", "Song", "Artist", AudioCodec::Mp3, 128),
                track("2", "Other", "Artist", AudioCodec::Flac, 900),
            ],
        );
        let entries = catalog.get_playlist_tracks(&playlist).await.unwrap();
        let delta = PlaylistDelta {
            remove: vec![entries[0].clone()],
            add: vec![track("10", "Song", "Artist", AudioCodec::Flac, 900)],
        };
        (catalog, playlist, delta)
    }

    #[tokio::test]
    async fn test_commit_removes_then_adds() {
        let (mut catalog, playlist, delta) = setup().await;

        let outcome = commit(&mut catalog, &playlist, &delta).await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.removed.len(), 1);
        assert_eq!(outcome.added.len(), 1);
        assert_eq!(catalog.entry_ids(&playlist), vec!["2", "10"]);
        assert!(matches!(catalog.calls[0], MutationCall::Remove { .. }));
        assert!(matches!(catalog.calls[1], MutationCall::Add { .. }));
    }

    #[tokio::test]
    async fn test_commit_empty_delta_makes_no_calls() {
        let (mut catalog, playlist, _) = setup().await;

        let outcome = commit(&mut catalog, &playlist, &PlaylistDelta::default()).await;

        assert!(outcome.is_complete());
        assert!(catalog.calls.is_empty());
    }

    #[tokio::test]
    async fn test_remove_failure_applies_nothing() {
        let (mut catalog, playlist, delta) = setup().await;
        catalog.fail_remove = true;

        let outcome = commit(&mut catalog, &playlist, &delta).await;

        assert_eq!(outcome.failure.as_ref().unwrap().stage, CommitStage::Remove);
        assert!(!outcome.is_partial());
        assert!(outcome.removed.is_empty());
        assert_eq!(outcome.pending_removals.len(), 1);
        assert_eq!(outcome.pending_additions.len(), 1);
        // Additions are never attempted after a failed removal
        assert_eq!(catalog.calls.len(), 1);
    }

    #[tokio::test]
    async fn test_add_failure_after_removal_is_partial() {
        let (mut catalog, playlist, delta) = setup().await;
        catalog.fail_add = true;

        let outcome = commit(&mut catalog, &playlist, &delta).await;

        assert!(outcome.is_partial());
        assert_eq!(outcome.failure.as_ref().unwrap().stage, CommitStage::Add);
        assert_eq!(outcome.removed[0].id, "1");
        assert!(outcome.added.is_empty());
        assert_eq!(outcome.pending_additions[0].id, "10");
        assert_eq!(catalog.entry_ids(&playlist), vec!["2"]);
    }

    #[tokio::test]
    async fn test_removal_failing_midway_reports_applied_prefix() {
        let (mut catalog, playlist, delta) = setup_two().await;
        catalog.fail_remove_after = Some(1);

        let outcome = commit(&mut catalog, &playlist, &delta).await;

        assert_eq!(catalog.entry_ids(&playlist), vec!["2", "3"]);
        assert_eq!(ids(&outcome.removed), vec!["1"]);
        assert_eq!(ids(&outcome.pending_removals), vec!["2"]);
        assert_eq!(ids(&outcome.pending_additions), vec!["10", "20"]);
        assert!(outcome.added.is_empty());
        assert!(outcome.is_partial());
        assert_eq!(outcome.failure.as_ref().unwrap().stage, CommitStage::Remove);
    }

    #[tokio::test]
    async fn test_addition_failing_midway_reports_applied_prefix() {
        let (mut catalog, playlist, delta) = setup_two().await;
        catalog.fail_add_after = Some(1);

        let outcome = commit(&mut catalog, &playlist, &delta).await;

        assert_eq!(catalog.entry_ids(&playlist), vec!["3", "10"]);
        assert_eq!(ids(&outcome.removed), vec!["1", "2"]);
        assert_eq!(ids(&outcome.added), vec!["10"]);
        assert_eq!(ids(&outcome.pending_additions), vec!["20"]);
        assert!(outcome.pending_removals.is_empty());
        assert!(outcome.is_partial());
    }

    #[test]
    fn test_split_applied_clamps_to_batch() {
        let tracks = vec![track("1", "One", "Artist", AudioCodec::Mp3, 128)];
        let (done, pending) = split_applied(&tracks, 5);
        assert_eq!(done.len(), 1);
        assert!(pending.is_empty());
    }
}
