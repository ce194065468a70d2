//! One upgrade run over a single playlist.
//!
//! The run optionally duplicates the playlist, reads the entries of the
//! playlist it works on, reconciles them and, unless it is a dry run, commits
//! the resulting delta in two batches.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::quality::{Comparator, QualityRequirements};
use crate::reconcile::{
    commit, AutomaticChooser, Chooser, CommitOutcome, PlaylistDelta, ReconcileMode,
    ReconcileReport, Reconciler,
};
use crate::service::{find_playlist, upgradeable_playlists, MediaCatalog, Playlist};

/// Everything a run decided and did
#[derive(Debug, Clone, Serialize)]
pub struct UpgradeOutcome {
    pub mode: ReconcileMode,
    /// The playlist the user selected
    pub source: Playlist,
    /// Title of the copy in duplicate mode, also when the dry run did not create it
    pub copy_title: Option<String>,
    /// The copy that was created
    pub copy: Option<Playlist>,
    pub report: ReconcileReport,
    pub delta: PlaylistDelta,
    /// `None` for dry runs
    pub commit: Option<CommitOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl UpgradeOutcome {
    /// The playlist the changes were written to
    pub fn target(&self) -> &Playlist {
        self.copy.as_ref().unwrap_or(&self.source)
    }

    pub fn is_committed(&self) -> bool {
        self.commit.as_ref().is_some_and(CommitOutcome::is_complete)
    }
}

pub struct Upgrader<'a, C: MediaCatalog + ?Sized> {
    catalog: &'a mut C,
    comparator: Comparator,
    requirements: QualityRequirements,
    copy_title_prefix: String,
}

impl<'a, C: MediaCatalog + ?Sized> Upgrader<'a, C> {
    pub fn new(catalog: &'a mut C, config: &Config) -> Self {
        Self::with_parts(
            catalog,
            config.comparator(),
            config.upgrade.requirements(),
            config.upgrade.copy_title_prefix.clone(),
        )
    }

    pub fn with_parts(
        catalog: &'a mut C,
        comparator: Comparator,
        requirements: QualityRequirements,
        copy_title_prefix: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            comparator,
            requirements,
            copy_title_prefix: copy_title_prefix.into(),
        }
    }

    pub fn copy_title(&self, playlist: &Playlist) -> String {
        format!("{}{}", self.copy_title_prefix, playlist.title)
    }

    /// Playlists that can be offered for upgrading
    pub async fn playlists(&mut self) -> Result<Vec<Playlist>> {
        let playlists = self.catalog.list_playlists().await?;
        Ok(upgradeable_playlists(playlists))
    }

    /// Look up an upgradeable playlist by exact title
    pub async fn playlist_by_title(&mut self, title: &str) -> Result<Playlist> {
        let playlists = self.playlists().await?;
        find_playlist(&playlists, title).cloned()
    }

    /// Run the upgrade on `playlist`.
    ///
    /// `chooser` is only consulted when `mode.simple_replacement` is off.
    /// A failed commit does not make this an error; it is recorded in the
    /// outcome together with what was applied.
    pub async fn upgrade_playlist(
        &mut self,
        playlist: &Playlist,
        mode: ReconcileMode,
        chooser: &mut dyn Chooser,
    ) -> Result<UpgradeOutcome> {
        let started_at = Utc::now();
        let copy_title = mode.duplicate.then(|| self.copy_title(playlist));

        let copy = match copy_title {
            Some(ref title) if !mode.dry_run => {
                Some(self.catalog.duplicate_playlist(playlist, title).await?)
            }
            Some(ref title) => {
                tracing::info!("Dry run: not creating \"{}\"", title);
                None
            }
            None => None,
        };
        let working = copy.as_ref().unwrap_or(playlist);

        let tracks = self.catalog.get_playlist_tracks(working).await?;
        tracing::info!("Upgrading \"{}\" ({} tracks)", working.title, tracks.len());

        let reconciler = Reconciler::new(&self.comparator, self.requirements);
        let (delta, report) = if mode.simple_replacement {
            reconciler
                .reconcile(&mut *self.catalog, working, &tracks, &mut AutomaticChooser)
                .await?
        } else {
            reconciler
                .reconcile(&mut *self.catalog, working, &tracks, chooser)
                .await?
        };

        let commit = if mode.dry_run {
            None
        } else {
            Some(commit(&mut *self.catalog, working, &delta).await)
        };

        Ok(UpgradeOutcome {
            mode,
            source: playlist.clone(),
            copy_title,
            copy,
            report,
            delta,
            commit,
            started_at,
            finished_at: Utc::now(),
        })
    }
}
