//! Playlist reconciliation.
//!
//! Every playlist entry is evaluated in order: its alternatives are searched
//! in the catalog, ranked, and handed to a [`Chooser`]. Decisions only
//! accumulate into a [`PlaylistDelta`]; nothing is written here.

pub mod chooser;
pub mod commit;

use serde::{Deserialize, Serialize};

pub use chooser::{AutomaticChooser, ChannelChooser, Choice, ChoiceRequest, Chooser, PendingChoice};
pub use commit::{commit, CommitFailure, CommitOutcome, CommitStage};

use crate::error::Result;
use crate::quality::{Comparator, QualityRequirements, QualityScore, UpgradePolicy};
use crate::service::{MediaCatalog, Playlist, Track};

/// Toggles for a single upgrade run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReconcileMode {
    /// Evaluate and report only, never write
    pub dry_run: bool,
    /// Take the best upgrade automatically instead of asking
    pub simple_replacement: bool,
    /// Work on a copy of the playlist
    pub duplicate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotUpgradedReason {
    /// No better version exists in the library
    NoCandidates,
    /// A better version exists but was not picked
    Declined,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrackStatus {
    AlreadyOptimal,
    /// Falls short of the quality requirements but stays as is
    NeedsUpgrade { reason: NotUpgradedReason },
    Replaced {
        replacement: Track,
        /// The replacement is not strictly better; a human picked it anyway
        manual_override: bool,
    },
    CannotEvaluate { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackReport {
    pub position: usize,
    pub track: Track,
    pub current_score: Option<QualityScore>,
    pub status: TrackStatus,
}

/// The outcome for one playlist entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplacementDecision {
    pub original: Track,
    pub replacement: Option<Track>,
}

/// Pending playlist changes.
///
/// Replacements are always a removal of the original entry plus an addition of
/// the replacement, so both lists have the same length.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PlaylistDelta {
    pub remove: Vec<Track>,
    pub add: Vec<Track>,
}

impl PlaylistDelta {
    pub fn record(&mut self, decision: &ReplacementDecision) {
        if let Some(replacement) = &decision.replacement {
            self.remove.push(decision.original.clone());
            self.add.push(replacement.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty()
    }

    /// Number of replacements
    pub fn len(&self) -> usize {
        self.remove.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// The playlist the tracks were read from
    pub playlist: Playlist,
    pub tracks: Vec<TrackReport>,
}

impl ReconcileReport {
    pub fn decisions(&self) -> Vec<ReplacementDecision> {
        self.tracks
            .iter()
            .map(|t| ReplacementDecision {
                original: t.track.clone(),
                replacement: match &t.status {
                    TrackStatus::Replaced { replacement, .. } => Some(replacement.clone()),
                    _ => None,
                },
            })
            .collect()
    }

    pub fn already_optimal(&self) -> impl Iterator<Item = &TrackReport> {
        self.tracks
            .iter()
            .filter(|t| matches!(t.status, TrackStatus::AlreadyOptimal))
    }

    pub fn replaced(&self) -> impl Iterator<Item = &TrackReport> {
        self.tracks
            .iter()
            .filter(|t| matches!(t.status, TrackStatus::Replaced { .. }))
    }

    /// Entries that should be upgraded but were not
    pub fn not_upgraded(&self) -> impl Iterator<Item = &TrackReport> {
        self.tracks
            .iter()
            .filter(|t| matches!(t.status, TrackStatus::NeedsUpgrade { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &TrackReport> {
        self.tracks
            .iter()
            .filter(|t| matches!(t.status, TrackStatus::CannotEvaluate { .. }))
    }
}

pub struct Reconciler<'a> {
    comparator: &'a Comparator,
    requirements: QualityRequirements,
}

impl<'a> Reconciler<'a> {
    pub fn new(comparator: &'a Comparator, requirements: QualityRequirements) -> Self {
        Self {
            comparator,
            requirements,
        }
    }

    /// Decide the fate of every entry in `tracks`.
    ///
    /// Search failures only skip the affected track. Chooser failures and
    /// non-recoverable catalog errors abort the run before anything is written.
    pub async fn reconcile<C>(
        &self,
        catalog: &mut C,
        playlist: &Playlist,
        tracks: &[Track],
        chooser: &mut dyn Chooser,
    ) -> Result<(PlaylistDelta, ReconcileReport)>
    where
        C: MediaCatalog + ?Sized,
    {
        let mut delta = PlaylistDelta::default();
        let mut reports = Vec::with_capacity(tracks.len());

        for (position, track) in tracks.iter().enumerate() {
            let current_score = self.comparator.score(track);
            let status = self
                .evaluate(catalog, position, track, current_score, chooser)
                .await?;

            let decision = ReplacementDecision {
                original: track.clone(),
                replacement: match &status {
                    TrackStatus::Replaced { replacement, .. } => Some(replacement.clone()),
                    _ => None,
                },
            };
            delta.record(&decision);

            reports.push(TrackReport {
                position,
                track: track.clone(),
                current_score,
                status,
            });
        }

        tracing::info!(
            "Evaluated {} tracks of \"{}\": {} replacements",
            tracks.len(),
            playlist.title,
            delta.len()
        );

        let report = ReconcileReport {
            playlist: playlist.clone(),
            tracks: reports,
        };
        Ok((delta, report))
    }

    async fn evaluate<C>(
        &self,
        catalog: &mut C,
        position: usize,
        track: &Track,
        current_score: Option<QualityScore>,
        chooser: &mut dyn Chooser,
    ) -> Result<TrackStatus>
    where
        C: MediaCatalog + ?Sized,
    {
        if current_score.is_none() {
            return Ok(TrackStatus::CannotEvaluate {
                reason: "codec or bitrate unknown".to_string(),
            });
        }

        if self.requirements.is_satisfied_by(track) {
            return Ok(TrackStatus::AlreadyOptimal);
        }

        let query = self.comparator.matcher().query_for(track);
        let candidates = match catalog.search_tracks(&query).await {
            Ok(candidates) => candidates,
            Err(e) if e.is_recoverable() => {
                tracing::warn!("Skipping {}: {}", track, e);
                return Ok(TrackStatus::CannotEvaluate {
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        let Some(ranking) = self.comparator.rank(track, &candidates) else {
            return Ok(TrackStatus::CannotEvaluate {
                reason: "codec or bitrate unknown".to_string(),
            });
        };
        tracing::debug!(
            "{}: {} alternatives, {} upgrades",
            track,
            ranking.candidates.len(),
            ranking.upgrades().count()
        );

        if !ranking.has_upgrade() {
            return Ok(match self.requirements.policy {
                UpgradePolicy::All => TrackStatus::AlreadyOptimal,
                _ => TrackStatus::NeedsUpgrade {
                    reason: NotUpgradedReason::NoCandidates,
                },
            });
        }

        let request = ChoiceRequest {
            position,
            current: track.clone(),
            ranking,
        };
        let status = match chooser.choose(&request).await? {
            Choice::Keep => TrackStatus::NeedsUpgrade {
                reason: NotUpgradedReason::Declined,
            },
            Choice::Replace(index) => match request.ranking.candidates.get(index) {
                Some(candidate) => TrackStatus::Replaced {
                    replacement: candidate.track.clone(),
                    manual_override: !candidate.is_upgrade,
                },
                None => {
                    tracing::warn!("Ignoring out-of-range choice {} for {}", index, track);
                    TrackStatus::NeedsUpgrade {
                        reason: NotUpgradedReason::Declined,
                    }
                }
            },
        };
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::memory::{track, MemoryCatalog};
    use crate::service::AudioCodec;

    /// Answers every request with a fixed choice and counts requests
    struct FixedChooser {
        choice: Choice,
        asked: usize,
    }

    #[async_trait::async_trait]
    impl Chooser for FixedChooser {
        async fn choose(&mut self, _request: &ChoiceRequest) -> Result<Choice> {
            self.asked += 1;
            Ok(self.choice)
        }
    }

    async fn run(
        catalog: &mut MemoryCatalog,
        playlist: &Playlist,
        requirements: QualityRequirements,
        chooser: &mut dyn Chooser,
    ) -> (PlaylistDelta, ReconcileReport) {
        let comparator = Comparator::default();
        let tracks = catalog.get_playlist_tracks(playlist).await.unwrap();
        Reconciler::new(&comparator, requirements)
            .reconcile(catalog, playlist, &tracks, chooser)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_simple_mode_picks_lossless() {
        let mut catalog = MemoryCatalog::default().with_library(vec![
            track("10", "Song", "Artist", AudioCodec::Flac, 952),
            track("11", "Song", "Artist", AudioCodec::Mp3, 320),
        ]);
        let playlist = catalog.add_playlist(
            "Mix",
            vec![track("1", "Song", "Artist", AudioCodec::Mp3, 160)],
        );

        let (delta, report) = run(
            &mut catalog,
            &playlist,
            QualityRequirements::default(),
            &mut AutomaticChooser,
        )
        .await;

        assert_eq!(delta.len(), 1);
        assert_eq!(delta.remove[0].id, "1");
        assert_eq!(delta.add[0].id, "10");
        assert!(matches!(
            &report.tracks[0].status,
            TrackStatus::Replaced { replacement, manual_override: false } if replacement.id == "10"
        ));
    }

    #[tokio::test]
    async fn test_no_downgrade_for_lossless_track() {
        let mut catalog = MemoryCatalog::default()
            .with_library(vec![track("10", "Song", "Artist", AudioCodec::Mp3, 320)]);
        let playlist = catalog.add_playlist(
            "Mix",
            vec![track("1", "Song", "Artist", AudioCodec::Flac, 900)],
        );

        let (delta, report) = run(
            &mut catalog,
            &playlist,
            QualityRequirements::default(),
            &mut AutomaticChooser,
        )
        .await;

        assert!(delta.is_empty());
        assert_eq!(report.tracks[0].status, TrackStatus::AlreadyOptimal);
    }

    #[tokio::test]
    async fn test_empty_candidates_keep_track() {
        let mut catalog = MemoryCatalog::default();
        let playlist = catalog.add_playlist(
            "Mix",
            vec![track("1", "Rare Song", "Artist", AudioCodec::Mp3, 128)],
        );

        let (delta, report) = run(
            &mut catalog,
            &playlist,
            QualityRequirements::default(),
            &mut AutomaticChooser,
        )
        .await;

        assert!(delta.is_empty());
        assert_eq!(report.tracks[0].status, TrackStatus::AlreadyOptimal);
    }

    #[tokio::test]
    async fn test_threshold_policy_reports_needs_upgrade() {
        let mut catalog = MemoryCatalog::default();
        let playlist = catalog.add_playlist(
            "Mix",
            vec![
                track("1", "Rare Song", "Artist", AudioCodec::Mp3, 128),
                track("2", "Good Song", "Artist", AudioCodec::Mp3, 320),
            ],
        );
        let requirements = QualityRequirements {
            policy: UpgradePolicy::BelowThreshold,
            ..QualityRequirements::default()
        };

        let (delta, report) = run(&mut catalog, &playlist, requirements, &mut AutomaticChooser).await;

        assert!(delta.is_empty());
        assert_eq!(
            report.tracks[0].status,
            TrackStatus::NeedsUpgrade {
                reason: NotUpgradedReason::NoCandidates
            }
        );
        assert_eq!(report.tracks[1].status, TrackStatus::AlreadyOptimal);
        // Only the low bitrate track was searched
        assert_eq!(catalog.search_count, 1);
    }

    #[tokio::test]
    async fn test_search_failure_skips_track_and_continues() {
        let mut catalog = MemoryCatalog::default()
            .with_library(vec![track("10", "Second", "Artist", AudioCodec::Flac, 900)]);
        let playlist = catalog.add_playlist(
            "Mix",
            vec![
                track("1", "First", "Artist", AudioCodec::Mp3, 128),
                track("2", "Second", "Artist", AudioCodec::Mp3, 128),
            ],
        );
        catalog.failing_searches.insert("First".to_string());

        let (delta, report) = run(
            &mut catalog,
            &playlist,
            QualityRequirements::default(),
            &mut AutomaticChooser,
        )
        .await;

        assert!(matches!(
            report.tracks[0].status,
            TrackStatus::CannotEvaluate { .. }
        ));
        assert_eq!(report.skipped().count(), 1);
        assert_eq!(delta.len(), 1);
        assert_eq!(delta.remove[0].id, "2");
        assert!(delta.remove.iter().all(|t| t.id != "1"));
    }

    #[tokio::test]
    async fn test_missing_bitrate_cannot_be_evaluated() {
        let mut unknown = track("1", "Song", "Artist", AudioCodec::Mp3, 128);
        unknown.bitrate_kbps = None;
        let mut catalog = MemoryCatalog::default()
            .with_library(vec![track("10", "Song", "Artist", AudioCodec::Flac, 900)]);
        let playlist = catalog.add_playlist("Mix", vec![unknown]);

        let (delta, report) = run(
            &mut catalog,
            &playlist,
            QualityRequirements::default(),
            &mut AutomaticChooser,
        )
        .await;

        assert!(delta.is_empty());
        assert!(matches!(
            report.tracks[0].status,
            TrackStatus::CannotEvaluate { .. }
        ));
        assert_eq!(catalog.search_count, 0);
    }

    #[tokio::test]
    async fn test_declined_choice_is_reported() {
        let mut catalog = MemoryCatalog::default()
            .with_library(vec![track("10", "Song", "Artist", AudioCodec::Flac, 900)]);
        let playlist = catalog.add_playlist(
            "Mix",
            vec![track("1", "Song", "Artist", AudioCodec::Mp3, 128)],
        );
        let mut chooser = FixedChooser {
            choice: Choice::Keep,
            asked: 0,
        };

        let (delta, report) = run(
            &mut catalog,
            &playlist,
            QualityRequirements::default(),
            &mut chooser,
        )
        .await;

        assert_eq!(chooser.asked, 1);
        assert!(delta.is_empty());
        assert_eq!(report.not_upgraded().count(), 1);
    }

    #[tokio::test]
    async fn test_chooser_not_asked_without_upgrade() {
        let mut catalog = MemoryCatalog::default()
            .with_library(vec![track("10", "Song", "Artist", AudioCodec::Mp3, 320)]);
        let playlist = catalog.add_playlist(
            "Mix",
            vec![track("1", "Song", "Artist", AudioCodec::Mp3, 320)],
        );
        let mut chooser = FixedChooser {
            choice: Choice::Replace(0),
            asked: 0,
        };

        let (delta, _) = run(
            &mut catalog,
            &playlist,
            QualityRequirements::default(),
            &mut chooser,
        )
        .await;

        assert_eq!(chooser.asked, 0);
        assert!(delta.is_empty());
    }

    #[tokio::test]
    async fn test_manual_override_to_equal_quality() {
        let mut catalog = MemoryCatalog::default().with_library(vec![
            track("10", "Song", "Artist", AudioCodec::Flac, 900),
            track("11", "Song", "Artist", AudioCodec::Mp3, 128),
        ]);
        let playlist = catalog.add_playlist(
            "Mix",
            vec![track("1", "Song", "Artist", AudioCodec::Mp3, 128)],
        );
        // Index 1 is the equal-quality mp3
        let mut chooser = FixedChooser {
            choice: Choice::Replace(1),
            asked: 0,
        };

        let (delta, report) = run(
            &mut catalog,
            &playlist,
            QualityRequirements::default(),
            &mut chooser,
        )
        .await;

        assert_eq!(delta.add[0].id, "11");
        assert!(matches!(
            report.tracks[0].status,
            TrackStatus::Replaced {
                manual_override: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_out_of_range_choice_keeps_track() {
        let mut catalog = MemoryCatalog::default()
            .with_library(vec![track("10", "Song", "Artist", AudioCodec::Flac, 900)]);
        let playlist = catalog.add_playlist(
            "Mix",
            vec![track("1", "Song", "Artist", AudioCodec::Mp3, 128)],
        );
        let mut chooser = FixedChooser {
            choice: Choice::Replace(7),
            asked: 0,
        };

        let (delta, report) = run(
            &mut catalog,
            &playlist,
            QualityRequirements::default(),
            &mut chooser,
        )
        .await;

        assert!(delta.is_empty());
        assert_eq!(
            report.tracks[0].status,
            TrackStatus::NeedsUpgrade {
                reason: NotUpgradedReason::Declined
            }
        );
    }

    #[tokio::test]
    async fn test_decisions_match_delta() {
        let mut catalog = MemoryCatalog::default()
            .with_library(vec![track("10", "One", "Artist", AudioCodec::Flac, 900)]);
        let playlist = catalog.add_playlist(
            "Mix",
            vec![
                track("1", "One", "Artist", AudioCodec::Mp3, 128),
                track("2", "Two", "Artist", AudioCodec::Mp3, 128),
            ],
        );

        let (delta, report) = run(
            &mut catalog,
            &playlist,
            QualityRequirements::default(),
            &mut AutomaticChooser,
        )
        .await;

        let mut rebuilt = PlaylistDelta::default();
        for decision in report.decisions() {
            rebuilt.record(&decision);
        }
        assert_eq!(rebuilt, delta);
        assert_eq!(report.replaced().count(), 1);
        assert_eq!(report.already_optimal().count(), 1);
    }

    #[tokio::test]
    async fn test_revoked_token_aborts_run() {
        let mut catalog = MemoryCatalog::default()
            .with_library(vec![track("10", "Song", "Artist", AudioCodec::Flac, 900)]);
        let playlist = catalog.add_playlist(
            "Mix",
            vec![
                track("1", "Song", "Artist", AudioCodec::Mp3, 128),
                track("2", "Other", "Artist", AudioCodec::Mp3, 128),
            ],
        );
        catalog.revoked = true;

        let comparator = Comparator::default();
        let tracks = catalog.get_playlist_tracks(&playlist).await.unwrap();
        let result = Reconciler::new(&comparator, QualityRequirements::default())
            .reconcile(&mut catalog, &playlist, &tracks, &mut AutomaticChooser)
            .await;

        assert!(matches!(
            result,
            Err(crate::error::Error::Auth(crate::error::AuthFailure::InvalidToken))
        ));
        // The run stops at the first track
        assert_eq!(catalog.search_count, 1);
    }
}
