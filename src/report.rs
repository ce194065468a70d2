use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::reconcile::{CommitOutcome, CommitStage, NotUpgradedReason, TrackReport, TrackStatus};
use crate::service::Track;
use crate::upgrade::UpgradeOutcome;

pub const MARK_OPTIMAL: &str = "✅";
pub const MARK_REPLACED: &str = "🆕";
pub const MARK_NOT_UPGRADED: &str = "❔";
pub const MARK_SKIPPED: &str = "⚠️";

pub fn marker(status: &TrackStatus) -> &'static str {
    match status {
        TrackStatus::AlreadyOptimal => MARK_OPTIMAL,
        TrackStatus::Replaced { .. } => MARK_REPLACED,
        TrackStatus::NeedsUpgrade { .. } => MARK_NOT_UPGRADED,
        TrackStatus::CannotEvaluate { .. } => MARK_SKIPPED,
    }
}

/// Human-readable rendering of an [`UpgradeOutcome`]
pub struct OutcomeReport<'a>(pub &'a UpgradeOutcome);

impl fmt::Display for OutcomeReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = self.0;
        let dry_run = outcome.mode.dry_run;

        write!(f, "Playlist \"{}\"", outcome.source.title)?;
        if let Some(ref title) = outcome.copy_title {
            if outcome.copy.is_some() {
                write!(f, " -> copy \"{}\"", title)?;
            } else {
                write!(f, " -> copy \"{}\" (not created)", title)?;
            }
        }
        if dry_run {
            write!(f, " [dry run]")?;
        }
        writeln!(f)?;

        for track in &outcome.report.tracks {
            write_track(f, track, dry_run)?;
        }

        writeln!(f)?;
        write_summary(f, outcome)?;

        match outcome.commit {
            Some(ref commit) => write_commit(f, &outcome.target().title, commit),
            None => writeln!(f, "Dry run: no changes were made."),
        }
    }
}

pub fn render(outcome: &UpgradeOutcome) -> String {
    OutcomeReport(outcome).to_string()
}

fn write_track(f: &mut fmt::Formatter<'_>, report: &TrackReport, dry_run: bool) -> fmt::Result {
    write!(
        f,
        "{} {:>3}. {}",
        marker(&report.status),
        report.position + 1,
        report.track
    )?;
    match &report.status {
        TrackStatus::AlreadyOptimal => writeln!(f),
        TrackStatus::Replaced {
            replacement,
            manual_override,
        } => {
            writeln!(f)?;
            let verb = if dry_run { "would be replaced by" } else { "replaced by" };
            write!(f, "        {} {}", verb, replacement)?;
            if *manual_override {
                write!(f, " (manual choice)")?;
            }
            writeln!(f)
        }
        TrackStatus::NeedsUpgrade { reason } => match reason {
            NotUpgradedReason::NoCandidates => writeln!(f, " (no better version found)"),
            NotUpgradedReason::Declined => writeln!(f, " (kept)"),
        },
        TrackStatus::CannotEvaluate { reason } => writeln!(f, " (skipped: {})", reason),
    }
}

fn write_tracks(f: &mut fmt::Formatter<'_>, heading: &str, prefix: &str, tracks: &[&Track]) -> fmt::Result {
    if tracks.is_empty() {
        return Ok(());
    }
    writeln!(f, "{} ({}):", heading, tracks.len())?;
    for track in tracks {
        writeln!(f, "  {} {}", prefix, track)?;
    }
    Ok(())
}

fn write_summary(f: &mut fmt::Formatter<'_>, outcome: &UpgradeOutcome) -> fmt::Result {
    let report = &outcome.report;
    let delta = &outcome.delta;

    writeln!(
        f,
        "{} tracks: {} already optimal, {} replaced, {} not upgraded, {} skipped",
        report.tracks.len(),
        report.already_optimal().count(),
        report.replaced().count(),
        report.not_upgraded().count(),
        report.skipped().count()
    )?;

    write_tracks(f, "Tracks to remove", "-", &delta.remove.iter().collect::<Vec<_>>())?;
    write_tracks(f, "Tracks to add", "+", &delta.add.iter().collect::<Vec<_>>())?;
    write_tracks(
        f,
        "Could not be upgraded",
        MARK_NOT_UPGRADED,
        &report.not_upgraded().map(|t| &t.track).collect::<Vec<_>>(),
    )?;
    write_tracks(
        f,
        "Skipped",
        MARK_SKIPPED,
        &report.skipped().map(|t| &t.track).collect::<Vec<_>>(),
    )
}

fn write_commit(f: &mut fmt::Formatter<'_>, target: &str, commit: &CommitOutcome) -> fmt::Result {
    let Some(ref failure) = commit.failure else {
        if commit.removed.is_empty() && commit.added.is_empty() {
            return writeln!(f, "Nothing to change in \"{}\".", target);
        }
        return writeln!(
            f,
            "Removed {} and added {} tracks in \"{}\".",
            commit.removed.len(),
            commit.added.len(),
            target
        );
    };

    let stage = match failure.stage {
        CommitStage::Remove => "Removing tracks from",
        CommitStage::Add => "Adding tracks to",
    };
    writeln!(f, "{} \"{}\" failed: {}", stage, target, failure.error)?;
    write_tracks(f, "Removed", "-", &commit.removed.iter().collect::<Vec<_>>())?;
    write_tracks(f, "Added", "+", &commit.added.iter().collect::<Vec<_>>())?;
    write_tracks(f, "Not removed", "-", &commit.pending_removals.iter().collect::<Vec<_>>())?;
    write_tracks(f, "Not added", "+", &commit.pending_additions.iter().collect::<Vec<_>>())?;
    writeln!(
        f,
        "The playlist is only partially upgraded; apply the remaining changes manually."
    )
}

/// Write the outcome as pretty-printed JSON
pub fn write_json(outcome: &UpgradeOutcome, path: &Path) -> Result<()> {
    let contents = serde_json::to_string_pretty(outcome).context("Failed to serialize report")?;
    fs::write(path, contents)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    Ok(())
}
