//! Track quality comparison.
//!
//! Tracks are scored by format tier first (any lossless codec beats any lossy
//! one), then by a tier-specific tie-break, then by bitrate. Only strict
//! improvements count as upgrades.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::matching::TrackMatcher;
use crate::service::{AudioCodec, Track};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatTier {
    Lossy,
    Lossless,
}

/// Comparable quality of a single track.
///
/// Field order is the comparison order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QualityScore {
    pub tier: FormatTier,
    /// (bit depth, sample rate), zero unless resolution tie-breaking is enabled
    pub resolution: (u8, u32),
    pub bitrate_kbps: u32,
}

impl fmt::Display for QualityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tier = match self.tier {
            FormatTier::Lossy => "lossy",
            FormatTier::Lossless => "lossless",
        };
        write!(f, "{} {} kbps", tier, self.bitrate_kbps)?;
        if self.resolution != (0, 0) {
            write!(f, " {}bit/{}Hz", self.resolution.0, self.resolution.1)?;
        }
        Ok(())
    }
}

/// How two lossless tracks are ordered against each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LosslessTiebreak {
    #[default]
    Bitrate,
    /// Bit depth, then sample rate, then bitrate
    Resolution,
    /// All lossless tracks are equally good
    Equal,
}

/// Turns a track into a comparable score.
///
/// Returns `None` when the track lacks the information needed to score it.
pub trait QualityScorer: Send + Sync + fmt::Debug {
    fn score(&self, track: &Track) -> Option<QualityScore>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StandardScorer {
    pub lossless_tiebreak: LosslessTiebreak,
}

impl StandardScorer {
    pub fn new(lossless_tiebreak: LosslessTiebreak) -> Self {
        Self { lossless_tiebreak }
    }
}

impl QualityScorer for StandardScorer {
    fn score(&self, track: &Track) -> Option<QualityScore> {
        let codec = track.codec.as_ref()?;
        // A zero bitrate means the server never analyzed the file
        let bitrate_kbps = track.bitrate_kbps.filter(|b| *b > 0)?;

        if !codec.is_lossless() {
            return Some(QualityScore {
                tier: FormatTier::Lossy,
                resolution: (0, 0),
                bitrate_kbps,
            });
        }

        let score = match self.lossless_tiebreak {
            LosslessTiebreak::Bitrate => QualityScore {
                tier: FormatTier::Lossless,
                resolution: (0, 0),
                bitrate_kbps,
            },
            LosslessTiebreak::Resolution => QualityScore {
                tier: FormatTier::Lossless,
                resolution: (
                    track.bit_depth.unwrap_or(0),
                    track.sample_rate.unwrap_or(0),
                ),
                bitrate_kbps,
            },
            LosslessTiebreak::Equal => QualityScore {
                tier: FormatTier::Lossless,
                resolution: (0, 0),
                bitrate_kbps: 0,
            },
        };
        Some(score)
    }
}

/// Which tracks are worth searching alternatives for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradePolicy {
    /// Search every track
    #[default]
    All,
    /// Only low-bitrate mp3 and aac tracks
    BelowThreshold,
    /// Every track that isn't lossless
    Lossless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityRequirements {
    pub policy: UpgradePolicy,
    pub mp3_min_bitrate: u32,
    pub aac_min_bitrate: u32,
}

impl Default for QualityRequirements {
    fn default() -> Self {
        Self {
            policy: UpgradePolicy::All,
            mp3_min_bitrate: 320,
            aac_min_bitrate: 256,
        }
    }
}

impl QualityRequirements {
    /// The track is good enough and is not searched at all
    pub fn is_satisfied_by(&self, track: &Track) -> bool {
        match self.policy {
            UpgradePolicy::All => false,
            UpgradePolicy::Lossless => track.codec.as_ref().is_some_and(AudioCodec::is_lossless),
            UpgradePolicy::BelowThreshold => {
                let bitrate = track.bitrate_kbps.unwrap_or(0);
                !matches!(
                    track.codec,
                    Some(AudioCodec::Mp3) if bitrate < self.mp3_min_bitrate
                ) && !matches!(
                    track.codec,
                    Some(AudioCodec::Aac) if bitrate < self.aac_min_bitrate
                )
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub track: Track,
    pub score: QualityScore,
    /// Strictly better than the current track
    pub is_upgrade: bool,
}

/// Alternatives for one track, best first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ranking {
    pub current: QualityScore,
    pub candidates: Vec<RankedCandidate>,
}

impl Ranking {
    pub fn best_upgrade(&self) -> Option<&RankedCandidate> {
        self.candidates.first().filter(|c| c.is_upgrade)
    }

    pub fn has_upgrade(&self) -> bool {
        self.best_upgrade().is_some()
    }

    pub fn upgrades(&self) -> impl Iterator<Item = &RankedCandidate> {
        self.candidates.iter().filter(|c| c.is_upgrade)
    }
}

#[derive(Debug)]
pub struct Comparator {
    matcher: TrackMatcher,
    scorer: Box<dyn QualityScorer>,
}

impl Default for Comparator {
    fn default() -> Self {
        Self::new(TrackMatcher::default(), Box::new(StandardScorer::default()))
    }
}

impl Comparator {
    pub fn new(matcher: TrackMatcher, scorer: Box<dyn QualityScorer>) -> Self {
        Self { matcher, scorer }
    }

    pub fn matcher(&self) -> &TrackMatcher {
        &self.matcher
    }

    pub fn score(&self, track: &Track) -> Option<QualityScore> {
        self.scorer.score(track)
    }

    /// Compare two tracks by quality; `None` if either can't be scored
    pub fn compare(&self, a: &Track, b: &Track) -> Option<Ordering> {
        Some(self.score(a)?.cmp(&self.score(b)?))
    }

    /// Rank the alternatives to `current` among `candidates`.
    ///
    /// Candidates that aren't the same song or can't be scored are dropped.
    /// Returns `None` if `current` itself can't be scored.
    pub fn rank(&self, current: &Track, candidates: &[Track]) -> Option<Ranking> {
        let current_score = self.score(current)?;

        let mut ranked: Vec<RankedCandidate> = Vec::new();
        for candidate in candidates {
            if !self.matcher.is_alternative(current, candidate) {
                continue;
            }
            if ranked.iter().any(|r| r.track.id == candidate.id) {
                continue;
            }
            let Some(score) = self.score(candidate) else {
                tracing::debug!("Skipping candidate without quality info: {}", candidate);
                continue;
            };
            ranked.push(RankedCandidate {
                track: candidate.clone(),
                score,
                is_upgrade: score > current_score,
            });
        }

        ranked.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.track.artist.cmp(&b.track.artist))
                .then_with(|| a.track.id.cmp(&b.track.id))
        });

        Some(Ranking {
            current: current_score,
            candidates: ranked,
        })
    }
}
