// Candidate matching: which library tracks count as "the same song" as a playlist entry

use serde::{Deserialize, Serialize};

use crate::service::{Track, TrackQuery};

/// How strictly candidates have to match the track they would replace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchOptions {
    /// Compare titles and artists case-sensitively
    pub case_sensitive: bool,
    /// Candidate artist must contain the current track's artist
    pub require_artist: bool,
    /// Drop punctuation from search queries
    pub strip_punctuation: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            require_artist: true,
            strip_punctuation: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrackMatcher {
    options: MatchOptions,
}

impl TrackMatcher {
    pub fn new(options: MatchOptions) -> Self {
        Self { options }
    }

    /// Build the catalog query used to discover alternatives for `track`
    pub fn query_for(&self, track: &Track) -> TrackQuery {
        let clean = |s: &str| {
            if self.options.strip_punctuation {
                strip_punctuation(s)
            } else {
                s.trim().to_string()
            }
        };

        let artist = if self.options.require_artist && !track.artist.trim().is_empty() {
            Some(clean(&track.artist))
        } else {
            None
        };

        TrackQuery {
            title: clean(&track.title),
            artist,
        }
    }

    pub fn titles_match(&self, a: &str, b: &str) -> bool {
        self.fold(a) == self.fold(b)
    }

    /// `candidate` is credited to (at least) the current artist
    pub fn artists_match(&self, current: &str, candidate: &str) -> bool {
        self.fold(candidate).contains(&self.fold(current))
    }

    /// Whether `candidate` is another version of `current`
    pub fn is_alternative(&self, current: &Track, candidate: &Track) -> bool {
        if candidate.id == current.id {
            return false;
        }
        if !self.titles_match(&current.title, &candidate.title) {
            return false;
        }
        !self.options.require_artist || self.artists_match(&current.artist, &candidate.artist)
    }

    fn fold(&self, s: &str) -> String {
        let trimmed = s.trim();
        if self.options.case_sensitive {
            trimmed.to_string()
        } else {
            trimmed.to_lowercase()
        }
    }
}

/// Keep word characters and whitespace only
pub fn strip_punctuation(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_string()
}
