pub mod account;
#[cfg(test)]
pub(crate) mod memory;
pub mod plex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Audio codec tag as reported by the media server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Flac,
    Alac,
    Wav,
    Aiff,
    Ape,
    WavPack,
    Dsd,
    Mp3,
    Aac,
    Vorbis,
    Opus,
    Wma,
    Other(String),
}

impl AudioCodec {
    pub fn is_lossless(&self) -> bool {
        matches!(
            self,
            AudioCodec::Flac
                | AudioCodec::Alac
                | AudioCodec::Wav
                | AudioCodec::Aiff
                | AudioCodec::Ape
                | AudioCodec::WavPack
                | AudioCodec::Dsd
        )
    }
}

impl std::fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioCodec::Flac => write!(f, "flac"),
            AudioCodec::Alac => write!(f, "alac"),
            AudioCodec::Wav => write!(f, "wav"),
            AudioCodec::Aiff => write!(f, "aiff"),
            AudioCodec::Ape => write!(f, "ape"),
            AudioCodec::WavPack => write!(f, "wavpack"),
            AudioCodec::Dsd => write!(f, "dsd"),
            AudioCodec::Mp3 => write!(f, "mp3"),
            AudioCodec::Aac => write!(f, "aac"),
            AudioCodec::Vorbis => write!(f, "vorbis"),
            AudioCodec::Opus => write!(f, "opus"),
            AudioCodec::Wma => write!(f, "wma"),
            AudioCodec::Other(tag) => write!(f, "{}", tag),
        }
    }
}

impl std::str::FromStr for AudioCodec {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_lowercase();
        Ok(match tag.as_str() {
            "flac" => AudioCodec::Flac,
            "alac" => AudioCodec::Alac,
            "wav" | "pcm" | "lpcm" => AudioCodec::Wav,
            "aiff" | "aif" => AudioCodec::Aiff,
            "ape" => AudioCodec::Ape,
            "wv" | "wavpack" => AudioCodec::WavPack,
            "dsd" | "dsf" | "dff" | "dsd_lsbf" | "dsd_msbf" => AudioCodec::Dsd,
            "mp3" | "mpeg" => AudioCodec::Mp3,
            "aac" | "he-aac" | "m4a" => AudioCodec::Aac,
            "vorbis" | "ogg" => AudioCodec::Vorbis,
            "opus" => AudioCodec::Opus,
            "wma" | "wmav2" | "wmapro" => AudioCodec::Wma,
            _ => AudioCodec::Other(tag),
        })
    }
}

/// A track snapshot taken from the catalog during a single run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Catalog id (Plex rating key)
    pub id: String,
    pub title: String,
    /// Track artist, falling back to the album artist
    pub artist: String,
    pub album: String,
    pub duration_ms: u64,
    pub codec: Option<AudioCodec>,
    pub bitrate_kbps: Option<u32>,
    pub bit_depth: Option<u8>,
    pub sample_rate: Option<u32>,
    /// Identifies this entry inside its parent playlist; required for removal
    pub playlist_item_id: Option<String>,
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let seconds = self.duration_ms / 1000;
        write!(
            f,
            "{} - {} ({}) [{:02}:{:02}]",
            self.artist,
            self.title,
            self.album,
            seconds / 60,
            seconds % 60
        )?;
        match &self.codec {
            Some(codec) => write!(f, "[{}]", codec)?,
            None => write!(f, "[?]")?,
        }
        match self.bitrate_kbps {
            Some(bitrate) => write!(f, "[{}]", bitrate),
            None => write!(f, "[?]"),
        }
    }
}

/// A playlist on the media server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub title: String,
    pub summary: Option<String>,
    pub num_tracks: usize,
    pub smart: bool,
    /// "audio", "video" or "photo"
    pub playlist_type: String,
}

impl Playlist {
    /// Smart playlists are computed by the server and must not be edited
    pub fn is_upgradeable(&self) -> bool {
        !self.smart && self.playlist_type == "audio"
    }
}

/// Candidate discovery query for one track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackQuery {
    pub title: String,
    pub artist: Option<String>,
}

impl std::fmt::Display for TrackQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.artist {
            Some(artist) => write!(f, "{} - {}", artist, self.title),
            None => write!(f, "{}", self.title),
        }
    }
}

/// Library and playlist operations the upgrade run depends on.
///
/// Playlist mutations are positionless: tracks are appended by catalog id and
/// removed by playlist entry, there is no in-place replacement.
#[async_trait]
pub trait MediaCatalog: Send {
    /// All playlists on the server, including ones that cannot be upgraded
    async fn list_playlists(&mut self) -> Result<Vec<Playlist>>;

    /// Entries of a playlist in playlist order
    async fn get_playlist_tracks(&mut self, playlist: &Playlist) -> Result<Vec<Track>>;

    /// Library tracks matching the query, in the server's order
    async fn search_tracks(&mut self, query: &TrackQuery) -> Result<Vec<Track>>;

    /// Create an independent copy of a playlist under a new title
    async fn duplicate_playlist(&mut self, playlist: &Playlist, title: &str) -> Result<Playlist>;

    /// Remove playlist entries, in order.
    ///
    /// On failure the error reports how many entries were already removed,
    /// see [`Error::applied_changes`](crate::error::Error::applied_changes).
    async fn remove_tracks(&mut self, playlist: &Playlist, tracks: &[Track]) -> Result<()>;

    /// Append library tracks to a playlist, in order; failures report progress
    /// like [`MediaCatalog::remove_tracks`]
    async fn add_tracks(&mut self, playlist: &Playlist, tracks: &[Track]) -> Result<()>;
}

/// Playlists that are offered for upgrading, in server order
pub fn upgradeable_playlists(playlists: Vec<Playlist>) -> Vec<Playlist> {
    playlists.into_iter().filter(Playlist::is_upgradeable).collect()
}

/// Find a playlist by its exact title
pub fn find_playlist<'a>(playlists: &'a [Playlist], title: &str) -> Result<&'a Playlist> {
    playlists
        .iter()
        .find(|p| p.title == title)
        .ok_or_else(|| crate::error::Error::PlaylistNotFound(title.to_string()))
}
