// In-memory catalog for exercising the upgrade flow without a server

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use super::{AudioCodec, MediaCatalog, Playlist, Track, TrackQuery};
use crate::error::{AuthFailure, Error, Result};
use crate::matching::strip_punctuation;

/// A recorded call that would have changed server state
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MutationCall {
    Duplicate { source_id: String, title: String },
    Remove { playlist_id: String, track_ids: Vec<String> },
    Add { playlist_id: String, track_ids: Vec<String> },
}

#[derive(Debug, Default)]
pub(crate) struct MemoryCatalog {
    pub playlists: Vec<Playlist>,
    /// Playlist id -> entries
    pub entries: HashMap<String, Vec<Track>>,
    pub library: Vec<Track>,
    /// Titles whose searches fail
    pub failing_searches: HashSet<String>,
    pub fail_remove: bool,
    pub fail_add: bool,
    /// Fail on the n-th removed entry, after applying the ones before it
    pub fail_remove_after: Option<usize>,
    /// Fail on the n-th added track, after applying the ones before it
    pub fail_add_after: Option<usize>,
    /// Searches fail as if the token had been revoked
    pub revoked: bool,
    pub calls: Vec<MutationCall>,
    pub search_count: usize,
    next_id: u64,
}

pub(crate) fn track(id: &str, title: &str, artist: &str, codec: AudioCodec, bitrate: u32) -> Track {
    Track {
        id: id.to_string(),
        title: title.to_string(),
        artist: artist.to_string(),
        album: "Test Album".to_string(),
        duration_ms: 200_000,
        codec: Some(codec),
        bitrate_kbps: Some(bitrate),
        bit_depth: None,
        sample_rate: None,
        playlist_item_id: None,
    }
}

impl MemoryCatalog {
    /// Add library tracks (searchable, not in any playlist)
    pub fn with_library(mut self, tracks: Vec<Track>) -> Self {
        self.library.extend(tracks);
        self
    }

    /// Create a playlist whose entries are also part of the library
    pub fn add_playlist(&mut self, title: &str, tracks: Vec<Track>) -> Playlist {
        let playlist = Playlist {
            id: self.next_id("pl"),
            title: title.to_string(),
            summary: Some(format!("{} summary", title)),
            num_tracks: tracks.len(),
            smart: false,
            playlist_type: "audio".to_string(),
        };
        for track in &tracks {
            if !self.library.iter().any(|t| t.id == track.id) {
                self.library.push(track.clone());
            }
        }
        let entries = tracks.into_iter().map(|t| self.entry(t)).collect();
        self.entries.insert(playlist.id.clone(), entries);
        self.playlists.push(playlist.clone());
        playlist
    }

    pub fn entry_ids(&self, playlist: &Playlist) -> Vec<String> {
        self.entries
            .get(&playlist.id)
            .map(|e| e.iter().map(|t| t.id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn mutations_on(&self, playlist: &Playlist) -> usize {
        self.calls
            .iter()
            .filter(|call| match call {
                MutationCall::Remove { playlist_id, .. } | MutationCall::Add { playlist_id, .. } => {
                    *playlist_id == playlist.id
                }
                MutationCall::Duplicate { .. } => false,
            })
            .count()
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn entry(&mut self, mut track: Track) -> Track {
        track.playlist_item_id = Some(self.next_id("item"));
        track
    }
}

#[async_trait]
impl MediaCatalog for MemoryCatalog {
    async fn list_playlists(&mut self) -> Result<Vec<Playlist>> {
        Ok(self.playlists.clone())
    }

    async fn get_playlist_tracks(&mut self, playlist: &Playlist) -> Result<Vec<Track>> {
        self.entries
            .get(&playlist.id)
            .cloned()
            .ok_or_else(|| Error::PlaylistNotFound(playlist.title.clone()))
    }

    async fn search_tracks(&mut self, query: &TrackQuery) -> Result<Vec<Track>> {
        self.search_count += 1;
        if self.revoked {
            return Err(Error::Auth(AuthFailure::InvalidToken));
        }
        if self.failing_searches.contains(&query.title) {
            return Err(Error::search(query.to_string(), "connection reset"));
        }

        let wanted_title = query.title.to_lowercase();
        let wanted_artist = query.artist.as_ref().map(|a| a.to_lowercase());
        Ok(self
            .library
            .iter()
            .filter(|t| strip_punctuation(&t.title).to_lowercase().contains(&wanted_title))
            .filter(|t| match &wanted_artist {
                Some(artist) => strip_punctuation(&t.artist).to_lowercase().contains(artist),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn duplicate_playlist(&mut self, playlist: &Playlist, title: &str) -> Result<Playlist> {
        let tracks = self.get_playlist_tracks(playlist).await?;
        self.calls.push(MutationCall::Duplicate {
            source_id: playlist.id.clone(),
            title: title.to_string(),
        });

        let copy = Playlist {
            id: self.next_id("pl"),
            title: title.to_string(),
            summary: playlist.summary.clone(),
            num_tracks: tracks.len(),
            smart: false,
            playlist_type: playlist.playlist_type.clone(),
        };
        let entries = tracks.into_iter().map(|t| self.entry(t)).collect();
        self.entries.insert(copy.id.clone(), entries);
        self.playlists.push(copy.clone());
        Ok(copy)
    }

    async fn remove_tracks(&mut self, playlist: &Playlist, tracks: &[Track]) -> Result<()> {
        self.calls.push(MutationCall::Remove {
            playlist_id: playlist.id.clone(),
            track_ids: tracks.iter().map(|t| t.id.clone()).collect(),
        });
        if self.fail_remove {
            return Err(Error::mutation(0, "server returned 500"));
        }

        let entries = self
            .entries
            .get_mut(&playlist.id)
            .ok_or_else(|| Error::PlaylistNotFound(playlist.title.clone()))?;
        for (done, track) in tracks.iter().enumerate() {
            if self.fail_remove_after == Some(done) {
                return Err(Error::mutation(done, "server returned 500"));
            }
            let item_id = track.playlist_item_id.as_ref().ok_or_else(|| {
                Error::mutation(done, format!("{} is not a playlist entry", track))
            })?;
            entries.retain(|e| e.playlist_item_id.as_ref() != Some(item_id));
        }
        Ok(())
    }

    async fn add_tracks(&mut self, playlist: &Playlist, tracks: &[Track]) -> Result<()> {
        self.calls.push(MutationCall::Add {
            playlist_id: playlist.id.clone(),
            track_ids: tracks.iter().map(|t| t.id.clone()).collect(),
        });
        if self.fail_add {
            return Err(Error::mutation(0, "server returned 500"));
        }
        if !self.entries.contains_key(&playlist.id) {
            return Err(Error::PlaylistNotFound(playlist.title.clone()));
        }

        for (done, track) in tracks.iter().enumerate() {
            if self.fail_add_after == Some(done) {
                return Err(Error::mutation(done, "server returned 500"));
            }
            let entry = self.entry(track.clone());
            if let Some(entries) = self.entries.get_mut(&playlist.id) {
                entries.push(entry);
            }
        }
        Ok(())
    }
}
