use async_trait::async_trait;
use reqwest::{Client as HttpClient, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::account::{http_client, ClientIdentity};
use super::{AudioCodec, MediaCatalog, Playlist, Track, TrackQuery};
use crate::error::{AuthFailure, Error, Result};

/// Plex library type id for tracks
const TRACK_TYPE: &str = "10";
/// Maximum number of items referenced by a single playlist request
const ITEMS_PER_REQUEST: usize = 100;
const AUDIO_STREAM: u32 = 2;

// API Response models
#[derive(Debug, Deserialize)]
struct Container<T> {
    #[serde(rename = "MediaContainer")]
    media_container: T,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct MetadataList<T> {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct DirectoryList {
    #[serde(rename = "Directory", default)]
    directory: Vec<SectionItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityResponse {
    machine_identifier: String,
}

#[derive(Debug, Deserialize)]
struct SectionItem {
    key: String,
    #[serde(rename = "type")]
    section_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    rating_key: String,
    title: String,
    summary: Option<String>,
    #[serde(default)]
    smart: bool,
    playlist_type: Option<String>,
    leaf_count: Option<usize>,
}

impl PlaylistItem {
    fn into_playlist(self) -> Playlist {
        Playlist {
            id: self.rating_key,
            title: self.title,
            summary: self.summary.filter(|s| !s.is_empty()),
            num_tracks: self.leaf_count.unwrap_or(0),
            smart: self.smart,
            playlist_type: self.playlist_type.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackItem {
    rating_key: String,
    title: String,
    /// Track artist, when it differs from the album artist
    original_title: Option<String>,
    /// Album artist
    grandparent_title: Option<String>,
    /// Album
    parent_title: Option<String>,
    duration: Option<u64>,
    #[serde(rename = "playlistItemID")]
    playlist_item_id: Option<u64>,
    #[serde(rename = "Media", default)]
    media: Vec<MediaItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaItem {
    bitrate: Option<u32>,
    audio_codec: Option<String>,
    duration: Option<u64>,
    #[serde(rename = "Part", default)]
    parts: Vec<PartItem>,
}

#[derive(Debug, Deserialize)]
struct PartItem {
    #[serde(rename = "Stream", default)]
    streams: Vec<StreamItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamItem {
    stream_type: Option<u32>,
    bit_depth: Option<u8>,
    sampling_rate: Option<u32>,
}

impl TrackItem {
    fn into_track(self) -> Track {
        let artist = self
            .original_title
            .filter(|a| !a.trim().is_empty())
            .or(self.grandparent_title)
            .unwrap_or_else(|| "Unknown Artist".to_string());

        // Quality is taken from the first media version, like Plex plays it
        let media = self.media.into_iter().next();
        let audio_stream = media.as_ref().and_then(|m| {
            m.parts
                .iter()
                .flat_map(|p| p.streams.iter())
                .find(|s| s.stream_type == Some(AUDIO_STREAM))
        });
        let bit_depth = audio_stream.and_then(|s| s.bit_depth);
        let sample_rate = audio_stream.and_then(|s| s.sampling_rate);

        let duration_ms = self
            .duration
            .or_else(|| media.as_ref().and_then(|m| m.duration))
            .unwrap_or(0);
        let codec = media
            .as_ref()
            .and_then(|m| m.audio_codec.as_deref())
            .and_then(|c| c.parse::<AudioCodec>().ok());
        let bitrate_kbps = media.as_ref().and_then(|m| m.bitrate);

        Track {
            id: self.rating_key,
            title: self.title,
            artist,
            album: self
                .parent_title
                .unwrap_or_else(|| "Unknown Album".to_string()),
            duration_ms,
            codec,
            bitrate_kbps,
            bit_depth,
            sample_rate,
            playlist_item_id: self.playlist_item_id.map(|id| id.to_string()),
        }
    }
}

/// A connected Plex Media Server
pub struct PlexServer {
    base_url: String,
    token: String,
    machine_identifier: String,
    identity: ClientIdentity,
    http_client: HttpClient,
    /// Keys of music library sections, fetched on first search
    music_sections: Option<Vec<String>>,
}

impl std::fmt::Debug for PlexServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlexServer")
            .field("base_url", &self.base_url)
            .field("machine_identifier", &self.machine_identifier)
            .finish_non_exhaustive()
    }
}

impl PlexServer {
    /// Connect to a server and verify the token by reading its identity
    pub async fn connect(
        base_url: &str,
        token: &str,
        identity: ClientIdentity,
        timeout: Duration,
    ) -> Result<Self> {
        let mut server = Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            machine_identifier: String::new(),
            identity,
            http_client: http_client(timeout)?,
            music_sections: None,
        };

        let identity: Container<IdentityResponse> = server.get_json("/identity", &[]).await?;
        server.machine_identifier = identity.media_container.machine_identifier;
        tracing::debug!(
            "Server {} has machine identifier {}",
            server.base_url,
            server.machine_identifier
        );

        Ok(server)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self
            .http_client
            .request(method, format!("{}{}", self.base_url, path))
            .header("X-Plex-Token", &self.token);
        self.identity.apply(request)
    }

    /// Turn unsuccessful responses into errors
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Auth(AuthFailure::InvalidToken));
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Other(anyhow::anyhow!(
            "Server returned {} - {}",
            status,
            body.trim()
        )))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self.request(Method::GET, path).query(query).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn send(&self, request: RequestBuilder) -> Result<()> {
        Self::check(request.send().await?).await?;
        Ok(())
    }

    /// Library URI referencing a batch of tracks
    fn items_uri(&self, tracks: &[Track]) -> String {
        let ids = tracks
            .iter()
            .map(|t| t.id.as_str())
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "server://{}/com.plexapp.plugins.library/library/metadata/{}",
            self.machine_identifier, ids
        )
    }

    async fn music_sections(&mut self) -> Result<Vec<String>> {
        if let Some(ref sections) = self.music_sections {
            return Ok(sections.clone());
        }

        let response: Container<DirectoryList> = self.get_json("/library/sections", &[]).await?;
        let sections: Vec<String> = response
            .media_container
            .directory
            .into_iter()
            .filter(|s| s.section_type == "artist")
            .map(|s| s.key)
            .collect();
        tracing::debug!("Music sections: {:?}", sections);

        self.music_sections = Some(sections.clone());
        Ok(sections)
    }

    async fn search_section(&self, section: &str, query: &TrackQuery) -> Result<Vec<Track>> {
        let path = format!("/library/sections/{}/all", section);
        let mut params = vec![("type", TRACK_TYPE), ("title", query.title.as_str())];
        if let Some(ref artist) = query.artist {
            params.push(("artist.title", artist.as_str()));
        }

        let response: Container<MetadataList<TrackItem>> = self.get_json(&path, &params).await?;
        Ok(response
            .media_container
            .metadata
            .into_iter()
            .map(TrackItem::into_track)
            .collect())
    }

    async fn set_summary(&self, playlist_id: &str, summary: &str) -> Result<()> {
        let path = format!("/playlists/{}", playlist_id);
        self.send(self.request(Method::PUT, &path).query(&[("summary", summary)]))
            .await
    }
}

#[async_trait]
impl MediaCatalog for PlexServer {
    async fn list_playlists(&mut self) -> Result<Vec<Playlist>> {
        let response: Container<MetadataList<PlaylistItem>> =
            self.get_json("/playlists", &[]).await?;

        Ok(response
            .media_container
            .metadata
            .into_iter()
            .map(PlaylistItem::into_playlist)
            .collect())
    }

    async fn get_playlist_tracks(&mut self, playlist: &Playlist) -> Result<Vec<Track>> {
        let path = format!("/playlists/{}/items", playlist.id);
        let response = self.request(Method::GET, &path).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::PlaylistNotFound(playlist.title.clone()));
        }

        let items: Container<MetadataList<TrackItem>> = Self::check(response).await?.json().await?;
        Ok(items
            .media_container
            .metadata
            .into_iter()
            .map(TrackItem::into_track)
            .collect())
    }

    async fn search_tracks(&mut self, query: &TrackQuery) -> Result<Vec<Track>> {
        let sections = self
            .music_sections()
            .await
            .map_err(|e| search_failure(query, e))?;

        let mut tracks = Vec::new();
        for section in &sections {
            let found = self
                .search_section(section, query)
                .await
                .map_err(|e| search_failure(query, e))?;
            tracks.extend(found);
        }
        Ok(tracks)
    }

    async fn duplicate_playlist(&mut self, playlist: &Playlist, title: &str) -> Result<Playlist> {
        let tracks = self.get_playlist_tracks(playlist).await?;
        let Some((first, rest)) = split_first_batch(&tracks) else {
            return Err(Error::mutation(
                0,
                format!("cannot duplicate \"{}\": it has no tracks", playlist.title),
            ));
        };

        let uri = self.items_uri(first);
        let request = self.request(Method::POST, "/playlists").query(&[
            ("type", "audio"),
            ("title", title),
            ("smart", "0"),
            ("uri", uri.as_str()),
        ]);
        let response = request
            .send()
            .await
            .map_err(|e| Error::mutation(0, e))?;
        let created: Container<MetadataList<PlaylistItem>> = Self::check(response)
            .await
            .map_err(|e| Error::mutation(0, format!("creating \"{}\": {}", title, e)))?
            .json()
            .await?;
        let mut copy = created
            .media_container
            .metadata
            .into_iter()
            .next()
            .map(PlaylistItem::into_playlist)
            .ok_or_else(|| Error::mutation(0, format!("server did not return \"{}\"", title)))?;

        if let Err(e) = self.add_tracks(&copy, rest).await {
            return Err(incomplete_copy(&copy, first.len(), tracks.len(), e));
        }
        copy.num_tracks = tracks.len();

        if let Some(ref summary) = playlist.summary {
            if let Err(e) = self.set_summary(&copy.id, summary).await {
                tracing::warn!("Could not copy summary to \"{}\": {}", title, e);
            } else {
                copy.summary = Some(summary.clone());
            }
        }

        tracing::info!("Created playlist \"{}\" ({} tracks)", copy.title, copy.num_tracks);
        Ok(copy)
    }

    async fn remove_tracks(&mut self, playlist: &Playlist, tracks: &[Track]) -> Result<()> {
        for (done, track) in tracks.iter().enumerate() {
            let item_id = track.playlist_item_id.as_deref().ok_or_else(|| {
                Error::mutation(
                    done,
                    format!("{} is not an entry of \"{}\"", track, playlist.title),
                )
            })?;

            let path = format!("/playlists/{}/items/{}", playlist.id, item_id);
            self.send(self.request(Method::DELETE, &path))
                .await
                .map_err(|e| Error::mutation(done, format!("removing {}: {}", track, e)))?;
        }
        Ok(())
    }

    async fn add_tracks(&mut self, playlist: &Playlist, tracks: &[Track]) -> Result<()> {
        let path = format!("/playlists/{}/items", playlist.id);
        let mut done = 0;

        for batch in tracks.chunks(ITEMS_PER_REQUEST) {
            let uri = self.items_uri(batch);
            self.send(self.request(Method::PUT, &path).query(&[("uri", uri.as_str())]))
                .await
                .map_err(|e| Error::mutation(done, e))?;
            done += batch.len();
        }
        Ok(())
    }
}

/// Wrap a search error; auth failures stay fatal
fn search_failure(query: &TrackQuery, error: Error) -> Error {
    match error {
        Error::Auth(_) => error,
        other => Error::search(query.to_string(), other),
    }
}

/// A copy was created but not all tracks made it into it
fn incomplete_copy(copy: &Playlist, first_batch: usize, total: usize, error: Error) -> Error {
    let added = first_batch + error.applied_changes();
    Error::mutation(
        0,
        format!(
            "created \"{}\" (id {}) with only {} of {} tracks, delete or fix it manually: {}",
            copy.title, copy.id, added, total, error
        ),
    )
}

/// First request-sized batch and the remainder, `None` if empty
fn split_first_batch(tracks: &[Track]) -> Option<(&[Track], &[Track])> {
    if tracks.is_empty() {
        return None;
    }
    Some(tracks.split_at(tracks.len().min(ITEMS_PER_REQUEST)))
}
