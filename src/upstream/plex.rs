//! Plex Media Server client and plex.tv authentication.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::StatusCode;
use serde::Deserialize;

use super::api::ApiClient;
use super::types::{LibraryEntry, PlexSession, Transcoder, UpstreamResult};
use super::PlexApi;
use crate::transport::{AuthError, PathNormalizer, TokenSource};

/// Header carrying the Plex token.
pub const TOKEN_HEADER: &str = "x-plex-token";

/// plex.tv sign-in endpoint.
pub const SIGN_IN_URL: &str = "https://plex.tv/users/sign_in.json";

/// Path prefixes whose sub-paths carry library and item keys.
pub const PATH_PREFIXES: &[&str] = &["/library/metadata", "/library/sections"];

/// Path normalizer collapsing Plex item and section keys.
pub fn path_normalizer() -> PathNormalizer {
    PATH_PREFIXES
        .iter()
        .fold(PathNormalizer::new(), |normalizer, prefix| normalizer.with_prefix(*prefix))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Envelope<T> {
    media_container: T,
}

#[derive(Debug, Deserialize)]
struct Identity {
    version: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct Sessions {
    metadata: Vec<SessionItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SessionItem {
    title: String,
    #[serde(rename = "type")]
    kind: String,
    grandparent_title: String,
    parent_index: u32,
    index: u32,
    duration: u64,
    view_offset: u64,
    #[serde(rename = "User")]
    user: SessionUser,
    #[serde(rename = "Player")]
    player: SessionPlayer,
    #[serde(rename = "Session")]
    session: SessionInfo,
    #[serde(rename = "Media")]
    media: Vec<SessionMedia>,
    #[serde(rename = "TranscodeSession")]
    transcode: Option<TranscodeInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SessionUser {
    title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SessionPlayer {
    product: String,
    address: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SessionInfo {
    bandwidth: u64,
    location: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SessionMedia {
    video_codec: String,
    audio_codec: String,
    #[serde(rename = "Part")]
    parts: Vec<SessionPart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SessionPart {
    decision: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TranscodeInfo {
    video_decision: String,
    throttled: bool,
    speed: f64,
}

impl SessionItem {
    fn title(&self) -> String {
        if self.kind == "episode" {
            format!(
                "{} - S{:02}E{:02} - {}",
                self.grandparent_title, self.parent_index, self.index, self.title
            )
        } else {
            self.title.clone()
        }
    }

    /// Transcoder decision if any, else the decision of the first media part.
    fn mode(&self) -> String {
        self.transcode
            .as_ref()
            .map(|t| t.video_decision.as_str())
            .filter(|decision| !decision.is_empty())
            .or_else(|| {
                self.media
                    .iter()
                    .flat_map(|media| media.parts.iter())
                    .map(|part| part.decision.as_str())
                    .find(|decision| !decision.is_empty())
            })
            .unwrap_or("unknown")
            .to_string()
    }

    fn progress(&self) -> f64 {
        if self.duration == 0 {
            0.0
        } else {
            self.view_offset as f64 / self.duration as f64
        }
    }

    fn codecs(&self, pick: impl Fn(&SessionMedia) -> &str) -> String {
        let codecs: BTreeSet<&str> = self.media.iter().map(pick).filter(|c| !c.is_empty()).collect();
        codecs.into_iter().collect::<Vec<_>>().join(",")
    }

    fn into_session(self) -> PlexSession {
        let mode = self.mode();
        PlexSession {
            title: self.title(),
            progress: self.progress(),
            video_codec: self.codecs(|m| m.video_codec.as_str()),
            audio_codec: self.codecs(|m| m.audio_codec.as_str()),
            transcoder: self
                .transcode
                .as_ref()
                .filter(|_| mode == "transcode")
                .map(|t| Transcoder {
                    throttled: t.throttled,
                    speed: t.speed,
                }),
            mode,
            user: self.user.title,
            player: self.player.product,
            address: self.player.address,
            location: self.session.location,
            bandwidth: self.session.bandwidth as f64,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct Sections {
    directory: Vec<Section>,
}

#[derive(Debug, Deserialize)]
struct Section {
    key: String,
    #[serde(rename = "type")]
    kind: String,
    title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct Items {
    metadata: Vec<Item>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Item {
    title: String,
    #[serde(rename = "grandparentTitle")]
    grandparent_title: Option<String>,
    #[serde(rename = "Media")]
    media: Vec<Media>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Media {
    #[serde(rename = "Part")]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Part {
    size: u64,
}

impl Item {
    /// Size of the first non-empty media part.
    fn size(&self) -> u64 {
        self.media
            .iter()
            .flat_map(|media| media.parts.iter())
            .map(|part| part.size)
            .find(|size| *size > 0)
            .unwrap_or(0)
    }
}

/// Client for one Plex Media Server.
#[derive(Clone)]
pub struct PlexClient {
    api: ApiClient,
}

impl PlexClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    async fn container<T: serde::de::DeserializeOwned>(&self, path: &str) -> UpstreamResult<T> {
        let envelope: Envelope<T> = self.api.get_json(path).await?;
        Ok(envelope.media_container)
    }

    async fn movie_sizes(&self, section: &Section) -> UpstreamResult<Vec<LibraryEntry>> {
        let items: Items = self
            .container(&format!("/library/sections/{}/all", section.key))
            .await?;
        Ok(items
            .metadata
            .iter()
            .map(|item| LibraryEntry {
                library: section.title.clone(),
                title: item.title.clone(),
                bytes: item.size() as f64,
            })
            .collect())
    }

    async fn show_sizes(&self, section: &Section) -> UpstreamResult<Vec<LibraryEntry>> {
        let episodes: Items = self
            .container(&format!("/library/sections/{}/all?type=4", section.key))
            .await?;
        let mut shows: BTreeMap<String, u64> = BTreeMap::new();
        for episode in &episodes.metadata {
            let show = episode.grandparent_title.as_deref().unwrap_or(&episode.title);
            *shows.entry(show.to_string()).or_insert(0) += episode.size();
        }
        Ok(shows
            .into_iter()
            .filter(|(_, bytes)| *bytes > 0)
            .map(|(title, bytes)| LibraryEntry {
                library: section.title.clone(),
                title,
                bytes: bytes as f64,
            })
            .collect())
    }
}

#[async_trait]
impl PlexApi for PlexClient {
    async fn get_version(&self) -> UpstreamResult<String> {
        let identity: Identity = self.container("/identity").await?;
        Ok(identity.version)
    }

    async fn get_sessions(&self) -> UpstreamResult<Vec<PlexSession>> {
        let sessions: Sessions = self.container("/status/sessions").await?;
        Ok(sessions
            .metadata
            .into_iter()
            .map(SessionItem::into_session)
            .collect())
    }

    async fn get_library_sizes(&self) -> UpstreamResult<Vec<LibraryEntry>> {
        let sections: Sections = self.container("/library/sections").await?;
        let mut entries = Vec::new();
        for section in &sections.directory {
            match section.kind.as_str() {
                "movie" => entries.extend(self.movie_sizes(section).await?),
                "show" => entries.extend(self.show_sizes(section).await?),
                other => {
                    tracing::debug!(library = %section.title, kind = %other, "Skipping library");
                }
            }
        }
        Ok(entries)
    }
}

#[derive(Debug, Deserialize)]
struct SignInResponse {
    user: SignInUser,
}

#[derive(Debug, Deserialize)]
struct SignInUser {
    #[serde(rename = "authToken")]
    auth_token: String,
}

/// Obtains a Plex token by signing in to plex.tv with a username and password.
pub struct PlexTvTokenSource {
    client: reqwest::Client,
    sign_in_url: String,
    username: String,
    password: String,
    client_id: String,
}

impl PlexTvTokenSource {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Network(e.to_string()))?;
        Ok(Self {
            client,
            sign_in_url: SIGN_IN_URL.to_string(),
            username: username.into(),
            password: password.into(),
            client_id: env!("CARGO_PKG_NAME").to_string(),
        })
    }

    /// Sign in against another endpoint.
    pub fn with_sign_in_url(mut self, url: impl Into<String>) -> Self {
        self.sign_in_url = url.into();
        self
    }

    fn form(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("user[login]", &self.username)
            .append_pair("user[password]", &self.password)
            .finish()
    }
}

impl std::fmt::Debug for PlexTvTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlexTvTokenSource")
            .field("sign_in_url", &self.sign_in_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for PlexTvTokenSource {
    async fn fetch_token(&self) -> Result<String, AuthError> {
        let response = self
            .client
            .post(&self.sign_in_url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .header("X-Plex-Product", env!("CARGO_PKG_NAME"))
            .header("X-Plex-Version", env!("CARGO_PKG_VERSION"))
            .header("X-Plex-Client-Identifier", &self.client_id)
            .body(self.form())
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if response.status() != StatusCode::CREATED {
            return Err(AuthError::Rejected {
                status: response.status(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        let sign_in: SignInResponse =
            serde_json::from_slice(&body).map_err(|e| AuthError::Decode(e.to_string()))?;
        tracing::info!(username = %self.username, "Signed in to plex.tv");
        Ok(sign_in.user.auth_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_normalizer() {
        let normalizer = path_normalizer();
        assert_eq!(normalizer.normalize("/library/metadata/12/children"), "/library/metadata");
        assert_eq!(normalizer.normalize("/library/sections/1/all"), "/library/sections");
        assert_eq!(normalizer.normalize("/status/sessions"), "/status/sessions");
    }

    #[test]
    fn test_item_size_uses_first_non_empty_part() {
        let item: Item = serde_json::from_str(
            r#"{"title": "Movie", "Media": [{"Part": [{"size": 0}, {"size": 10}]}, {"Part": [{"size": 20}]}]}"#,
        )
        .unwrap();
        assert_eq!(item.size(), 10);
    }

    #[test]
    fn test_sessions_decode() {
        let sessions: Sessions = serde_json::from_str(
            r#"{"Metadata": [
                {"title": "Movie", "type": "movie", "duration": 100, "viewOffset": 50,
                 "User": {"title": "alice"}, "Player": {"product": "Plex Web", "address": "192.168.0.1"},
                 "Session": {"id": "1", "bandwidth": 4000, "location": "lan"},
                 "Media": [{"videoCodec": "hevc", "audioCodec": "aac", "Part": [{"decision": "directplay"}]}]},
                {"title": "Pilot", "type": "episode", "grandparentTitle": "Show", "parentIndex": 1, "index": 10,
                 "duration": 100, "viewOffset": 75,
                 "User": {"title": "bob"}, "Player": {"product": "Plex for iOS", "address": "1.2.3.4"},
                 "Session": {"id": "2", "bandwidth": 2500, "location": "wan"},
                 "Media": [{"videoCodec": "h264", "audioCodec": "aac"}, {"videoCodec": "hevc", "audioCodec": "aac"}],
                 "TranscodeSession": {"videoDecision": "transcode", "throttled": true, "speed": 2.5}}
            ]}"#,
        )
        .unwrap();
        let sessions: Vec<PlexSession> = sessions.metadata.into_iter().map(SessionItem::into_session).collect();

        assert_eq!(sessions[0].title, "Movie");
        assert_eq!(sessions[0].mode, "directplay");
        assert_eq!(sessions[0].progress, 0.5);
        assert_eq!(sessions[0].transcoder, None);

        assert_eq!(sessions[1].title, "Show - S01E10 - Pilot");
        assert_eq!(sessions[1].mode, "transcode");
        assert_eq!(sessions[1].video_codec, "h264,hevc");
        assert_eq!(sessions[1].audio_codec, "aac");
        assert_eq!(sessions[1].bandwidth, 2500.0);
        assert_eq!(
            sessions[1].transcoder,
            Some(Transcoder {
                throttled: true,
                speed: 2.5
            })
        );
    }

    #[test]
    fn test_sign_in_form() {
        let source = PlexTvTokenSource::new("user@example.com", "p&ss", Duration::from_secs(1)).unwrap();
        assert_eq!(
            source.form(),
            "user%5Blogin%5D=user%40example.com&user%5Bpassword%5D=p%26ss"
        );
    }
}
