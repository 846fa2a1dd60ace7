//! YouTube HTTP client.
//!
//! Implements [`VideoService`] against the YouTube Data API v3 (playlist
//! items and video details) and the timed-text caption endpoint
//! (transcripts). The Data API key is read from the environment variable
//! named by `youtube.api_key_env`.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use quick_xml::events::Event;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use coach_rag_core::video::{TranscriptError, VideoInfo, VideoService};

use crate::config::YoutubeConfig;

/// Page size of `playlistItems.list` (API maximum).
const PAGE_SIZE: usize = 50;

pub struct YoutubeClient {
    client: reqwest::Client,
    api_key: Option<String>,
    api_base: String,
    transcript_base: String,
    language: String,
}

impl YoutubeClient {
    pub fn new(config: &YoutubeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: std::env::var(&config.api_key_env).ok(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            transcript_base: config.transcript_base.clone(),
            language: config.language.clone(),
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| anyhow!("YouTube API key not configured"))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<T> {
        let url = Url::parse_with_params(&format!("{}/{}", self.api_base, endpoint), params)
            .with_context(|| format!("invalid YouTube API URL for {}", endpoint))?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("YouTube API error {} on {}: {}", status, endpoint, body);
        }
        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemsPage {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    content_details: PlaylistItemDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemDetails {
    video_id: String,
}

#[derive(Debug, Deserialize)]
struct VideosPage {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    snippet: VideoSnippet,
    content_details: Option<VideoContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    title: String,
    channel_title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoContentDetails {
    duration: Option<String>,
}

#[async_trait]
impl VideoService for YoutubeClient {
    async fn playlist_items(&self, playlist_id: &str, max_items: usize) -> Result<Vec<String>> {
        let key = self.api_key()?;
        let page_size = PAGE_SIZE.to_string();
        let mut ids: Vec<String> = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("part", "contentDetails"),
                ("maxResults", page_size.as_str()),
                ("playlistId", playlist_id),
                ("key", key),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }

            let page: PlaylistItemsPage = self
                .get_json("playlistItems", &params)
                .await
                .with_context(|| format!("failed to list playlist {}", playlist_id))?;

            ids.extend(page.items.into_iter().map(|i| i.content_details.video_id));
            debug!(playlist_id, fetched = ids.len(), "playlist page fetched");

            match page.next_page_token {
                Some(token) if ids.len() < max_items => page_token = Some(token),
                _ => break,
            }
        }

        ids.truncate(max_items);
        Ok(ids)
    }

    async fn video_details(&self, video_id: &str) -> Result<Option<VideoInfo>> {
        let key = self.api_key()?;
        let page: VideosPage = self
            .get_json(
                "videos",
                &[("part", "snippet,contentDetails"), ("id", video_id), ("key", key)],
            )
            .await
            .with_context(|| format!("failed to fetch details for video {}", video_id))?;

        Ok(page.items.into_iter().next().map(|item| VideoInfo {
            video_id: item.id,
            title: item.snippet.title,
            duration_seconds: item
                .content_details
                .and_then(|d| d.duration)
                .and_then(|d| parse_iso8601_duration(&d)),
            channel_title: item.snippet.channel_title,
        }))
    }

    async fn transcript(&self, video_id: &str) -> Result<String, TranscriptError> {
        let url = Url::parse_with_params(
            &self.transcript_base,
            &[("lang", self.language.as_str()), ("v", video_id)],
        )
        .map_err(|e| TranscriptError::Other(anyhow!("invalid transcript URL: {}", e)))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TranscriptError::Other(e.into()))?;
        let status = response.status();
        if status.as_u16() == 404 || status.as_u16() == 410 {
            return Err(TranscriptError::VideoRemoved(video_id.to_string()));
        }
        if !status.is_success() {
            return Err(TranscriptError::Other(anyhow!(
                "transcript service returned {} for video {}",
                status,
                video_id
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TranscriptError::Other(e.into()))?;
        let text = parse_timed_text(&body)?;
        if text.trim().is_empty() {
            return Err(TranscriptError::Unavailable(video_id.to_string()));
        }
        Ok(text)
    }
}

/// Join the `<text>` cues of a timed-text document with single spaces.
///
/// Caption text is frequently escaped twice (`&amp;#39;`), so each cue is
/// unescaped once more after the XML layer.
pub fn parse_timed_text(xml: &[u8]) -> Result<String> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_cue = false;
    let mut cues: Vec<String> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"text" => {
                in_cue = true;
                cues.push(String::new());
            }
            Ok(Event::Text(te)) if in_cue => {
                let once = te.unescape()?;
                let twice = quick_xml::escape::unescape(&once)
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| once.into_owned());
                if let Some(cue) = cues.last_mut() {
                    cue.push_str(&twice);
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"text" => in_cue = false,
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow!("malformed transcript XML: {}", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(cues
        .iter()
        .map(|c| c.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(" "))
}

/// Convert an ISO-8601 duration (`PT1H2M3S`, `P1DT5M`) to seconds.
pub fn parse_iso8601_duration(raw: &str) -> Option<u64> {
    let rest = raw.strip_prefix('P')?;
    let mut total = 0u64;
    let mut number = String::new();
    let mut in_time = false;
    let mut seen_any = false;

    for c in rest.chars() {
        match c {
            'T' => in_time = true,
            '0'..='9' => number.push(c),
            unit => {
                let value: u64 = number.parse().ok()?;
                number.clear();
                let factor = match (unit, in_time) {
                    ('W', false) => 7 * 86_400,
                    ('D', false) => 86_400,
                    ('H', true) => 3_600,
                    ('M', true) => 60,
                    ('S', true) => 1,
                    _ => return None,
                };
                total += value * factor;
                seen_any = true;
            }
        }
    }

    if !number.is_empty() || !seen_any {
        return None;
    }
    Some(total)
}
