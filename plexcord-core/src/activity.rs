//! Presence payloads
//!
//! [`ActivityMapper`] turns a media item and its playback position into the
//! Rich Presence activity shown on Discord. The mapping is pure: the clock
//! is passed in, so the same inputs always give the same payload.

use serde::{Serialize, Serializer};

use crate::error::{Error, Result};
use crate::format::{format_clock, truncate_chars};
use crate::media::{MediaItem, MediaKind, PlaybackState};

/// Maximum length of the details and state lines
pub const TEXT_LIMIT: usize = 128;

/// Document whose body is the current image lookup base URL
pub const IMAGES_POINTER_URL: &str = "https://hiumee.github.io/kodi/images_url";

/// Large image asset key used when no image lookup URL is available
pub const FALLBACK_LARGE_IMAGE: &str = "logo";

/// Maximum number of genres appended for movies
const MAX_GENRES: usize = 3;

/// Activity type shown by Discord ("Listening to" / "Watching")
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Listening,
    Watching,
}

impl ActivityKind {
    /// Discord activity type code
    pub fn code(self) -> u8 {
        match self {
            ActivityKind::Listening => 2,
            ActivityKind::Watching => 3,
        }
    }
}

impl Serialize for ActivityKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Image assets and their hover text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assets {
    pub large_text: String,
    pub large_image: String,
    pub small_text: String,
    pub small_image: String,
}

/// Either a start or an end time, in epoch seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timestamps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

/// Presence payload sent to Discord
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Activity {
    pub details: String,
    pub state: String,
    pub assets: Assets,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<Timestamps>,
}

/// Builds [`Activity`] payloads from media items.
#[derive(Debug, Clone)]
pub struct ActivityMapper {
    images_url: Option<String>,
    use_remaining_time: bool,
}

impl ActivityMapper {
    pub fn new(images_url: Option<String>, use_remaining_time: bool) -> Self {
        Self {
            images_url,
            use_remaining_time,
        }
    }

    /// Map an item at `view_offset` milliseconds, with `now` in epoch seconds.
    ///
    /// Returns `None` for media kinds that have no presence representation.
    pub fn map(
        &self,
        item: &MediaItem,
        state: PlaybackState,
        view_offset: u64,
        now: i64,
    ) -> Option<Activity> {
        let mut state_text = if state == PlaybackState::Playing {
            format_clock(item.duration)
        } else {
            format!(
                "{}/{}",
                format_clock(view_offset),
                format_clock(item.duration)
            )
        };

        let (title, large_text, kind, image_type) = match &item.kind {
            MediaKind::Movie => {
                let title = match item.year {
                    Some(year) => format!("{} ({})", item.title, year),
                    None => item.title.clone(),
                };
                if !item.genres.is_empty() {
                    let genres: Vec<&str> = item
                        .genres
                        .iter()
                        .take(MAX_GENRES)
                        .map(String::as_str)
                        .collect();
                    state_text.push_str(" · ");
                    state_text.push_str(&genres.join(", "));
                }
                (title, "Watching a movie", ActivityKind::Watching, Some("movie"))
            }
            MediaKind::Episode => {
                let show = item
                    .grandparent_title
                    .clone()
                    .unwrap_or_else(|| item.title.clone());
                state_text.push_str(&format!(
                    " · S{:02}E{:02} - {}",
                    item.parent_index.unwrap_or(0),
                    item.index.unwrap_or(0),
                    item.title
                ));
                (show, "Watching a TV show", ActivityKind::Watching, Some("tv"))
            }
            MediaKind::Track => {
                let artist = item
                    .original_title
                    .as_deref()
                    .filter(|artist| !artist.is_empty())
                    .or(item.grandparent_title.as_deref())
                    .unwrap_or_default();
                state_text = format!(
                    "{} - {}",
                    artist,
                    item.parent_title.as_deref().unwrap_or_default()
                );
                (
                    item.title.clone(),
                    "Listening to music",
                    ActivityKind::Listening,
                    None,
                )
            }
            MediaKind::Other(_) => return None,
        };

        let large_image = match &self.images_url {
            Some(base) => thumbnail_url(base, &title, image_type),
            None => FALLBACK_LARGE_IMAGE.to_string(),
        };

        let timestamps = (state == PlaybackState::Playing)
            .then(|| self.timestamps(item.duration, view_offset, now));

        Some(Activity {
            details: truncate_chars(&title, TEXT_LIMIT),
            state: truncate_chars(&state_text, TEXT_LIMIT),
            assets: Assets {
                large_text: large_text.to_string(),
                large_image,
                small_text: state.label().to_string(),
                small_image: state.as_str().to_string(),
            },
            kind,
            timestamps,
        })
    }

    fn timestamps(&self, duration: u64, view_offset: u64, now: i64) -> Timestamps {
        if self.use_remaining_time {
            let remaining = duration as i64 - view_offset as i64;
            Timestamps {
                start: None,
                end: Some(now + millis_to_seconds(remaining)),
            }
        } else {
            Timestamps {
                start: Some(now - millis_to_seconds(view_offset as i64)),
                end: None,
            }
        }
    }
}

fn millis_to_seconds(millis: i64) -> i64 {
    (millis as f64 / 1000.0).round() as i64
}

/// `<base>?name=<title>&type=<movie|tv>`; music omits the type.
pub fn thumbnail_url(base: &str, title: &str, image_type: Option<&str>) -> String {
    let mut url = format!("{}?name={}", base, urlencoding::encode(title));
    if let Some(image_type) = image_type {
        url.push_str("&type=");
        url.push_str(image_type);
    }
    url
}

/// Fetch the image lookup base URL from [`IMAGES_POINTER_URL`].
pub async fn fetch_images_url(client: &reqwest::Client) -> Result<String> {
    let body = client
        .get(IMAGES_POINTER_URL)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let url = body.trim();
    if url.is_empty() {
        return Err(Error::Config("image lookup URL document is empty".to_string()));
    }
    Ok(url.to_string())
}
