use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The three content collections the site manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[serde(alias = "blog")]
    Blogs,
    #[serde(alias = "event")]
    Events,
    #[serde(alias = "sermon")]
    Sermons,
}

/// How the remote API expresses "published only" for a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishedFilter {
    /// `GET /{segment}/public`
    PathSuffix,
    /// `GET /{segment}?published=true`
    QueryParam,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown content type: {0}")]
pub struct UnknownContentType(pub String);

impl ContentType {
    pub const ALL: [ContentType; 3] = [ContentType::Blogs, ContentType::Events, ContentType::Sermons];

    /// Key of the collection in the local persistent store.
    pub fn storage_key(self) -> &'static str {
        match self {
            ContentType::Blogs => "blogs",
            ContentType::Events => "events",
            ContentType::Sermons => "sermons",
        }
    }

    /// Path segment of the collection on the remote content API.
    pub fn path_segment(self) -> &'static str {
        match self {
            ContentType::Blogs => "blog",
            ContentType::Events => "events",
            ContentType::Sermons => "sermons",
        }
    }

    pub fn published_filter(self) -> PublishedFilter {
        match self {
            ContentType::Blogs => PublishedFilter::PathSuffix,
            ContentType::Events | ContentType::Sermons => PublishedFilter::QueryParam,
        }
    }

    /// Fields that must be present and non-empty on create.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            ContentType::Blogs => &["title", "content"],
            ContentType::Events => &["title", "date", "location"],
            ContentType::Sermons => &["title", "speaker", "date"],
        }
    }

    /// Fields that hold plain text when present.
    pub fn text_fields(self) -> &'static [&'static str] {
        match self {
            ContentType::Blogs => &["title", "summary", "content", "author", "category"],
            ContentType::Events => &["title", "location", "description"],
            ContentType::Sermons => &["title", "speaker", "description"],
        }
    }

    /// Fields that must parse as ISO-8601 dates when present.
    pub fn date_fields(self) -> &'static [&'static str] {
        match self {
            ContentType::Blogs => &[],
            ContentType::Events | ContentType::Sermons => &["date"],
        }
    }

    /// Fields that may carry an uploaded path or inline media.
    pub fn media_fields(self) -> &'static [&'static str] {
        match self {
            ContentType::Blogs | ContentType::Events => &["imageUrl"],
            ContentType::Sermons => &["videoUrl", "audioUrl", "thumbnailUrl"],
        }
    }

    /// Human label used in API messages.
    pub fn label(self) -> &'static str {
        match self {
            ContentType::Blogs => "Blog",
            ContentType::Events => "Event",
            ContentType::Sermons => "Sermon",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.storage_key())
    }
}

impl FromStr for ContentType {
    type Err = UnknownContentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blogs" | "blog" => Ok(ContentType::Blogs),
            "events" | "event" => Ok(ContentType::Events),
            "sermons" | "sermon" => Ok(ContentType::Sermons),
            _ => Err(UnknownContentType(s.to_string())),
        }
    }
}
