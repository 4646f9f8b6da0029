//! Media attached to questions (images, videos, audio)

use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::{constants::question::MAX_MEDIA_URL_LENGTH, identity::Id};

/// The kind of content a media URL points to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// A still image
    #[default]
    Image,
    /// A video clip
    Video,
    /// An audio clip
    Audio,
}

/// A single piece of media shown alongside a question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Media {
    /// Unique identifier of the attachment
    #[garde(skip)]
    pub id: Id,
    /// Where the content can be fetched from
    #[garde(length(min = 1, max = MAX_MEDIA_URL_LENGTH))]
    pub url: String,
    /// What the URL points to
    #[garde(skip)]
    #[serde(default, rename = "type")]
    pub kind: MediaKind,
    /// Display position among the question's media
    #[garde(skip)]
    #[serde(default)]
    pub order_num: i32,
}

impl Media {
    /// Creates an image attachment
    pub fn image(url: impl Into<String>) -> Self {
        Self {
            id: Id::new(),
            url: url.into(),
            kind: MediaKind::Image,
            order_num: 0,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_media_rejects_empty_url() {
        assert!(Media::image("https://example.org/a.png").validate().is_ok());
        assert!(Media::image("").validate().is_err());
    }

    #[test]
    fn test_media_kind_defaults_to_image() {
        let media: Media = serde_json::from_value(serde_json::json!({
            "id": Id::new(),
            "url": "https://example.org/a.png",
        }))
        .unwrap();
        assert_eq!(media.kind, MediaKind::Image);
    }
}
