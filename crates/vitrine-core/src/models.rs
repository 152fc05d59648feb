//! Core data models for vitrine.
//!
//! A media item has one stable identity and exactly one representation at a
//! time: it is either pooled (uploaded, owned by nobody) or attached to an
//! owner at a 1-based display position.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

// =============================================================================
// OWNER SCOPE
// =============================================================================

/// Entity family an ordered media list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaFamily {
    CollectionImage,
    ItemImage,
    PartnerImage,
    PartnerLogo,
    PartnerTranslationImage,
}

impl MediaFamily {
    /// Every family, in schema order.
    pub const ALL: [MediaFamily; 5] = [
        MediaFamily::CollectionImage,
        MediaFamily::ItemImage,
        MediaFamily::PartnerImage,
        MediaFamily::PartnerLogo,
        MediaFamily::PartnerTranslationImage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFamily::CollectionImage => "collection_image",
            MediaFamily::ItemImage => "item_image",
            MediaFamily::PartnerImage => "partner_image",
            MediaFamily::PartnerLogo => "partner_logo",
            MediaFamily::PartnerTranslationImage => "partner_translation_image",
        }
    }

    /// Table holding the attached rows of this family.
    pub fn table(&self) -> &'static str {
        match self {
            MediaFamily::CollectionImage => "collection_images",
            MediaFamily::ItemImage => "item_images",
            MediaFamily::PartnerImage => "partner_images",
            MediaFamily::PartnerLogo => "partner_logos",
            MediaFamily::PartnerTranslationImage => "partner_translation_images",
        }
    }

    /// Column carrying the owner id in [`Self::table`].
    pub fn owner_column(&self) -> &'static str {
        match self {
            MediaFamily::CollectionImage => "collection_id",
            MediaFamily::ItemImage => "item_id",
            MediaFamily::PartnerImage | MediaFamily::PartnerLogo => "partner_id",
            MediaFamily::PartnerTranslationImage => "partner_translation_id",
        }
    }

    /// Whether attach/detach physically moves the bytes between the pool
    /// and attached storage roots.
    ///
    /// Families that do not relocate keep serving attached files from the
    /// pool root.
    pub fn relocates_files(&self) -> bool {
        matches!(self, MediaFamily::PartnerTranslationImage)
    }
}

impl fmt::Display for MediaFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        MediaFamily::ALL
            .into_iter()
            .find(|family| family.as_str() == normalized || family.table() == normalized)
            .ok_or_else(|| Error::InvalidInput(format!("unknown media family '{}'", s)))
    }
}

/// The key an ordered media list lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerScope {
    pub family: MediaFamily,
    pub owner_id: Uuid,
}

impl OwnerScope {
    pub fn new(family: MediaFamily, owner_id: Uuid) -> Self {
        Self { family, owner_id }
    }

    /// Stable text key used for owner-scoped locking.
    pub fn lock_key(&self) -> String {
        format!("{}:{}", self.family.table(), self.owner_id)
    }
}

impl fmt::Display for OwnerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.family, self.owner_id)
    }
}

// =============================================================================
// MEDIA TYPES
// =============================================================================

/// File descriptor shared by both representations.
///
/// `path` is a bare filename relative to the storage root that currently
/// holds the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    pub path: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
}

impl MediaFile {
    /// Name offered to downloaders: the original name, or the path's last
    /// segment when the original name is blank.
    pub fn download_name(&self) -> String {
        if !self.original_name.trim().is_empty() {
            return self.original_name.clone();
        }
        self.path
            .rsplit('/')
            .next()
            .unwrap_or(self.path.as_str())
            .to_string()
    }
}

/// A media row attached to an owner at a display position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachedMedia {
    pub id: Uuid,
    pub family: MediaFamily,
    pub owner_id: Uuid,
    #[serde(flatten)]
    pub file: MediaFile,
    pub alt_text: Option<String>,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AttachedMedia {
    pub fn scope(&self) -> OwnerScope {
        OwnerScope::new(self.family, self.owner_id)
    }
}

/// An uploaded media row not attached to any owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolMedia {
    pub id: Uuid,
    #[serde(flatten)]
    pub file: MediaFile,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The representation currently holding a media id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MediaState {
    Pooled {
        comment: Option<String>,
    },
    Attached {
        scope: OwnerScope,
        alt_text: Option<String>,
        display_order: i32,
    },
}

/// A media item seen through its single stable identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: Uuid,
    pub file: MediaFile,
    pub state: MediaState,
}

impl MediaRecord {
    pub fn is_pooled(&self) -> bool {
        matches!(self.state, MediaState::Pooled { .. })
    }

    pub fn scope(&self) -> Option<OwnerScope> {
        match &self.state {
            MediaState::Attached { scope, .. } => Some(*scope),
            MediaState::Pooled { .. } => None,
        }
    }
}

impl From<AttachedMedia> for MediaRecord {
    fn from(media: AttachedMedia) -> Self {
        let scope = media.scope();
        Self {
            id: media.id,
            file: media.file,
            state: MediaState::Attached {
                scope,
                alt_text: media.alt_text,
                display_order: media.display_order,
            },
        }
    }
}

impl From<PoolMedia> for MediaRecord {
    fn from(media: PoolMedia) -> Self {
        Self {
            id: media.id,
            file: media.file,
            state: MediaState::Pooled {
                comment: media.comment,
            },
        }
    }
}

/// Sanitized attribute set for creating a media row.
///
/// `note` becomes `alt_text` on attached rows and `comment` on pool rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMedia {
    pub path: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    pub note: Option<String>,
}

impl NewMedia {
    /// Reject attribute sets that cannot address a stored file.
    pub fn validate(&self) -> crate::Result<()> {
        validate_media_path(&self.path)?;
        if self.size < 0 {
            return Err(Error::InvalidInput(format!(
                "size must not be negative, got {}",
                self.size
            )));
        }
        Ok(())
    }

    pub fn into_file(self) -> (MediaFile, Option<String>) {
        (
            MediaFile {
                path: self.path,
                original_name: self.original_name,
                mime_type: self.mime_type,
                size: self.size,
            },
            self.note,
        )
    }
}

/// A stored path must be relative and must not climb out of its root.
pub fn validate_media_path(path: &str) -> crate::Result<()> {
    if path.trim().is_empty() {
        return Err(Error::InvalidInput("path must not be empty".to_string()));
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(Error::InvalidInput(format!(
            "path must be relative: {}",
            path
        )));
    }
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(Error::InvalidInput(format!(
            "path must not contain '..': {}",
            path
        )));
    }
    Ok(())
}

/// Bytes of a stored file plus what a caller needs to serve them.
///
/// `filename` is set for downloads and left empty for inline viewing.
#[derive(Debug, Clone)]
pub struct MediaContent {
    pub data: Vec<u8>,
    pub filename: Option<String>,
    pub mime_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, original_name: &str) -> MediaFile {
        MediaFile {
            path: path.to_string(),
            original_name: original_name.to_string(),
            mime_type: "image/jpeg".to_string(),
            size: 10,
        }
    }

    #[test]
    fn test_family_parse_accepts_names_and_tables() {
        assert_eq!(
            "partner-translation-image".parse::<MediaFamily>().unwrap(),
            MediaFamily::PartnerTranslationImage
        );
        assert_eq!(
            "item_images".parse::<MediaFamily>().unwrap(),
            MediaFamily::ItemImage
        );
        assert!("gallery".parse::<MediaFamily>().is_err());
    }

    #[test]
    fn test_only_translation_images_relocate() {
        let relocating: Vec<_> = MediaFamily::ALL
            .into_iter()
            .filter(|f| f.relocates_files())
            .collect();
        assert_eq!(relocating, vec![MediaFamily::PartnerTranslationImage]);
    }

    #[test]
    fn test_partner_families_share_owner_column() {
        assert_eq!(
            MediaFamily::PartnerImage.owner_column(),
            MediaFamily::PartnerLogo.owner_column()
        );
        assert_ne!(
            MediaFamily::PartnerImage.table(),
            MediaFamily::PartnerLogo.table()
        );
    }

    #[test]
    fn test_lock_key_distinguishes_families() {
        let owner = Uuid::new_v4();
        let a = OwnerScope::new(MediaFamily::PartnerImage, owner);
        let b = OwnerScope::new(MediaFamily::PartnerLogo, owner);
        assert_ne!(a.lock_key(), b.lock_key());
    }

    #[test]
    fn test_download_name_falls_back_to_path() {
        assert_eq!(file("a/b/img.jpg", "").download_name(), "img.jpg");
        assert_eq!(file("img.jpg", "Holiday.jpg").download_name(), "Holiday.jpg");
    }

    #[test]
    fn test_validate_media_path() {
        assert!(validate_media_path("img.jpg").is_ok());
        assert!(validate_media_path("").is_err());
        assert!(validate_media_path("/etc/passwd").is_err());
        assert!(validate_media_path("../img.jpg").is_err());
        assert!(validate_media_path("a/../../img.jpg").is_err());
    }

    #[test]
    fn test_new_media_rejects_negative_size() {
        let attrs = NewMedia {
            path: "img.jpg".into(),
            size: -1,
            ..Default::default()
        };
        assert!(matches!(attrs.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_record_from_attached_keeps_identity() {
        let now = Utc::now();
        let owner = Uuid::new_v4();
        let media = AttachedMedia {
            id: Uuid::new_v4(),
            family: MediaFamily::ItemImage,
            owner_id: owner,
            file: file("img.jpg", "img.jpg"),
            alt_text: Some("front".into()),
            display_order: 3,
            created_at: now,
            updated_at: now,
        };
        let record = MediaRecord::from(media.clone());
        assert_eq!(record.id, media.id);
        assert!(!record.is_pooled());
        assert_eq!(
            record.scope(),
            Some(OwnerScope::new(MediaFamily::ItemImage, owner))
        );
    }

    #[test]
    fn test_record_state_serializes_tagged() {
        let record = MediaRecord {
            id: Uuid::nil(),
            file: file("img.jpg", ""),
            state: MediaState::Pooled {
                comment: Some("c".into()),
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["state"]["state"], "pooled");
    }
}
