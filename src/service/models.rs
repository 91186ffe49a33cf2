//! Request and response types of the paste lifecycle

use crate::error::PasteError;
use crate::metadata::{Paste, DEFAULT_LANGUAGE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Longest accepted title, in characters
pub const MAX_TITLE_LENGTH: usize = 255;

/// Longest accepted language tag, in characters
pub const MAX_LANGUAGE_LENGTH: usize = 64;

/// A new paste
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatePaste {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub content_language: Option<String>,
    /// `None` never expires
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CreatePaste {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            content_language: None,
            expires_at: None,
        }
    }

    pub fn validate(&self, max_content_length: usize, now: DateTime<Utc>) -> Result<(), PasteError> {
        validate_title(&self.title)?;
        validate_content(&self.content, max_content_length)?;
        if let Some(language) = &self.content_language {
            validate_language(language)?;
        }
        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                return Err(PasteError::InvalidInput("expires_at must be in the future".to_string()));
            }
        }
        Ok(())
    }

    pub fn language(&self) -> String {
        self.content_language
            .clone()
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())
    }
}

/// A partial update. Omitted fields keep their value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EditPaste {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,
    /// Absent keeps the expiry, `null` removes it, a value replaces it.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

impl EditPaste {
    pub fn validate(&self, max_content_length: usize) -> Result<(), PasteError> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(content) = &self.content {
            validate_content(content, max_content_length)?;
        }
        if let Some(language) = &self.content_language {
            validate_language(language)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.content_language.is_none()
            && self.expires_at.is_none()
    }
}

// A present field, even `null`, becomes `Some`.
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn validate_title(title: &str) -> Result<(), PasteError> {
    if title.trim().is_empty() {
        return Err(PasteError::InvalidInput("title must not be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(PasteError::InvalidInput(format!(
            "title must be at most {} characters",
            MAX_TITLE_LENGTH
        )));
    }
    Ok(())
}

fn validate_content(content: &str, max_content_length: usize) -> Result<(), PasteError> {
    if content.is_empty() {
        return Err(PasteError::InvalidInput("content must not be empty".to_string()));
    }
    if content.len() > max_content_length {
        return Err(PasteError::InvalidInput(format!(
            "content must be at most {} bytes",
            max_content_length
        )));
    }
    Ok(())
}

fn validate_language(language: &str) -> Result<(), PasteError> {
    if language.trim().is_empty() || language.chars().count() > MAX_LANGUAGE_LENGTH {
        return Err(PasteError::InvalidInput(format!(
            "content_language must be 1 to {} characters",
            MAX_LANGUAGE_LENGTH
        )));
    }
    Ok(())
}

/// A paste as returned to readers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PasteView {
    pub id: Uuid,
    pub title: String,
    /// `None` when the stored content could not be read
    pub content: Option<String>,
    pub content_language: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl PasteView {
    pub fn from_record(paste: &Paste, content: Option<String>) -> Self {
        Self {
            id: paste.id,
            title: paste.title.clone(),
            content,
            content_language: paste.content_language.clone(),
            expires_at: paste.expires_at,
            created_at: paste.created_at,
            last_updated_at: paste.last_updated_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Raw content as cached, with the expiry needed to honour it on a hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawContent {
    pub content: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A freshly created paste with its one-time credentials
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatedPaste {
    #[serde(flatten)]
    pub paste: PasteView,
    pub edit_token: String,
    pub delete_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_edit_distinguishes_absent_from_null() {
        let absent: EditPaste = serde_json::from_str(r#"{"title": "new"}"#).unwrap();
        assert_eq!(absent.title.as_deref(), Some("new"));
        assert_eq!(absent.expires_at, None);

        let cleared: EditPaste = serde_json::from_str(r#"{"expires_at": null}"#).unwrap();
        assert_eq!(cleared.expires_at, Some(None));

        let set: EditPaste = serde_json::from_str(r#"{"expires_at": "2030-01-01T00:00:00Z"}"#).unwrap();
        assert!(matches!(set.expires_at, Some(Some(_))));
    }

    #[test]
    fn test_create_validation() {
        let now = Utc::now();
        assert!(CreatePaste::new("t", "hello").validate(10, now).is_ok());
        assert!(CreatePaste::new("", "hello").validate(10, now).is_err());
        assert!(CreatePaste::new("t", "").validate(10, now).is_err());
        assert!(CreatePaste::new("t", "hello world!").validate(10, now).is_err());
        assert!(CreatePaste::new("x".repeat(256), "hello").validate(10, now).is_err());
        assert!(CreatePaste::new("x".repeat(255), "hello").validate(10, now).is_ok());

        let mut past = CreatePaste::new("t", "hello");
        past.expires_at = Some(now - Duration::seconds(1));
        assert!(matches!(past.validate(10, now), Err(PasteError::InvalidInput(_))));
    }

    #[test]
    fn test_created_paste_flattens_view() {
        let view = PasteView {
            id: Uuid::new_v4(),
            title: "t".to_string(),
            content: Some("c".to_string()),
            content_language: DEFAULT_LANGUAGE.to_string(),
            expires_at: None,
            created_at: Utc::now(),
            last_updated_at: None,
        };
        let created = CreatedPaste {
            paste: view,
            edit_token: "e".to_string(),
            delete_token: "d".to_string(),
        };
        let json = serde_json::to_value(&created).unwrap();
        assert_eq!(json["title"], "t");
        assert_eq!(json["edit_token"], "e");
        assert!(json.get("paste").is_none());
    }
}
