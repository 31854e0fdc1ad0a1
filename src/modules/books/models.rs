use serde::{Deserialize, Serialize};
use serde_json::json;
use shelf_http::error::AppError;
use thiserror::Error;
use time::OffsetDateTime;

const MIN_TEXT_LEN: usize = 3;
const MAX_REVIEW: f64 = 5.0;

/// Month and year a book was published. Both are free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedDate {
    pub month: String,
    pub year: String,
}

/// A catalog record as held by the store.
///
/// `id` and `created_at` are assigned by the store exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub published_at: PublishedDate,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    pub review: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Book {
    /// Materialise a stored record from validated input.
    pub fn from_input(id: String, created_at: OffsetDateTime, input: BookInput) -> Self {
        Self {
            id,
            title: input.title,
            author: input.author,
            publisher: input.publisher,
            published_at: input.published_at,
            tags: input.tags,
            image_path: input.image_path,
            review: input.review,
            created_at,
        }
    }

    /// Overwrite the replaceable fields. Identity, creation time, publication
    /// date and cover image are left as stored.
    pub fn apply(&mut self, changes: BookChanges) {
        self.title = changes.title;
        self.author = changes.author;
        self.publisher = changes.publisher;
        self.tags = changes.tags;
        self.review = changes.review;
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Caller-supplied fields for create and update. Carries no identity or timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookInput {
    #[serde(alias = "name")]
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub published_at: PublishedDate,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub review: f64,
}

/// The subset of a validated input that an update writes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookChanges {
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub tags: Vec<String>,
    pub review: f64,
}

impl From<BookInput> for BookChanges {
    fn from(input: BookInput) -> Self {
        Self {
            title: input.title,
            author: input.author,
            publisher: input.publisher,
            tags: input.tags,
            review: input.review,
        }
    }
}

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub error: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid book: {}", summary(.0))]
pub struct ValidationError(pub Vec<FieldError>);

fn summary(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{} {}", e.field, e.error))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ValidationError {
    pub fn single(field: &'static str, error: &'static str) -> Self {
        Self(vec![FieldError { field, error }])
    }

    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        let message = e.to_string();
        let details = e
            .0
            .iter()
            .map(|f| json!({ "field": f.field, "error": f.error }))
            .collect();
        AppError::validation(details, message)
    }
}

impl BookInput {
    /// Check and normalise the input: text is trimmed, tags are de-duplicated.
    pub fn validate(self) -> Result<Self, ValidationError> {
        let mut errors = Vec::new();

        let title = self.title.trim().to_string();
        let author = self.author.trim().to_string();
        let publisher = self.publisher.trim().to_string();
        for (field, value) in [
            ("title", &title),
            ("author", &author),
            ("publisher", &publisher),
        ] {
            if value.chars().count() < MIN_TEXT_LEN {
                errors.push(FieldError {
                    field,
                    error: "too_short",
                });
            }
        }

        let published_at = PublishedDate {
            month: self.published_at.month.trim().to_string(),
            year: self.published_at.year.trim().to_string(),
        };
        if published_at.month.is_empty() {
            errors.push(FieldError {
                field: "published_at.month",
                error: "required",
            });
        }
        if published_at.year.is_empty() {
            errors.push(FieldError {
                field: "published_at.year",
                error: "required",
            });
        }

        if !self.review.is_finite() || !(0.0..=MAX_REVIEW).contains(&self.review) {
            errors.push(FieldError {
                field: "review",
                error: "out_of_range",
            });
        }

        if !errors.is_empty() {
            return Err(ValidationError(errors));
        }

        let image_path = self
            .image_path
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        Ok(Self {
            title,
            author,
            publisher,
            published_at,
            tags: normalize_tags(self.tags),
            image_path,
            review: self.review,
        })
    }
}

/// Trim, drop empties, collapse duplicates. Tags form a set, so order is not kept.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut tags: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}


#[cfg(test)]
mod tests {
    use super::fixtures::moondust;
    use super::*;

    #[test]
    fn valid_input_is_normalised() {
        let mut input = moondust();
        input.title = "  Moondust  ".to_string();
        input.tags = vec![
            "nasa".to_string(),
            " nasa ".to_string(),
            "".to_string(),
            "astronauts".to_string(),
        ];
        input.image_path = Some("   ".to_string());

        let input = input.validate().unwrap();
        assert_eq!(input.title, "Moondust");
        assert_eq!(input.tags, vec!["astronauts", "nasa"]);
        assert_eq!(input.image_path, None);
    }

    #[test]
    fn every_invalid_field_is_reported() {
        let input = BookInput {
            title: "ab".to_string(),
            author: " ".to_string(),
            publisher: "Bloomsbury".to_string(),
            published_at: PublishedDate {
                month: "".to_string(),
                year: "2009".to_string(),
            },
            tags: vec![],
            image_path: None,
            review: 5.5,
        };

        let err = input.validate().unwrap_err();
        let fields: Vec<_> = err.fields().iter().map(|f| f.field).collect();
        assert_eq!(
            fields,
            vec!["title", "author", "published_at.month", "review"]
        );
    }

    #[test]
    fn review_bounds_are_inclusive() {
        for review in [0.0, 5.0] {
            let input = BookInput {
                review,
                ..moondust()
            };
            assert!(input.validate().is_ok());
        }
        let input = BookInput {
            review: f64::NAN,
            ..moondust()
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn legacy_name_field_is_accepted() {
        let input: BookInput = serde_json::from_value(json!({
            "name": "Moondust",
            "author": "Andrew Smith",
            "publisher": "Bloomsbury Publishing PLC",
            "published_at": { "month": "July", "year": "2009" },
            "review": 4.6
        }))
        .unwrap();
        assert_eq!(input.title, "Moondust");
        assert!(input.tags.is_empty());
    }

    #[test]
    fn validation_error_maps_to_bad_request() {
        let err = ValidationError::single("tag", "required");
        let app: AppError = err.into();
        assert_eq!(app.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
