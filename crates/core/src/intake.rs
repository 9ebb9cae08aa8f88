//! Validated business-intake schema.
//!
//! The intake form is the only untyped input that enters the pipeline.
//! It is parsed into [`Intake`] at the HTTP boundary (unknown fields are
//! rejected) and validated once by [`Intake::validated`]; everything
//! downstream works with the normalised value.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

/// Style assumed when the client expresses no preference.
pub const DEFAULT_STYLE: &str = "modern";

/// Snapshot of a client's business-intake form submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct Intake {
    #[serde(alias = "businessName")]
    #[validate(length(min = 1, max = 200, message = "business_name must be 1-200 characters"))]
    pub business_name: String,

    #[validate(email(message = "email must be a valid address"))]
    pub email: String,

    #[serde(alias = "businessType")]
    #[validate(length(min = 1, max = 64, message = "business_type must be 1-64 characters"))]
    pub business_type: String,

    #[serde(default, alias = "stylePreference")]
    pub style_preference: Option<String>,

    #[serde(default)]
    pub phone: Option<String>,

    #[serde(default)]
    pub tagline: Option<String>,

    #[serde(default)]
    #[validate(length(max = 32, message = "at most 32 services may be listed"))]
    pub services: Vec<String>,

    #[serde(default, alias = "colorPreference")]
    pub color_preference: Option<String>,

    /// Free-form answers the builder may use but the pipeline never reads.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Intake {
    /// Validate the required identity fields and return a normalised copy.
    ///
    /// Text fields are trimmed; the business type, style and services are
    /// lower-cased so that template matching is case-insensitive.
    pub fn validated(mut self) -> Result<Self, CoreError> {
        self.business_name = self.business_name.trim().to_string();
        self.email = self.email.trim().to_string();
        self.business_type = normalize_key(&self.business_type);
        self.style_preference = self
            .style_preference
            .as_deref()
            .map(normalize_key)
            .filter(|s| !s.is_empty());
        self.color_preference = self
            .color_preference
            .as_deref()
            .map(normalize_key)
            .filter(|s| !s.is_empty());
        self.services = self
            .services
            .iter()
            .map(|s| normalize_key(s))
            .filter(|s| !s.is_empty())
            .collect();

        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;
        Ok(self)
    }

    /// Preferred style, falling back to [`DEFAULT_STYLE`].
    pub fn style(&self) -> &str {
        self.style_preference.as_deref().unwrap_or(DEFAULT_STYLE)
    }
}

/// Lower-case, trim, and join inner whitespace with hyphens.
///
/// `"  Food Truck "` becomes `"food-truck"`.
pub fn normalize_key(raw: &str) -> String {
    raw.split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}
