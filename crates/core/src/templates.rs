//! Template catalog and the deterministic proposal selection policy.
//!
//! Pure functions used by the proposal generator. Given the same intake and
//! the same catalog, [`TemplateCatalog::select`] always returns the same
//! templates in the same order: candidates are ranked by [`score`] and ties
//! are broken by template id.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::intake::{normalize_key, Intake};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Business type entry marking a template as usable for any business.
pub const ANY_BUSINESS: &str = "*";

/// Points for a template that lists the intake's preferred style.
pub const SCORE_STYLE_MATCH: u32 = 10;

/// Points for a template built for exactly this business type.
pub const SCORE_BUSINESS_MATCH: u32 = 6;

/// Points for a generic (`"*"`) template.
pub const SCORE_GENERIC_MATCH: u32 = 1;

/// Points per listed service the template has a section for.
pub const SCORE_PER_TAG: u32 = 2;

/// Points when the template palette matches the colour preference.
pub const SCORE_COLOR_MATCH: u32 = 3;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Visual theme applied by a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeDescriptor {
    /// Colour family used for matching, e.g. `"blue"`.
    pub palette: String,
    pub primary_color: String,
    pub accent_color: String,
    pub font_family: String,
    /// Page structure, e.g. `"hero-grid"`.
    pub layout: String,
}

/// One template the site builder knows how to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDescriptor {
    pub id: String,
    pub name: String,
    pub business_types: Vec<String>,
    pub styles: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub theme: ThemeDescriptor,
}

/// A template together with the score it earned for one intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredTemplate {
    pub template: TemplateDescriptor,
    pub score: u32,
}

/// Errors raised by the catalog and the selection policy.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// The business type maps to fewer candidates than options requested.
    #[error(
        "Insufficient templates for business type '{business_type}': {available} available, {required} required"
    )]
    InsufficientTemplates {
        business_type: String,
        available: usize,
        required: usize,
    },

    /// The catalog definition itself is malformed.
    #[error("Invalid template catalog: {0}")]
    InvalidCatalog(String),
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

impl TemplateDescriptor {
    /// Whether the template may be offered for `business_type`.
    pub fn supports(&self, business_type: &str) -> bool {
        self.business_types
            .iter()
            .any(|t| t == business_type || t == ANY_BUSINESS)
    }
}

/// Score how well `template` fits `intake`. Higher is better.
pub fn score(template: &TemplateDescriptor, intake: &Intake) -> u32 {
    let mut total = 0;

    if template.styles.iter().any(|s| s == intake.style()) {
        total += SCORE_STYLE_MATCH;
    }

    if template.business_types.iter().any(|t| *t == intake.business_type) {
        total += SCORE_BUSINESS_MATCH;
    } else if template.business_types.iter().any(|t| t == ANY_BUSINESS) {
        total += SCORE_GENERIC_MATCH;
    }

    let matching_tags = intake
        .services
        .iter()
        .filter(|svc| template.tags.contains(svc))
        .count() as u32;
    total += matching_tags * SCORE_PER_TAG;

    if intake.color_preference.as_deref() == Some(template.theme.palette.as_str()) {
        total += SCORE_COLOR_MATCH;
    }

    total
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// The set of templates proposals are drawn from.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    templates: Vec<TemplateDescriptor>,
}

impl TemplateCatalog {
    /// Build a catalog, rejecting empty or duplicate ids.
    ///
    /// Business types, styles and tags are normalised the same way intake
    /// fields are, so catalog files may use any casing.
    pub fn new(templates: Vec<TemplateDescriptor>) -> Result<Self, TemplateError> {
        let mut seen = HashSet::new();
        let mut normalised = Vec::with_capacity(templates.len());
        for mut template in templates {
            if template.id.trim().is_empty() {
                return Err(TemplateError::InvalidCatalog(
                    "Template id must not be empty".to_string(),
                ));
            }
            if !seen.insert(template.id.clone()) {
                return Err(TemplateError::InvalidCatalog(format!(
                    "Duplicate template id '{}'",
                    template.id
                )));
            }
            if template.business_types.is_empty() {
                return Err(TemplateError::InvalidCatalog(format!(
                    "Template '{}' lists no business types",
                    template.id
                )));
            }
            template.business_types = normalise_all(&template.business_types);
            template.styles = normalise_all(&template.styles);
            template.tags = normalise_all(&template.tags);
            template.theme.palette = normalize_key(&template.theme.palette);
            normalised.push(template);
        }
        Ok(Self {
            templates: normalised,
        })
    }

    /// Parse a catalog from a JSON array of template descriptors.
    pub fn from_json(json: &str) -> Result<Self, TemplateError> {
        let templates: Vec<TemplateDescriptor> = serde_json::from_str(json)
            .map_err(|e| TemplateError::InvalidCatalog(e.to_string()))?;
        Self::new(templates)
    }

    /// All templates in catalog order.
    pub fn templates(&self) -> &[TemplateDescriptor] {
        &self.templates
    }

    /// Look up a template by id.
    pub fn get(&self, id: &str) -> Option<&TemplateDescriptor> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Templates that may be offered for `business_type`.
    pub fn candidates_for(&self, business_type: &str) -> Vec<&TemplateDescriptor> {
        self.templates
            .iter()
            .filter(|t| t.supports(business_type))
            .collect()
    }

    /// Pick the `count` best-fitting distinct templates for `intake`.
    ///
    /// Ordering is by score descending, then template id ascending.
    pub fn select(
        &self,
        intake: &Intake,
        count: usize,
    ) -> Result<Vec<ScoredTemplate>, TemplateError> {
        let candidates = self.candidates_for(&intake.business_type);
        if candidates.len() < count {
            return Err(TemplateError::InsufficientTemplates {
                business_type: intake.business_type.clone(),
                available: candidates.len(),
                required: count,
            });
        }

        let mut scored: Vec<ScoredTemplate> = candidates
            .into_iter()
            .map(|t| ScoredTemplate {
                score: score(t, intake),
                template: t.clone(),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.template.id.cmp(&b.template.id))
        });
        scored.truncate(count);
        Ok(scored)
    }

    /// The catalog shipped with the service.
    pub fn builtin() -> Self {
        let templates = vec![
            template(
                "trades-classic",
                "Trusted Trades",
                &["plumber", "electrician", "hvac", "roofer", "contractor"],
                &["classic", "traditional"],
                &["emergency-repairs", "free-quotes", "installations"],
                theme("blue", "#1e3a8a", "#f59e0b", "Georgia, serif", "hero-columns"),
            ),
            template(
                "trades-bold",
                "Hard Hat",
                &["plumber", "electrician", "hvac", "roofer", "landscaper"],
                &["bold"],
                &["emergency-repairs", "24-7-service", "financing"],
                theme("orange", "#c2410c", "#111827", "Oswald, sans-serif", "full-bleed"),
            ),
            template(
                "trades-modern",
                "Clean Pipe",
                &["plumber", "electrician", "contractor", "cleaner"],
                &["modern", "minimal"],
                &["free-quotes", "maintenance-plans", "installations"],
                theme("teal", "#0f766e", "#e2e8f0", "Inter, sans-serif", "hero-grid"),
            ),
            template(
                "hospitality-warm",
                "Hearth",
                &["restaurant", "cafe", "bakery", "bar"],
                &["rustic", "classic", "warm"],
                &["menu", "reservations", "catering"],
                theme("red", "#7f1d1d", "#fde68a", "Playfair Display, serif", "story"),
            ),
            template(
                "hospitality-modern",
                "Plate",
                &["restaurant", "cafe", "food-truck"],
                &["modern", "bold"],
                &["menu", "online-ordering", "events"],
                theme("green", "#166534", "#fafaf9", "Poppins, sans-serif", "hero-grid"),
            ),
            template(
                "wellness-calm",
                "Still Water",
                &["salon", "spa", "yoga", "fitness", "therapist"],
                &["minimal", "elegant"],
                &["booking", "pricing", "team"],
                theme("green", "#3f6212", "#f5f5f4", "Lora, serif", "centered"),
            ),
            template(
                "wellness-vibrant",
                "Pulse",
                &["fitness", "yoga", "salon"],
                &["bold", "modern"],
                &["booking", "classes", "memberships"],
                theme("purple", "#6d28d9", "#f472b6", "Montserrat, sans-serif", "full-bleed"),
            ),
            template(
                "professional-clean",
                "Ledger",
                &["lawyer", "accountant", "consultant", "agency"],
                &["minimal", "modern"],
                &["consultations", "case-studies", "team"],
                theme("blue", "#1d4ed8", "#f8fafc", "Inter, sans-serif", "hero-columns"),
            ),
            template(
                "professional-classic",
                "Chambers",
                &["lawyer", "accountant", "financial-advisor"],
                &["classic", "elegant"],
                &["consultations", "testimonials"],
                theme("gray", "#1f2937", "#b45309", "Merriweather, serif", "story"),
            ),
            template(
                "generic-starter",
                "Starter",
                &[ANY_BUSINESS],
                &["modern", "minimal"],
                &["contact-form"],
                theme("blue", "#2563eb", "#f1f5f9", "Inter, sans-serif", "hero-grid"),
            ),
            template(
                "generic-showcase",
                "Showcase",
                &[ANY_BUSINESS],
                &["bold"],
                &["gallery", "testimonials"],
                theme("gray", "#0f172a", "#22d3ee", "Space Grotesk, sans-serif", "full-bleed"),
            ),
        ];
        Self { templates }
    }
}

fn normalise_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| normalize_key(v)).collect()
}

fn template(
    id: &str,
    name: &str,
    business_types: &[&str],
    styles: &[&str],
    tags: &[&str],
    theme: ThemeDescriptor,
) -> TemplateDescriptor {
    TemplateDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        business_types: business_types.iter().map(|s| s.to_string()).collect(),
        styles: styles.iter().map(|s| s.to_string()).collect(),
        tags: tags.iter().map(|s| s.to_string()).collect(),
        theme,
    }
}

fn theme(palette: &str, primary: &str, accent: &str, font: &str, layout: &str) -> ThemeDescriptor {
    ThemeDescriptor {
        palette: palette.to_string(),
        primary_color: primary.to_string(),
        accent_color: accent.to_string(),
        font_family: font.to_string(),
        layout: layout.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
