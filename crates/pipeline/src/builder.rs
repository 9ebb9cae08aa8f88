//! Site asset builder: project data in, a map of files out.
//!
//! [`SiteBuilder::build`] is synchronous and pure; callers run it on the
//! blocking pool because rendering may be CPU-bound.

use launchpad_core::intake::Intake;
use launchpad_core::templates::ThemeDescriptor;
use launchpad_core::types::DbId;
use launchpad_hosting::SiteBundle;
use serde::Serialize;

/// Everything the builder needs to render one site.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectData {
    pub workflow_id: DbId,
    pub business: Intake,
    pub template_id: String,
    pub template_name: String,
    pub theme: ThemeDescriptor,
    /// Set for mockups; production builds carry no preview banner.
    pub preview_option: Option<i32>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Failed to serialize site data: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub trait SiteBuilder: Send + Sync + 'static {
    fn build(&self, project: &ProjectData) -> Result<SiteBundle, BuildError>;
}

/// Default builder: one static page themed from the template descriptor.
///
/// Emits `index.html`, `styles.css`, `script.js` and `site.json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticSiteBuilder;

impl SiteBuilder for StaticSiteBuilder {
    fn build(&self, project: &ProjectData) -> Result<SiteBundle, BuildError> {
        let mut bundle = SiteBundle::new();
        bundle.insert("index.html".into(), render_index(project).into_bytes());
        bundle.insert("styles.css".into(), render_styles(&project.theme).into_bytes());
        bundle.insert("script.js".into(), SCRIPT.as_bytes().to_vec());
        bundle.insert("site.json".into(), serde_json::to_vec_pretty(project)?);
        Ok(bundle)
    }
}

const SCRIPT: &str = "document.addEventListener('DOMContentLoaded', () => {\n  \
    const year = document.getElementById('year');\n  \
    if (year) year.textContent = new Date().getFullYear();\n});\n";

fn render_index(project: &ProjectData) -> String {
    let business = &project.business;
    let name = escape_html(&business.business_name);

    let banner = project
        .preview_option
        .map(|n| {
            format!(
                "<div class=\"preview-banner\">Preview: design option {n} ({})</div>\n",
                escape_html(&project.template_name)
            )
        })
        .unwrap_or_default();

    let tagline = business
        .tagline
        .as_deref()
        .map(|t| format!("<p class=\"tagline\">{}</p>\n", escape_html(t)))
        .unwrap_or_default();

    let services = if business.services.is_empty() {
        String::new()
    } else {
        let items: String = business
            .services
            .iter()
            .map(|s| format!("<li>{}</li>", escape_html(&s.replace('-', " "))))
            .collect();
        format!("<section class=\"services\"><h2>Services</h2><ul>{items}</ul></section>\n")
    };

    let phone = business
        .phone
        .as_deref()
        .map(|p| format!(" &middot; {}", escape_html(p)))
        .unwrap_or_default();

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n\
         <meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{name}</title>\n\
         <link rel=\"stylesheet\" href=\"styles.css\">\n\
         </head>\n<body class=\"layout-{layout}\">\n\
         {banner}<header><h1>{name}</h1>\n{tagline}</header>\n\
         <main>\n{services}</main>\n\
         <footer>Contact: {email}{phone} &middot; &copy; <span id=\"year\"></span></footer>\n\
         <script src=\"script.js\"></script>\n</body>\n</html>\n",
        layout = escape_html(&project.theme.layout),
        email = escape_html(&business.email),
    )
}

fn render_styles(theme: &ThemeDescriptor) -> String {
    format!(
        ":root {{\n  --primary: {primary};\n  --accent: {accent};\n  --font: {font};\n}}\n\
         body {{ margin: 0; font-family: var(--font), sans-serif; color: #222; }}\n\
         header {{ background: var(--primary); color: #fff; padding: 4rem 2rem; }}\n\
         .services li {{ border-left: 4px solid var(--accent); margin: .5rem 0; padding-left: .5rem; }}\n\
         .preview-banner {{ background: var(--accent); color: #fff; text-align: center; padding: .5rem; }}\n\
         footer {{ padding: 2rem; font-size: .875rem; }}\n",
        primary = theme.primary_color,
        accent = theme.accent_color,
        font = theme.font_family,
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
