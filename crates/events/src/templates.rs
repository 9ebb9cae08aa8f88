//! Plain-text bodies for client notifications.

use serde_json::Value;

use crate::notifier::NotifyError;

/// Sent once a proposal's mockups are live.
pub const PROPOSAL_READY: &str = "proposal_ready";

/// Sent once the production site is published.
pub const SITE_PUBLISHED: &str = "site_published";

/// A rendered message ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

/// Render `template_id` with `data`.
///
/// `proposal_ready` expects `business_name`, `status_url` and an `options`
/// array of `{index, name, preview_url}`; `site_published` expects
/// `business_name` and `url`.
pub fn render(template_id: &str, data: &Value) -> Result<RenderedMessage, NotifyError> {
    match template_id {
        PROPOSAL_READY => {
            let business = text(data, PROPOSAL_READY, "business_name")?;
            let status_url = text(data, PROPOSAL_READY, "status_url")?;
            let mut body = format!(
                "Hello {business},\n\nYour website designs are ready to preview:\n\n"
            );
            for option in data["options"].as_array().into_iter().flatten() {
                let index = option["index"].as_i64().unwrap_or_default();
                let name = option["name"].as_str().unwrap_or("Design");
                match option["preview_url"].as_str() {
                    Some(url) => body.push_str(&format!("  {index}. {name}: {url}\n")),
                    None => body.push_str(&format!("  {index}. {name}: preview unavailable\n")),
                }
            }
            body.push_str(&format!(
                "\nChoose your favourite at {status_url}\n"
            ));
            Ok(RenderedMessage {
                subject: format!("Your website designs for {business} are ready"),
                body,
            })
        }
        SITE_PUBLISHED => {
            let business = text(data, SITE_PUBLISHED, "business_name")?;
            let url = text(data, SITE_PUBLISHED, "url")?;
            Ok(RenderedMessage {
                subject: format!("{business} is live"),
                body: format!("Hello {business},\n\nYour website is published at {url}\n"),
            })
        }
        other => Err(NotifyError::UnknownTemplate(other.to_string())),
    }
}

fn text<'a>(data: &'a Value, template: &'static str, field: &'static str) -> Result<&'a str, NotifyError> {
    data[field]
        .as_str()
        .ok_or(NotifyError::MissingField { template, field })
}
