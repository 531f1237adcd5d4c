use anyhow::Result;

use crate::api::{Artifact, ScriptPage};
use crate::utils::format_duration;

const RULE_WIDTH: usize = 80;

/// Readable text: a metadata header followed by the script body
pub fn format_as_text(artifact: &Artifact) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    out.push_str(&rule);
    out.push('\n');
    out.push_str(&format!("YouTube Script: {}\n", artifact.title()));
    if !artifact.video_url.trim().is_empty() {
        out.push_str(&format!("URL: {}\n", artifact.video_url));
    }
    out.push_str(&format!(
        "Duration: {}\n",
        format_duration(artifact.video_duration.unwrap_or(0))
    ));
    if let Some(channel) = &artifact.channel {
        out.push_str(&format!("Channel: {}\n", channel));
    }
    if let Some(views) = artifact.views {
        out.push_str(&format!("Views: {}\n", views));
    }
    if let Some(created) = artifact.created_at {
        out.push_str(&format!("Generated: {}\n", created.format("%Y-%m-%d %H:%M:%S")));
    }
    out.push_str(&rule);
    out.push_str("\n\n");
    out.push_str(artifact.body().unwrap_or("No transcript available"));

    out
}

/// One line per script: id, status, creation date and title
pub fn format_script_list(page: &ScriptPage) -> String {
    if page.scripts.is_empty() {
        return "No scripts found".to_string();
    }

    let mut out = format!("{:<8} {:<11} {:<16} {}\n", "ID", "STATUS", "CREATED", "TITLE");
    for script in &page.scripts {
        let created = script
            .created_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<8} {:<11} {:<16} {}\n",
            script.id,
            script.status,
            created,
            script.title()
        ));
    }
    out.push_str(&format!("Page {} of {} ({} scripts)", page.page, page.pages.max(1), page.total));

    out
}

/// The full record, pretty-printed
pub fn format_as_json(artifact: &Artifact) -> Result<String> {
    Ok(serde_json::to_string_pretty(artifact)?)
}
