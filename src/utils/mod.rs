use crate::api::ExportFormat;

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Format a video length given in whole seconds
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Sanitize filename for safe filesystem usage
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            c if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' || c == '.' => c,
            _ => '_',
        })
        .collect::<String>()
        .trim()
        .trim_start_matches('.')
        .to_string()
}

/// Name used when the server does not suggest one
pub fn default_download_filename(script_id: &str, format: ExportFormat) -> String {
    format!("script_{}.{}", sanitize_filename(script_id), format.extension())
}

/// Extract the suggested file name from a `Content-Disposition` header.
///
/// Handles plain and quoted `filename=` values as well as the RFC 5987
/// `filename*=UTF-8''...` form, which wins when both are present.
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in header.split(';').map(str::trim) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');

        match key.trim().to_ascii_lowercase().as_str() {
            "filename" => plain = Some(value.to_string()),
            "filename*" => {
                let encoded = value
                    .split_once("''")
                    .map(|(_, rest)| rest)
                    .unwrap_or(value);
                extended = urlencoding::decode(encoded).ok().map(|s| s.into_owned());
            }
            _ => {}
        }
    }

    extended
        .or(plain)
        .map(|name| sanitize_filename(&name))
        .filter(|name| !name.is_empty())
}
