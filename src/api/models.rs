use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

use super::ApiError;

/// Body of a transcription request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    pub video_url: String,
}

impl GenerationRequest {
    pub fn new(video_url: impl Into<String>) -> Self {
        Self {
            video_url: video_url.into(),
        }
    }
}

/// Handle on a remote transcription job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Identifier of the asynchronous task to poll
    pub task_id: String,

    /// Identifier of the script record, if the service already knows it
    #[serde(default, deserialize_with = "optional_id")]
    pub script_id: Option<String>,
}

impl JobHandle {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            script_id: None,
        }
    }

    pub fn with_script_id(mut self, script_id: impl Into<String>) -> Self {
        self.script_id = Some(script_id.into());
        self
    }
}

/// Progress details shared by every poll outcome.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PollUpdate {
    /// Percentage in `0..=100`
    pub progress: u8,
    pub message: String,
    pub script_id: Option<String>,
}

impl PollUpdate {
    pub fn new(progress: u8, message: impl Into<String>) -> Self {
        Self {
            progress: progress.min(100),
            message: message.into(),
            script_id: None,
        }
    }

    pub fn with_script_id(mut self, script_id: impl Into<String>) -> Self {
        self.script_id = Some(script_id.into());
        self
    }
}

/// Outcome of a single status check, one variant per job status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    Processing(PollUpdate),
    Completed(PollUpdate),
    Failed(PollUpdate),
}

impl PollResult {
    pub fn update(&self) -> &PollUpdate {
        match self {
            PollResult::Processing(update)
            | PollResult::Completed(update)
            | PollResult::Failed(update) => update,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            PollResult::Processing(_) => "processing",
            PollResult::Completed(_) => "completed",
            PollResult::Failed(_) => "failed",
        }
    }
}

/// Status payload as sent by the service. Converted into [`PollResult`]
/// before anything else looks at it.
#[derive(Debug, Deserialize)]
pub(crate) struct StatusResponse {
    status: String,
    #[serde(default)]
    progress: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default, deserialize_with = "optional_id")]
    script_id: Option<String>,
}

impl TryFrom<StatusResponse> for PollResult {
    type Error = ApiError;

    fn try_from(raw: StatusResponse) -> Result<Self, Self::Error> {
        let update = PollUpdate {
            progress: raw.progress.clamp(0, 100) as u8,
            message: raw.message.unwrap_or_default(),
            script_id: raw.script_id,
        };

        match raw.status.to_ascii_lowercase().as_str() {
            // Queued jobs have not started yet but are still in flight
            "processing" | "pending" => Ok(PollResult::Processing(update)),
            "completed" => Ok(PollResult::Completed(update)),
            "failed" => Ok(PollResult::Failed(update)),
            other => Err(ApiError::Protocol(format!(
                "unknown job status '{}'",
                other
            ))),
        }
    }
}

/// Response to a re-queue request.
#[derive(Debug, Deserialize)]
pub(crate) struct RegenerateResponse {
    pub task_id: String,
}

/// Response to a login request.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
}

/// A finished transcript record ("script").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(deserialize_with = "required_id")]
    pub id: String,

    #[serde(default)]
    pub video_url: String,

    #[serde(default)]
    pub video_title: Option<String>,

    /// Duration in seconds
    #[serde(default)]
    pub video_duration: Option<u64>,

    #[serde(default)]
    pub channel: Option<String>,

    #[serde(default)]
    pub views: Option<u64>,

    #[serde(default)]
    pub transcript_text: Option<String>,

    #[serde(default)]
    pub formatted_script: Option<String>,

    #[serde(default)]
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<NaiveDateTime>,

    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub completed_at: Option<NaiveDateTime>,
}

impl Artifact {
    pub const PLACEHOLDER_TITLE: &'static str = "Processing Complete";
    pub const PLACEHOLDER_SCRIPT: &'static str =
        "Script generation completed. Please refresh to see the content.";

    /// Minimal stand-in used when the finished record could not be fetched.
    pub fn placeholder(id: impl Into<String>, video_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            video_url: video_url.into(),
            video_title: Some(Self::PLACEHOLDER_TITLE.to_string()),
            video_duration: None,
            channel: None,
            views: None,
            transcript_text: None,
            formatted_script: Some(Self::PLACEHOLDER_SCRIPT.to_string()),
            status: "completed".to_string(),
            error_message: None,
            created_at: None,
            completed_at: None,
        }
    }

    /// Best available body: the formatted script, else the raw transcript.
    pub fn body(&self) -> Option<&str> {
        self.formatted_script
            .as_deref()
            .or(self.transcript_text.as_deref())
            .filter(|text| !text.trim().is_empty())
    }

    pub fn title(&self) -> &str {
        self.video_title.as_deref().unwrap_or("Untitled")
    }
}

/// Formats offered by the download endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Plain text
    #[default]
    Txt,
    /// JSON document
    Json,
    /// Excel workbook
    Excel,
}

impl ExportFormat {
    /// Value of the `format` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Json => "json",
            ExportFormat::Excel => "excel",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Json => "json",
            ExportFormat::Excel => "xlsx",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw payload returned by the download endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Lifecycle status of a stored script, used to filter listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScriptStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ScriptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptStatus::Pending => "pending",
            ScriptStatus::Processing => "processing",
            ScriptStatus::Completed => "completed",
            ScriptStatus::Failed => "failed",
        }
    }
}

/// Which page of the user's scripts to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptQuery {
    /// 1-based page number
    pub page: u32,
    pub per_page: u32,
    /// Matches against title and URL
    pub search: Option<String>,
    pub status: Option<ScriptStatus>,
}

impl Default for ScriptQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
            search: None,
            status: None,
        }
    }
}

impl ScriptQuery {
    /// Query string for the listing endpoint (offset based, newest first)
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let page = self.page.max(1);
        let mut params = vec![
            ("skip", (page - 1).saturating_mul(self.per_page).to_string()),
            ("limit", self.per_page.to_string()),
            ("sort_by", "created_at".to_string()),
            ("sort_order", "desc".to_string()),
        ];
        if let Some(search) = self.search.as_deref().filter(|s| !s.trim().is_empty()) {
            params.push(("search", search.to_string()));
        }
        if let Some(status) = self.status {
            params.push(("status", status.as_str().to_string()));
        }
        params
    }
}

/// One page of the user's scripts, without transcript bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptPage {
    #[serde(default)]
    pub scripts: Vec<Artifact>,
    #[serde(default)]
    pub total: u64,
    #[serde(default = "first_page")]
    pub page: u64,
    #[serde(default)]
    pub pages: u64,
}

fn first_page() -> u64 {
    1
}

/// Identifiers arrive as strings or integers depending on the endpoint.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_id(self) -> Option<String> {
        match self {
            RawId::Text(text) if text.trim().is_empty() => None,
            RawId::Text(text) => Some(text),
            RawId::Number(n) => Some(n.to_string()),
        }
    }
}

fn optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?.and_then(RawId::into_id))
}

fn required_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer)?
        .into_id()
        .ok_or_else(|| serde::de::Error::custom("empty identifier"))
}

/// Accepts naive ISO-8601 timestamps as well as RFC 3339 ones.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };

    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.naive_utc()));
    }

    raw.parse::<NaiveDateTime>()
        .map(Some)
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(json: &str) -> Result<PollResult, ApiError> {
        let raw: StatusResponse = serde_json::from_str(json).unwrap();
        PollResult::try_from(raw)
    }

    #[test]
    fn test_status_mapping() {
        let result = status(r#"{"status":"processing","progress":40,"message":"Transcribing"}"#).unwrap();
        assert_eq!(result, PollResult::Processing(PollUpdate::new(40, "Transcribing")));

        let result = status(r#"{"status":"pending","progress":0,"message":"Task is waiting"}"#).unwrap();
        assert_eq!(result.status(), "processing");

        let result = status(r#"{"status":"completed","progress":100,"message":"done","script_id":17}"#).unwrap();
        assert_eq!(result.update().script_id.as_deref(), Some("17"));
        assert_eq!(result.status(), "completed");
    }

    #[test]
    fn test_status_rejects_unknown_values() {
        let err = status(r#"{"status":"exploded","progress":0,"message":""}"#).unwrap_err();
        assert!(matches!(err, ApiError::Protocol(_)));
    }

    #[test]
    fn test_progress_is_clamped() {
        let result = status(r#"{"status":"processing","progress":250}"#).unwrap();
        assert_eq!(result.update().progress, 100);
        let result = status(r#"{"status":"processing","progress":-3}"#).unwrap();
        assert_eq!(result.update().progress, 0);
    }

    #[test]
    fn test_empty_script_id_is_absent() {
        let handle: JobHandle = serde_json::from_str(r#"{"task_id":"t1","script_id":""}"#).unwrap();
        assert_eq!(handle.script_id, None);
        let handle: JobHandle = serde_json::from_str(r#"{"task_id":"t1","script_id":null}"#).unwrap();
        assert_eq!(handle.script_id, None);
        let handle: JobHandle = serde_json::from_str(r#"{"task_id":"t1"}"#).unwrap();
        assert_eq!(handle.script_id, None);
    }

    #[test]
    fn test_artifact_from_service_record() {
        let artifact: Artifact = serde_json::from_str(
            r#"{
                "id": 5,
                "user_id": 2,
                "video_url": "https://youtu.be/abc",
                "video_title": "Talk",
                "video_duration": 125,
                "status": "completed",
                "created_at": "2024-03-01T10:15:30.123456",
                "completed_at": "2024-03-01T10:20:00Z",
                "transcript_text": "hello",
                "formatted_script": null
            }"#,
        )
        .unwrap();

        assert_eq!(artifact.id, "5");
        assert_eq!(artifact.video_duration, Some(125));
        assert_eq!(artifact.body(), Some("hello"));
        assert!(artifact.created_at.is_some());
        assert!(artifact.completed_at.is_some());
    }

    #[test]
    fn test_placeholder() {
        let artifact = Artifact::placeholder("s1", "https://youtu.be/abc");
        assert_eq!(artifact.title(), Artifact::PLACEHOLDER_TITLE);
        assert_eq!(artifact.body(), Some(Artifact::PLACEHOLDER_SCRIPT));
        assert_eq!(artifact.status, "completed");
    }

    #[test]
    fn test_script_query_params() {
        let query = ScriptQuery {
            page: 3,
            per_page: 20,
            search: Some("rust".to_string()),
            status: Some(ScriptStatus::Failed),
        };
        let params = query.params();
        assert!(params.contains(&("skip", "40".to_string())));
        assert!(params.contains(&("limit", "20".to_string())));
        assert!(params.contains(&("search", "rust".to_string())));
        assert!(params.contains(&("status", "failed".to_string())));

        let params = ScriptQuery::default().params();
        assert!(params.contains(&("skip", "0".to_string())));
        assert!(!params.iter().any(|(key, _)| *key == "search" || *key == "status"));
    }

    #[test]
    fn test_script_page_from_listing() {
        let page: ScriptPage = serde_json::from_str(
            r#"{
                "scripts": [
                    {"id": 9, "user_id": 1, "video_url": "https://youtu.be/abc", "video_title": "Talk",
                     "video_duration": 60, "status": "completed", "created_at": "2024-03-01T10:15:30", "completed_at": null}
                ],
                "total": 11, "page": 2, "pages": 2
            }"#,
        )
        .unwrap();

        assert_eq!(page.total, 11);
        assert_eq!(page.scripts[0].id, "9");
        assert_eq!(page.scripts[0].body(), None);
    }

    #[test]
    fn test_export_format_names() {
        assert_eq!(ExportFormat::Excel.as_str(), "excel");
        assert_eq!(ExportFormat::Excel.extension(), "xlsx");
        assert_eq!(ExportFormat::default(), ExportFormat::Txt);
    }
}
