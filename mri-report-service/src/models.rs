use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ReportError;

/// Where a session stands in the review workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    AwaitingKey,
    AwaitingUpload,
    Extracted,
    Generated,
    Rated,
}

impl WorkflowState {
    pub fn has_report(self) -> bool {
        matches!(self, Self::Extracted | Self::Generated | Self::Rated)
    }

    pub fn has_generated_reports(self) -> bool {
        matches!(self, Self::Generated | Self::Rated)
    }
}

/// The three texts generated from one MRI report, in generation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Summary,
    PatientFriendly,
    Recommendation,
}

impl ReportKind {
    pub const ALL: [ReportKind; 3] = [
        ReportKind::Summary,
        ReportKind::PatientFriendly,
        ReportKind::Recommendation,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Self::Summary => "Summary",
            Self::PatientFriendly => "Patient-Friendly Report",
            Self::Recommendation => "Recommendations",
        }
    }

    pub fn rating_label(self) -> &'static str {
        match self {
            Self::Summary => "Summary Quality",
            Self::PatientFriendly => "Patient-Friendly Report Quality",
            Self::Recommendation => "Recommendation Quality",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedReports {
    pub summary: Option<String>,
    pub patient_friendly: Option<String>,
    pub recommendation: Option<String>,
}

impl GeneratedReports {
    pub fn get(&self, kind: ReportKind) -> Option<&str> {
        match kind {
            ReportKind::Summary => self.summary.as_deref(),
            ReportKind::PatientFriendly => self.patient_friendly.as_deref(),
            ReportKind::Recommendation => self.recommendation.as_deref(),
        }
    }

    pub fn set(&mut self, kind: ReportKind, text: String) {
        let slot = match kind {
            ReportKind::Summary => &mut self.summary,
            ReportKind::PatientFriendly => &mut self.patient_friendly,
            ReportKind::Recommendation => &mut self.recommendation,
        };
        *slot = Some(text);
    }

    pub fn is_complete(&self) -> bool {
        ReportKind::ALL.iter().all(|kind| self.get(*kind).is_some())
    }

    /// Texts that exist so far, in generation order.
    pub fn ordered(&self) -> Vec<GeneratedText> {
        ReportKind::ALL
            .iter()
            .filter_map(|kind| {
                self.get(*kind).map(|text| GeneratedText {
                    kind: *kind,
                    title: kind.title().to_string(),
                    text: text.to_string(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedText {
    pub kind: ReportKind,
    pub title: String,
    pub text: String,
}

/// Reviewer score for one generated text, 1 to 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Result<Self, ReportError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ReportError::Input(format!(
                "Rating must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                value
            )))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Rating {
    fn default() -> Self {
        Self(3)
    }
}

impl TryFrom<u8> for Rating {
    type Error = ReportError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Rating::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratings {
    #[serde(default)]
    pub summary: Rating,
    #[serde(default)]
    pub patient_friendly: Rating,
    #[serde(default)]
    pub recommendation: Rating,
}

impl Ratings {
    pub fn get(&self, kind: ReportKind) -> Rating {
        match kind {
            ReportKind::Summary => self.summary,
            ReportKind::PatientFriendly => self.patient_friendly,
            ReportKind::Recommendation => self.recommendation,
        }
    }
}

/// Reviewer's answer to "Does the result have instances of artificial hallucinations?"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HallucinationFlag {
    Yes,
    #[default]
    No,
}

impl fmt::Display for HallucinationFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yes => f.write_str("Yes"),
            Self::No => f.write_str("No"),
        }
    }
}

/// Body of a "Submit Ratings" action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSubmission {
    #[serde(default)]
    pub ratings: Ratings,
    #[serde(default)]
    pub hallucination: HallucinationFlag,
    #[serde(default)]
    pub comment: Option<String>,
}

impl ReviewSubmission {
    /// Comment is kept only alongside a `Yes` flag, as an empty string if none was typed.
    pub fn normalized(mut self) -> Self {
        self.comment = match self.hallucination {
            HallucinationFlag::Yes => Some(self.comment.unwrap_or_default()),
            HallucinationFlag::No => None,
        };
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordCounts {
    pub original: usize,
    pub summary: usize,
    pub patient_friendly: usize,
    pub recommendation: usize,
}

impl WordCounts {
    pub fn compute(original: &str, reports: &GeneratedReports) -> Self {
        let count = |kind| reports.get(kind).map(word_count).unwrap_or(0);
        Self {
            original: word_count(original),
            summary: count(ReportKind::Summary),
            patient_friendly: count(ReportKind::PatientFriendly),
            recommendation: count(ReportKind::Recommendation),
        }
    }
}

/// Number of whitespace-delimited tokens.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Everything one session has collected about the uploaded MRI report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MriReport {
    pub id: String,
    pub file_name: Option<String>,
    pub report_text: Option<String>,
    pub reports: GeneratedReports,
    pub review: Option<ReviewSubmission>,
    pub word_counts: Option<WordCounts>,
    pub exported_path: Option<String>,
}

impl MriReport {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Drop everything produced from the previous report text.
    pub fn clear_derived(&mut self) {
        self.reports = GeneratedReports::default();
        self.review = None;
        self.word_counts = None;
        self.exported_path = None;
    }
}

/// Serialized alongside a session whenever a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Input,
    Auth,
    Upstream,
    Export,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub kind: FailureKind,
    pub step: Option<ReportKind>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartSessionRequest {
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiKeyRequest {
    pub api_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadQuery {
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportLink {
    pub file_name: String,
    pub mime_type: String,
    pub download_url: String,
}

/// What the caller sees after each action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub state: WorkflowState,
    pub current_task: String,
    pub status_message: Option<String>,
    pub message: Option<String>,
    pub has_api_key: bool,
    pub file_name: Option<String>,
    pub report_text: Option<String>,
    pub reports: Vec<GeneratedText>,
    pub review: Option<ReviewSubmission>,
    pub word_counts: Option<WordCounts>,
    pub export: Option<ExportLink>,
    pub failure: Option<StepFailure>,
}
