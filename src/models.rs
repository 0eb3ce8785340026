use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch, as assigned by the store.
pub type Millis = i64;

/// Accounts come in exactly three roles. Historical documents may carry
/// the legacy synonym "user" for job seekers, or junk values; both coerce
/// to [`Role::Seeker`] on deserialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Role {
    #[default]
    Seeker,
    Employer,
    Admin,
}

impl From<String> for Role {
    fn from(raw: String) -> Self {
        normalize_role(&raw)
    }
}

/// Coerce a raw role string to a canonical [`Role`]. "seeker" and the
/// legacy "user" are synonyms; anything unrecognized defaults to seeker.
pub fn normalize_role(raw: &str) -> Role {
    match raw {
        "seeker" | "user" => Role::Seeker,
        "employer" => Role::Employer,
        "admin" => Role::Admin,
        _ => Role::Seeker,
    }
}

/// Moderation gate for employer accounts; new employers start pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmployerStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Active,
    Paused,
    Closed,
}

/// Internal jobs collect applications in-app; external jobs redirect the
/// applicant to a third-party link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostingMode {
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Applied,
    Shortlisted,
    Interview,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Textarea,
    Number,
    Email,
    Select,
}

/// One field of an employer-defined application form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub id: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Account id; mirrors the document key.
    #[serde(default)]
    pub uid: String,
    pub email: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Role,
    /// Present only for employer accounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employer_status: Option<EmployerStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_level: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AccountStatus>,
    #[serde(default)]
    pub saved_job_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_url: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<Millis>,
    #[serde(
        default,
        deserialize_with = "lenient_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<Millis>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Mirrors the document key.
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_logo: Option<String>,
    pub location: String,
    /// Free text, e.g. "₹18-25 LPA". Never parsed numerically.
    pub salary: String,
    /// Free-text label: "Full-time", "Part-time", "Remote", ...
    pub employment_type: String,
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    pub employer_id: String,
    pub employer_name: String,
    pub status: JobStatus,
    pub posting_mode: PostingMode,
    /// Required when `posting_mode` is external.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_link: Option<String>,
    /// Custom application form for internal jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_schema: Option<Vec<FormField>>,
    #[serde(default)]
    pub view_count: u32,
    #[serde(default)]
    pub applicants_count: u32,
    #[serde(default)]
    pub featured: bool,
    #[serde(
        default,
        deserialize_with = "lenient_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<Millis>,
    #[serde(
        default,
        deserialize_with = "lenient_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<Millis>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    /// Mirrors the document key.
    #[serde(default)]
    pub id: String,
    pub job_id: String,
    pub applicant_id: String,
    pub applicant_name: String,
    pub applicant_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicant_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_url: Option<String>,
    pub status: ApplicationStatus,
    /// Free-form answers keyed by form-field id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_responses: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(
        default,
        deserialize_with = "lenient_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<Millis>,
}

/// Append-only log entry for an external-job redirect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalClick {
    #[serde(default)]
    pub id: String,
    pub job_id: String,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_millis")]
    pub timestamp: Option<Millis>,
}

/// Timestamps are opaque server-assigned values; anything that is not an
/// integer (missing, string leftovers from imports) reads as `None`, which
/// sorts as infinitely old.
pub(crate) fn lenient_millis<'de, D>(deserializer: D) -> Result<Option<Millis>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_i64()))
}
