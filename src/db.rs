use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::{
    AccountStatus, Application, ApplicationStatus, EmployerStatus, FieldKind, FormField, Job,
    JobStatus, Millis, PostingMode, Profile, Role,
};
use crate::store::{Query, Store, WatchToken};

const USERS: &str = "users";
const JOBS: &str = "jobs";
const APPLICATIONS: &str = "applications";
const EXTERNAL_CLICKS: &str = "external_clicks";

/// Raw records pulled from storage before in-memory filtering.
const DEFAULT_FETCH_WINDOW: usize = 100;
/// Jobs returned to the caller when no limit is given.
const DEFAULT_RETURN_LIMIT: usize = 50;
/// Admin roster is capped rather than unbounded.
const ADMIN_JOBS_CAP: usize = 500;

/// Typed operations over the profile, job, application and click-log
/// collections. Counter updates (view count, applicants count, saved-job
/// list) are sequential read-then-write round trips, not atomic: concurrent
/// writers can lose updates, and callers accept eventually-approximate
/// counters. Bulk job deletion is the one batched atomic commit.
#[derive(Clone)]
pub struct Repository {
    store: Arc<Store>,
}

// --- Inputs ---

#[derive(Debug, Clone)]
pub struct NewProfile {
    pub email: String,
    pub display_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub job_title: Option<String>,
    pub experience_level: Option<String>,
    pub skills: Vec<String>,
}

/// Owner-editable profile fields; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_url: Option<String>,
}

/// Posting payload. `None` fields are omitted from the stored document.
#[derive(Debug, Clone, Serialize)]
pub struct NewJob {
    pub title: String,
    pub company: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_logo: Option<String>,
    pub location: String,
    pub salary: String,
    pub employment_type: String,
    pub description: String,
    pub requirements: Vec<String>,
    pub employer_id: String,
    pub employer_name: String,
    pub status: JobStatus,
    pub posting_mode: PostingMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_schema: Option<Vec<FormField>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct JobPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_logo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employment_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posting_mode: Option<PostingMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_schema: Option<Vec<FormField>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
}

/// Listing filters, applied as an intersection. Every field is optional;
/// an absent filter places no restriction on that dimension.
#[derive(Debug, Clone, Default)]
pub struct JobFilters {
    /// Matched against the title (substring, case-insensitive) or the
    /// employment type (exact).
    pub category: Option<String>,
    /// Fetch window and return cap; defaults to 100 fetched / 50 returned.
    pub limit: Option<usize>,
    /// Case-insensitive substring match on location.
    pub location: Option<String>,
    /// Accepted for interface parity but never applied: salaries are free
    /// text and no numeric interpretation is defined.
    pub salary_min: Option<String>,
    /// Case-insensitive membership against job requirements.
    pub skills: Option<Vec<String>>,
    pub posting_mode: Option<PostingMode>,
    /// Exact match on the employment-type label.
    pub employment_type: Option<String>,
    /// When set, only featured jobs are returned.
    pub featured: bool,
}

#[derive(Debug, Clone)]
pub struct NewApplication {
    pub job_id: String,
    pub applicant_id: String,
    pub applicant_name: String,
    pub applicant_email: String,
    pub applicant_phone: Option<String>,
    pub resume_url: Option<String>,
    pub form_responses: Option<Map<String, Value>>,
}

#[derive(Debug, Clone)]
pub struct ApplicationWithJob {
    pub application: Application,
    /// Absent when the posting has since been deleted.
    pub job: Option<Job>,
}

impl Repository {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    // --- Profiles ---

    pub fn user_profile(&self, uid: &str) -> Result<Option<Profile>> {
        match self.store.get(USERS, uid)? {
            Some(doc) => Ok(Some(profile_from_doc(uid.to_string(), doc)?)),
            None => Ok(None),
        }
    }

    pub fn create_user_profile(&self, uid: &str, new: NewProfile) -> Result<()> {
        let profile = Profile {
            uid: uid.to_string(),
            email: new.email,
            display_name: new.display_name,
            phone: new.phone,
            role: new.role,
            employer_status: (new.role == Role::Employer).then_some(EmployerStatus::Pending),
            job_title: new.job_title,
            experience_level: new.experience_level,
            skills: new.skills,
            status: None,
            saved_job_ids: Vec::new(),
            resume_url: None,
            created_at: Some(Store::server_now()),
            updated_at: None,
        };
        self.store.set(USERS, uid, &serde_json::to_value(&profile)?)
    }

    pub fn update_user_profile(&self, uid: &str, patch: &ProfilePatch) -> Result<()> {
        self.store.merge(USERS, uid, &stamped(patch)?)
    }

    /// Watch a profile; the callback receives the re-normalized profile on
    /// every remote change, or `None` once the document is gone.
    pub fn subscribe_user_profile(
        &self,
        uid: &str,
        callback: impl Fn(Option<Profile>) + Send + Sync + 'static,
    ) -> WatchToken {
        let key = uid.to_string();
        let uid = key.clone();
        self.store.subscribe(USERS, &key, move |doc| {
            let profile = doc.and_then(|d| profile_from_doc(uid.clone(), d).ok());
            callback(profile);
        })
    }

    pub fn unsubscribe(&self, token: WatchToken) {
        self.store.unsubscribe(token);
    }

    // --- Jobs ---

    /// Fetch a bounded window of postings, keep the active ones sorted
    /// newest-first, intersect all provided filters, and truncate to the
    /// return cap.
    pub fn list_jobs(&self, filters: &JobFilters) -> Result<Vec<Job>> {
        let fetch = filters.limit.unwrap_or(DEFAULT_FETCH_WINDOW);
        let raw = self.store.query(JOBS, &Query::new().limit(fetch))?;
        let mut jobs = raw
            .into_iter()
            .map(|(id, doc)| job_from_doc(id, doc))
            .collect::<Result<Vec<_>>>()?;

        jobs.retain(|j| j.status == JobStatus::Active);
        jobs.sort_by(|a, b| ts(b.created_at).cmp(&ts(a.created_at)));

        if filters.featured {
            jobs.retain(|j| j.featured);
        }
        if let Some(location) = cleaned(&filters.location) {
            let needle = location.to_lowercase();
            jobs.retain(|j| j.location.to_lowercase().contains(&needle));
        }
        if let Some(employment_type) = cleaned(&filters.employment_type) {
            jobs.retain(|j| j.employment_type == employment_type);
        }
        if let Some(mode) = filters.posting_mode {
            jobs.retain(|j| j.posting_mode == mode);
        }
        if let Some(skills) = filters.skills.as_ref().filter(|s| !s.is_empty()) {
            let wanted: HashSet<String> = skills.iter().map(|s| s.to_lowercase()).collect();
            jobs.retain(|j| {
                j.requirements
                    .iter()
                    .any(|r| wanted.contains(&r.to_lowercase()))
            });
        }
        if let Some(category) = cleaned(&filters.category) {
            let needle = category.to_lowercase();
            jobs.retain(|j| {
                j.title.to_lowercase().contains(&needle) || j.employment_type == category
            });
        }

        jobs.truncate(filters.limit.unwrap_or(DEFAULT_RETURN_LIMIT));
        Ok(jobs)
    }

    pub fn get_job(&self, id: &str) -> Result<Option<Job>> {
        match self.store.get(JOBS, id)? {
            Some(doc) => Ok(Some(job_from_doc(id.to_string(), doc)?)),
            None => Ok(None),
        }
    }

    /// Read-then-write view counter; concurrent views may undercount.
    pub fn record_view(&self, job_id: &str) -> Result<()> {
        if let Some(job) = self.get_job(job_id)? {
            self.store.merge(
                JOBS,
                job_id,
                &json!({ "view_count": job.view_count + 1 }),
            )?;
        }
        Ok(())
    }

    pub fn create_job(&self, new: NewJob) -> Result<String> {
        match new.posting_mode {
            PostingMode::External => {
                if new.external_link.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    return Err(anyhow!("External jobs require an external link"));
                }
                if new.form_schema.as_ref().is_some_and(|s| !s.is_empty()) {
                    return Err(anyhow!("External jobs cannot carry an application form"));
                }
            }
            PostingMode::Internal => {}
        }
        let mut doc = serde_json::to_value(&new)?;
        let obj = doc
            .as_object_mut()
            .ok_or_else(|| anyhow!("Job payload must serialize to an object"))?;
        obj.insert("applicants_count".into(), json!(0));
        obj.insert("view_count".into(), json!(0));
        obj.insert("created_at".into(), json!(Store::server_now()));
        let id = self.store.add(JOBS, &doc)?;
        debug!(job = %id, title = %new.title, "created job");
        Ok(id)
    }

    pub fn update_job(&self, id: &str, patch: &JobPatch) -> Result<()> {
        self.store.merge(JOBS, id, &stamped(patch)?)
    }

    pub fn delete_job(&self, id: &str) -> Result<()> {
        self.store.delete(JOBS, id)
    }

    /// Single atomic multi-document delete.
    pub fn bulk_delete_jobs(&self, ids: &[String]) -> Result<()> {
        self.store.delete_many(JOBS, ids)
    }

    pub fn set_job_featured(&self, job_id: &str, featured: bool) -> Result<()> {
        self.store.merge(
            JOBS,
            job_id,
            &json!({ "featured": featured, "updated_at": Store::server_now() }),
        )
    }

    pub fn jobs_by_employer(&self, employer_id: &str) -> Result<Vec<Job>> {
        let raw = self
            .store
            .query(JOBS, &Query::new().filter("employer_id", employer_id))?;
        let mut jobs = raw
            .into_iter()
            .map(|(id, doc)| job_from_doc(id, doc))
            .collect::<Result<Vec<_>>>()?;
        jobs.sort_by(|a, b| ts(b.created_at).cmp(&ts(a.created_at)));
        Ok(jobs)
    }

    /// Every posting regardless of status, newest first, capped.
    pub fn all_jobs_for_admin(&self) -> Result<Vec<Job>> {
        let raw = self.store.query(
            JOBS,
            &Query::new().order_desc("created_at").limit(ADMIN_JOBS_CAP),
        )?;
        raw.into_iter().map(|(id, doc)| job_from_doc(id, doc)).collect()
    }

    // --- Applications ---

    /// The duplicate-application pre-check: callers look an application up
    /// before creating one. Creation itself enforces no uniqueness.
    pub fn find_application(&self, applicant_id: &str, job_id: &str) -> Result<Option<Application>> {
        let raw = self.store.query(
            APPLICATIONS,
            &Query::new()
                .filter("applicant_id", applicant_id)
                .filter("job_id", job_id),
        )?;
        match raw.into_iter().next() {
            Some((id, doc)) => Ok(Some(application_from_doc(id, doc)?)),
            None => Ok(None),
        }
    }

    pub fn applications_by_user(&self, applicant_id: &str) -> Result<Vec<ApplicationWithJob>> {
        let raw = self
            .store
            .query(APPLICATIONS, &Query::new().filter("applicant_id", applicant_id))?;
        let mut apps = raw
            .into_iter()
            .map(|(id, doc)| application_from_doc(id, doc))
            .collect::<Result<Vec<_>>>()?;
        apps.sort_by(|a, b| ts(b.created_at).cmp(&ts(a.created_at)));
        apps.into_iter()
            .map(|application| {
                let job = self.get_job(&application.job_id)?;
                Ok(ApplicationWithJob { application, job })
            })
            .collect()
    }

    pub fn applications_for_job(&self, job_id: &str) -> Result<Vec<Application>> {
        let raw = self
            .store
            .query(APPLICATIONS, &Query::new().filter("job_id", job_id))?;
        let mut apps = raw
            .into_iter()
            .map(|(id, doc)| application_from_doc(id, doc))
            .collect::<Result<Vec<_>>>()?;
        apps.sort_by(|a, b| ts(b.created_at).cmp(&ts(a.created_at)));
        Ok(apps)
    }

    /// Persist a submission with status `applied`, then bump the job's
    /// applicant counter (read-then-write). Required form fields are
    /// checked before anything is written. If the job disappears between
    /// submit and bump, the increment is skipped and the application
    /// stays behind as an orphan.
    pub fn create_application(&self, new: NewApplication) -> Result<String> {
        if let Some(job) = self.get_job(&new.job_id)? {
            validate_form_responses(&job, new.form_responses.as_ref())?;
        }

        let mut doc = json!({
            "job_id": new.job_id,
            "applicant_id": new.applicant_id,
            "applicant_name": new.applicant_name,
            "applicant_email": new.applicant_email,
            "status": ApplicationStatus::Applied,
            "created_at": Store::server_now(),
        });
        let obj = doc
            .as_object_mut()
            .ok_or_else(|| anyhow!("Application payload must serialize to an object"))?;
        if let Some(phone) = &new.applicant_phone {
            obj.insert("applicant_phone".into(), json!(phone));
        }
        if let Some(url) = &new.resume_url {
            obj.insert("resume_url".into(), json!(url));
        }
        if let Some(responses) = &new.form_responses {
            obj.insert("form_responses".into(), Value::Object(responses.clone()));
        }
        let id = self.store.add(APPLICATIONS, &doc)?;

        if let Some(job) = self.get_job(&new.job_id)? {
            self.store.merge(
                JOBS,
                &new.job_id,
                &json!({ "applicants_count": job.applicants_count + 1 }),
            )?;
        }
        Ok(id)
    }

    /// Direct status write; any transition is legal here, callers restrict
    /// what they offer.
    pub fn update_application_status(
        &self,
        app_id: &str,
        status: ApplicationStatus,
    ) -> Result<()> {
        self.store
            .merge(APPLICATIONS, app_id, &json!({ "status": status }))
    }

    /// Delete the application; if its job still exists, decrement the
    /// applicant counter, floored at zero.
    pub fn withdraw_application(&self, app_id: &str) -> Result<()> {
        let Some(doc) = self.store.get(APPLICATIONS, app_id)? else {
            return Ok(());
        };
        let application = application_from_doc(app_id.to_string(), doc)?;
        self.store.delete(APPLICATIONS, app_id)?;

        if let Some(job) = self.get_job(&application.job_id)? {
            self.store.merge(
                JOBS,
                &application.job_id,
                &json!({ "applicants_count": job.applicants_count.saturating_sub(1) }),
            )?;
        }
        Ok(())
    }

    // --- External clicks ---

    pub fn record_external_click(&self, job_id: &str, actor_id: Option<&str>) -> Result<String> {
        self.store.add(
            EXTERNAL_CLICKS,
            &json!({
                "job_id": job_id,
                "actor_id": actor_id,
                "timestamp": Store::server_now(),
            }),
        )
    }

    pub fn external_click_count(&self, job_id: &str) -> Result<usize> {
        let raw = self
            .store
            .query(EXTERNAL_CLICKS, &Query::new().filter("job_id", job_id))?;
        Ok(raw.len())
    }

    // --- Saved jobs ---

    pub fn saved_job_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let Some(doc) = self.store.get(USERS, user_id)? else {
            return Ok(Vec::new());
        };
        Ok(doc
            .get("saved_job_ids")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default())
    }

    /// Toggle membership and return the new saved state. The whole list is
    /// rewritten, so concurrent toggles by the same user are last-write-wins.
    pub fn toggle_saved_job(&self, user_id: &str, job_id: &str) -> Result<bool> {
        let mut ids = self.saved_job_ids(user_id)?;
        let saved = ids.iter().any(|id| id == job_id);
        if saved {
            ids.retain(|id| id != job_id);
        } else {
            ids.push(job_id.to_string());
        }
        self.store.merge(
            USERS,
            user_id,
            &json!({ "saved_job_ids": ids, "updated_at": Store::server_now() }),
        )?;
        Ok(!saved)
    }

    /// Resolve saved ids to jobs; ids whose posting has been deleted are
    /// dropped from the view without being cleaned from storage.
    pub fn saved_jobs(&self, user_id: &str) -> Result<Vec<Job>> {
        let ids = self.saved_job_ids(user_id)?;
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(job) = self.get_job(&id)? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    // --- Users (admin) ---

    pub fn all_users(&self) -> Result<Vec<Profile>> {
        let raw = self.store.query(USERS, &Query::new())?;
        raw.into_iter()
            .map(|(uid, doc)| profile_from_doc(uid, doc))
            .collect()
    }

    pub fn set_user_status(&self, uid: &str, status: AccountStatus) -> Result<()> {
        self.store.merge(
            USERS,
            uid,
            &json!({ "status": status, "updated_at": Store::server_now() }),
        )
    }

    pub fn set_employer_status(&self, uid: &str, status: EmployerStatus) -> Result<()> {
        self.store.merge(
            USERS,
            uid,
            &json!({ "employer_status": status, "updated_at": Store::server_now() }),
        )
    }

    // --- Seed ---

    /// Bootstrap demo postings, attributed to the given employer, only
    /// when the jobs collection is completely empty.
    pub fn seed_jobs_if_empty(&self, employer_id: &str, employer_name: &str) -> Result<()> {
        if !self.store.query(JOBS, &Query::new().limit(1))?.is_empty() {
            return Ok(());
        }
        info!("jobs collection is empty, seeding example postings");
        for job in seed_jobs(employer_id, employer_name) {
            self.create_job(job)?;
        }
        Ok(())
    }
}

fn ts(at: Option<Millis>) -> Millis {
    at.unwrap_or(0)
}

/// Trimmed, non-empty filter value; blank strings place no restriction.
fn cleaned(filter: &Option<String>) -> Option<&str> {
    filter
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn stamped<T: Serialize>(patch: &T) -> Result<Value> {
    let mut value = serde_json::to_value(patch)?;
    value
        .as_object_mut()
        .ok_or_else(|| anyhow!("Patch must serialize to an object"))?
        .insert("updated_at".into(), json!(Store::server_now()));
    Ok(value)
}

fn profile_from_doc(uid: String, doc: Value) -> Result<Profile> {
    let mut profile: Profile = serde_json::from_value(doc)
        .with_context(|| format!("Malformed profile document {uid}"))?;
    profile.uid = uid;
    Ok(profile)
}

fn job_from_doc(id: String, doc: Value) -> Result<Job> {
    let mut job: Job =
        serde_json::from_value(doc).with_context(|| format!("Malformed job document {id}"))?;
    job.id = id;
    Ok(job)
}

fn application_from_doc(id: String, doc: Value) -> Result<Application> {
    let mut application: Application = serde_json::from_value(doc)
        .with_context(|| format!("Malformed application document {id}"))?;
    application.id = id;
    Ok(application)
}

fn response_is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Internal jobs with a form schema require every `required` field to be
/// populated; external jobs collect applications off-site, never in-app.
fn validate_form_responses(job: &Job, responses: Option<&Map<String, Value>>) -> Result<()> {
    if job.posting_mode == PostingMode::External {
        return Err(anyhow!(
            "'{}' collects applications at an external link",
            job.title
        ));
    }
    let Some(schema) = &job.form_schema else {
        return Ok(());
    };
    for field in schema {
        if !field.required {
            continue;
        }
        let filled = responses
            .and_then(|r| r.get(&field.id))
            .is_some_and(|v| !response_is_blank(v));
        if !filled {
            return Err(anyhow!("Required field '{}' is missing", field.label));
        }
    }
    Ok(())
}

fn seed_jobs(employer_id: &str, employer_name: &str) -> Vec<NewJob> {
    vec![
        NewJob {
            title: "Senior React Developer".to_string(),
            company: "TechCorp".to_string(),
            company_logo: None,
            location: "Bangalore".to_string(),
            salary: "₹18-25 LPA".to_string(),
            employment_type: "Full-time".to_string(),
            description: "We are looking for a Senior React Developer to join our engineering team."
                .to_string(),
            requirements: vec![
                "React".to_string(),
                "TypeScript".to_string(),
                "Node.js".to_string(),
            ],
            employer_id: employer_id.to_string(),
            employer_name: employer_name.to_string(),
            status: JobStatus::Active,
            posting_mode: PostingMode::Internal,
            external_link: None,
            form_schema: Some(vec![
                FormField {
                    id: "exp".to_string(),
                    label: "Years of experience".to_string(),
                    kind: FieldKind::Number,
                    required: true,
                    options: None,
                },
                FormField {
                    id: "note".to_string(),
                    label: "Cover note".to_string(),
                    kind: FieldKind::Textarea,
                    required: false,
                    options: None,
                },
            ]),
        },
        NewJob {
            title: "Product Designer".to_string(),
            company: "DesignLab".to_string(),
            company_logo: None,
            location: "Mumbai".to_string(),
            salary: "₹12-18 LPA".to_string(),
            employment_type: "Remote".to_string(),
            description: "Join our design team.".to_string(),
            requirements: vec!["Figma".to_string(), "UI/UX".to_string()],
            employer_id: employer_id.to_string(),
            employer_name: employer_name.to_string(),
            status: JobStatus::Active,
            posting_mode: PostingMode::External,
            external_link: Some("https://example.com/apply".to_string()),
            form_schema: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> Repository {
        Repository::new(Arc::new(Store::open_in_memory().unwrap()))
    }

    fn sample_job(title: &str) -> NewJob {
        NewJob {
            title: title.to_string(),
            company: "Acme".to_string(),
            company_logo: None,
            location: "Pune".to_string(),
            salary: "₹10-15 LPA".to_string(),
            employment_type: "Full-time".to_string(),
            description: "Do the work.".to_string(),
            requirements: vec!["Rust".to_string(), "SQL".to_string()],
            employer_id: "emp-1".to_string(),
            employer_name: "Acme HR".to_string(),
            status: JobStatus::Active,
            posting_mode: PostingMode::Internal,
            external_link: None,
            form_schema: None,
        }
    }

    fn sample_application(job_id: &str, applicant_id: &str) -> NewApplication {
        NewApplication {
            job_id: job_id.to_string(),
            applicant_id: applicant_id.to_string(),
            applicant_name: "Asha".to_string(),
            applicant_email: "asha@example.com".to_string(),
            applicant_phone: None,
            resume_url: None,
            form_responses: None,
        }
    }

    #[test]
    fn test_list_jobs_excludes_inactive() {
        let repo = repo();
        repo.create_job(sample_job("Active role")).unwrap();
        let mut paused = sample_job("Paused role");
        paused.status = JobStatus::Paused;
        repo.create_job(paused).unwrap();
        let mut closed = sample_job("Closed role");
        closed.status = JobStatus::Closed;
        repo.create_job(closed).unwrap();

        let jobs = repo.list_jobs(&JobFilters::default()).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].title, "Active role");
        assert!(jobs.iter().all(|j| j.status == JobStatus::Active));
    }

    #[test]
    fn test_list_jobs_sorted_newest_first_missing_timestamps_oldest() {
        let repo = repo();
        // Write documents directly so creation times are controlled; the
        // middle one has a malformed timestamp and must sort last.
        for (id, at) in [("a", json!(100)), ("b", json!("garbage")), ("c", json!(300))] {
            let mut doc = serde_json::to_value(sample_job(id)).unwrap();
            doc.as_object_mut().unwrap().insert("created_at".into(), at);
            repo.store.set(JOBS, id, &doc).unwrap();
        }
        let jobs = repo.list_jobs(&JobFilters::default()).unwrap();
        let titles: Vec<&str> = jobs.iter().map(|j| j.title.as_str()).collect();
        assert_eq!(titles, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_list_jobs_filters_intersect_and_narrow() {
        let repo = repo();
        let mut remote = sample_job("Remote Rust Engineer");
        remote.location = "Remote, India".to_string();
        repo.create_job(remote).unwrap();
        let mut onsite = sample_job("Rust Engineer");
        onsite.location = "Chennai".to_string();
        onsite.requirements = vec!["Go".to_string()];
        repo.create_job(onsite).unwrap();
        repo.create_job(sample_job("Product Manager")).unwrap();

        let unfiltered = repo.list_jobs(&JobFilters::default()).unwrap();
        let one = repo
            .list_jobs(&JobFilters {
                category: Some("rust".to_string()),
                ..Default::default()
            })
            .unwrap();
        let two = repo
            .list_jobs(&JobFilters {
                category: Some("rust".to_string()),
                location: Some("remote".to_string()),
                ..Default::default()
            })
            .unwrap();
        let three = repo
            .list_jobs(&JobFilters {
                category: Some("rust".to_string()),
                location: Some("remote".to_string()),
                skills: Some(vec!["RUST".to_string()]),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(unfiltered.len(), 3);
        assert_eq!(one.len(), 2);
        assert_eq!(two.len(), 1);
        assert_eq!(three.len(), 1);
        // Monotonic narrowing: each result is a subset of the looser one.
        for job in &two {
            assert!(one.iter().any(|j| j.id == job.id));
        }
        for job in &three {
            assert!(two.iter().any(|j| j.id == job.id));
        }
    }

    #[test]
    fn test_list_jobs_category_matches_title_or_employment_type() {
        let repo = repo();
        let mut part_time = sample_job("Store Assistant");
        part_time.employment_type = "Part-time".to_string();
        repo.create_job(part_time).unwrap();
        repo.create_job(sample_job("Engineering Manager")).unwrap();

        let by_type = repo
            .list_jobs(&JobFilters {
                category: Some("Part-time".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_type.len(), 1);
        assert_eq!(by_type[0].title, "Store Assistant");

        let by_title = repo
            .list_jobs(&JobFilters {
                category: Some("engineering".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_title.len(), 1);
        assert_eq!(by_title[0].title, "Engineering Manager");
    }

    #[test]
    fn test_list_jobs_featured_and_mode_filters() {
        let repo = repo();
        let plain = repo.create_job(sample_job("Plain")).unwrap();
        let mut external = sample_job("External");
        external.posting_mode = PostingMode::External;
        external.external_link = Some("https://ext.example.com".to_string());
        repo.create_job(external).unwrap();
        repo.set_job_featured(&plain, true).unwrap();

        let featured = repo
            .list_jobs(&JobFilters {
                featured: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(featured.len(), 1);
        assert_eq!(featured[0].id, plain);

        let external_only = repo
            .list_jobs(&JobFilters {
                posting_mode: Some(PostingMode::External),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(external_only.len(), 1);
        assert_eq!(external_only[0].title, "External");
    }

    #[test]
    fn test_list_jobs_truncates_to_return_limit() {
        let repo = repo();
        for i in 0..55 {
            repo.create_job(sample_job(&format!("Job {i}"))).unwrap();
        }
        let jobs = repo.list_jobs(&JobFilters::default()).unwrap();
        assert_eq!(jobs.len(), 50);

        let capped = repo
            .list_jobs(&JobFilters {
                limit: Some(10),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(capped.len(), 10);
    }

    #[test]
    fn test_create_job_strips_absent_optional_fields() {
        let repo = repo();
        let id = repo.create_job(sample_job("Bare")).unwrap();
        let doc = repo.store.get(JOBS, &id).unwrap().unwrap();
        assert!(doc.get("external_link").is_none());
        assert!(doc.get("form_schema").is_none());
        assert_eq!(doc["applicants_count"], 0);
        assert_eq!(doc["view_count"], 0);
        assert!(doc["created_at"].is_i64());
    }

    #[test]
    fn test_create_job_external_requires_link_and_no_form() {
        let repo = repo();
        let mut linkless = sample_job("External");
        linkless.posting_mode = PostingMode::External;
        assert!(repo.create_job(linkless).is_err());

        let mut with_form = sample_job("External with form");
        with_form.posting_mode = PostingMode::External;
        with_form.external_link = Some("https://ext.example.com".to_string());
        with_form.form_schema = Some(vec![FormField {
            id: "q".to_string(),
            label: "Question".to_string(),
            kind: FieldKind::Text,
            required: true,
            options: None,
        }]);
        assert!(repo.create_job(with_form).is_err());
    }

    #[test]
    fn test_record_view_increments_and_tolerates_missing_job() {
        let repo = repo();
        let id = repo.create_job(sample_job("Viewed")).unwrap();
        repo.record_view(&id).unwrap();
        repo.record_view(&id).unwrap();
        assert_eq!(repo.get_job(&id).unwrap().unwrap().view_count, 2);
        repo.record_view("missing").unwrap();
    }

    #[test]
    fn test_application_lifecycle_counter_round_trip() {
        let repo = repo();
        let job_id = repo.create_job(sample_job("Open role")).unwrap();

        let app_id = repo
            .create_application(sample_application(&job_id, "user-1"))
            .unwrap();
        let job = repo.get_job(&job_id).unwrap().unwrap();
        assert_eq!(job.applicants_count, 1);

        let app = repo.find_application("user-1", &job_id).unwrap().unwrap();
        assert_eq!(app.id, app_id);
        assert_eq!(app.status, ApplicationStatus::Applied);

        repo.withdraw_application(&app_id).unwrap();
        assert_eq!(repo.get_job(&job_id).unwrap().unwrap().applicants_count, 0);
        assert!(repo.find_application("user-1", &job_id).unwrap().is_none());

        // Withdrawing again is a no-op and the counter stays floored.
        repo.withdraw_application(&app_id).unwrap();
        assert_eq!(repo.get_job(&job_id).unwrap().unwrap().applicants_count, 0);
    }

    #[test]
    fn test_create_application_orphan_when_job_missing() {
        let repo = repo();
        let app_id = repo
            .create_application(sample_application("gone-job", "user-1"))
            .unwrap();
        let app = repo.find_application("user-1", "gone-job").unwrap().unwrap();
        assert_eq!(app.id, app_id);
    }

    #[test]
    fn test_create_application_validates_required_form_fields() {
        let repo = repo();
        let mut job = sample_job("Form role");
        job.form_schema = Some(vec![
            FormField {
                id: "exp".to_string(),
                label: "Years of experience".to_string(),
                kind: FieldKind::Number,
                required: true,
                options: None,
            },
            FormField {
                id: "note".to_string(),
                label: "Cover note".to_string(),
                kind: FieldKind::Textarea,
                required: false,
                options: None,
            },
        ]);
        let job_id = repo.create_job(job).unwrap();

        // Missing required answer: rejected before persistence.
        let err = repo
            .create_application(sample_application(&job_id, "user-1"))
            .unwrap_err();
        assert!(err.to_string().contains("Years of experience"));
        assert!(repo.applications_for_job(&job_id).unwrap().is_empty());
        assert_eq!(repo.get_job(&job_id).unwrap().unwrap().applicants_count, 0);

        // Blank answers do not count as filled.
        let mut blank = sample_application(&job_id, "user-1");
        let mut responses = Map::new();
        responses.insert("exp".to_string(), json!("   "));
        blank.form_responses = Some(responses);
        assert!(repo.create_application(blank).is_err());

        // Populated answer: persisted with status applied, counter bumped.
        let mut ok = sample_application(&job_id, "user-1");
        let mut responses = Map::new();
        responses.insert("exp".to_string(), json!(4));
        ok.form_responses = Some(responses);
        repo.create_application(ok).unwrap();
        let apps = repo.applications_for_job(&job_id).unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].status, ApplicationStatus::Applied);
        assert_eq!(repo.get_job(&job_id).unwrap().unwrap().applicants_count, 1);
    }

    #[test]
    fn test_create_application_rejected_for_external_job() {
        let repo = repo();
        let mut job = sample_job("External role");
        job.posting_mode = PostingMode::External;
        job.external_link = Some("https://ext.example.com".to_string());
        let job_id = repo.create_job(job).unwrap();
        assert!(
            repo.create_application(sample_application(&job_id, "user-1"))
                .is_err()
        );
    }

    #[test]
    fn test_update_application_status_direct_write() {
        let repo = repo();
        let job_id = repo.create_job(sample_job("Role")).unwrap();
        let app_id = repo
            .create_application(sample_application(&job_id, "user-1"))
            .unwrap();
        repo.update_application_status(&app_id, ApplicationStatus::Interview)
            .unwrap();
        let app = repo.find_application("user-1", &job_id).unwrap().unwrap();
        assert_eq!(app.status, ApplicationStatus::Interview);
        // No transition validation: interview back to applied is accepted.
        repo.update_application_status(&app_id, ApplicationStatus::Applied)
            .unwrap();
    }

    #[test]
    fn test_applications_by_user_attaches_job_snapshot() {
        let repo = repo();
        let kept = repo.create_job(sample_job("Kept")).unwrap();
        let doomed = repo.create_job(sample_job("Doomed")).unwrap();
        repo.create_application(sample_application(&kept, "user-1"))
            .unwrap();
        repo.create_application(sample_application(&doomed, "user-1"))
            .unwrap();
        repo.delete_job(&doomed).unwrap();

        let apps = repo.applications_by_user("user-1").unwrap();
        assert_eq!(apps.len(), 2);
        let with_job = apps.iter().find(|a| a.application.job_id == kept).unwrap();
        assert_eq!(with_job.job.as_ref().unwrap().title, "Kept");
        let orphan = apps.iter().find(|a| a.application.job_id == doomed).unwrap();
        assert!(orphan.job.is_none());
    }

    #[test]
    fn test_toggle_saved_job_round_trip() {
        let repo = repo();
        repo.create_user_profile(
            "user-1",
            NewProfile {
                email: "u@example.com".to_string(),
                display_name: "U".to_string(),
                phone: None,
                role: Role::Seeker,
                job_title: None,
                experience_level: None,
                skills: vec![],
            },
        )
        .unwrap();

        assert!(repo.toggle_saved_job("user-1", "job-1").unwrap());
        assert_eq!(repo.saved_job_ids("user-1").unwrap(), vec!["job-1"]);
        assert!(!repo.toggle_saved_job("user-1", "job-1").unwrap());
        assert!(repo.saved_job_ids("user-1").unwrap().is_empty());
    }

    #[test]
    fn test_saved_jobs_drop_deleted_postings() {
        let repo = repo();
        repo.create_user_profile(
            "user-1",
            NewProfile {
                email: "u@example.com".to_string(),
                display_name: "U".to_string(),
                phone: None,
                role: Role::Seeker,
                job_title: None,
                experience_level: None,
                skills: vec![],
            },
        )
        .unwrap();
        let kept = repo.create_job(sample_job("Kept")).unwrap();
        let doomed = repo.create_job(sample_job("Doomed")).unwrap();
        repo.toggle_saved_job("user-1", &kept).unwrap();
        repo.toggle_saved_job("user-1", &doomed).unwrap();
        repo.delete_job(&doomed).unwrap();

        let jobs = repo.saved_jobs("user-1").unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, kept);
        // The stale id stays in storage, it just vanishes from the view.
        assert_eq!(repo.saved_job_ids("user-1").unwrap().len(), 2);
    }

    #[test]
    fn test_saved_ids_default_empty_for_unknown_user() {
        let repo = repo();
        assert!(repo.saved_job_ids("nobody").unwrap().is_empty());
        assert!(repo.toggle_saved_job("nobody", "job-1").is_err());
    }

    #[test]
    fn test_external_click_log() {
        let repo = repo();
        repo.record_external_click("job-1", Some("user-1")).unwrap();
        repo.record_external_click("job-1", None).unwrap();
        repo.record_external_click("job-2", None).unwrap();
        assert_eq!(repo.external_click_count("job-1").unwrap(), 2);
        assert_eq!(repo.external_click_count("job-2").unwrap(), 1);
        assert_eq!(repo.external_click_count("job-3").unwrap(), 0);
    }

    #[test]
    fn test_employer_roster_and_admin_roster() {
        let repo = repo();
        repo.create_job(sample_job("Mine")).unwrap();
        let mut other = sample_job("Theirs");
        other.employer_id = "emp-2".to_string();
        repo.create_job(other).unwrap();
        let mut paused = sample_job("Mine paused");
        paused.status = JobStatus::Paused;
        repo.create_job(paused).unwrap();

        let mine = repo.jobs_by_employer("emp-1").unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|j| j.employer_id == "emp-1"));

        // Admin roster includes non-active postings.
        let all = repo.all_jobs_for_admin().unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_bulk_delete_jobs() {
        let repo = repo();
        let a = repo.create_job(sample_job("A")).unwrap();
        let b = repo.create_job(sample_job("B")).unwrap();
        let c = repo.create_job(sample_job("C")).unwrap();
        repo.bulk_delete_jobs(&[a.clone(), c.clone()]).unwrap();
        assert!(repo.get_job(&a).unwrap().is_none());
        assert!(repo.get_job(&b).unwrap().is_some());
        assert!(repo.get_job(&c).unwrap().is_none());
    }

    #[test]
    fn test_all_users_normalizes_legacy_roles() {
        let repo = repo();
        repo.store
            .set(
                USERS,
                "legacy",
                &json!({
                    "email": "legacy@example.com",
                    "display_name": "Legacy",
                    "role": "user"
                }),
            )
            .unwrap();
        repo.store
            .set(
                USERS,
                "odd",
                &json!({
                    "email": "odd@example.com",
                    "display_name": "Odd",
                    "role": "superuser"
                }),
            )
            .unwrap();
        let users = repo.all_users().unwrap();
        assert_eq!(users.len(), 2);
        assert!(users.iter().all(|u| u.role == Role::Seeker));
    }

    #[test]
    fn test_employer_approval_flow() {
        let repo = repo();
        repo.create_user_profile(
            "emp-1",
            NewProfile {
                email: "hr@acme.com".to_string(),
                display_name: "Acme HR".to_string(),
                phone: None,
                role: Role::Employer,
                job_title: None,
                experience_level: None,
                skills: vec![],
            },
        )
        .unwrap();

        let profile = repo.user_profile("emp-1").unwrap().unwrap();
        assert_eq!(profile.employer_status, Some(EmployerStatus::Pending));

        repo.set_employer_status("emp-1", EmployerStatus::Approved)
            .unwrap();
        let users = repo.all_users().unwrap();
        let employer = users.iter().find(|u| u.uid == "emp-1").unwrap();
        assert_eq!(employer.employer_status, Some(EmployerStatus::Approved));
    }

    #[test]
    fn test_set_user_status() {
        let repo = repo();
        repo.create_user_profile(
            "user-1",
            NewProfile {
                email: "u@example.com".to_string(),
                display_name: "U".to_string(),
                phone: None,
                role: Role::Seeker,
                job_title: None,
                experience_level: None,
                skills: vec![],
            },
        )
        .unwrap();
        repo.set_user_status("user-1", AccountStatus::Suspended)
            .unwrap();
        let profile = repo.user_profile("user-1").unwrap().unwrap();
        assert_eq!(profile.status, Some(AccountStatus::Suspended));
    }

    #[test]
    fn test_update_job_stamps_update_time() {
        let repo = repo();
        let id = repo.create_job(sample_job("Before")).unwrap();
        repo.update_job(
            &id,
            &JobPatch {
                title: Some("After".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        let job = repo.get_job(&id).unwrap().unwrap();
        assert_eq!(job.title, "After");
        assert!(job.updated_at.is_some());
        // Untouched fields survive the patch.
        assert_eq!(job.company, "Acme");
    }

    #[test]
    fn test_seed_jobs_if_empty_is_idempotent() {
        let repo = repo();
        repo.seed_jobs_if_empty("emp-1", "Acme HR").unwrap();
        let seeded = repo.all_jobs_for_admin().unwrap();
        assert_eq!(seeded.len(), 2);

        repo.seed_jobs_if_empty("emp-1", "Acme HR").unwrap();
        assert_eq!(repo.all_jobs_for_admin().unwrap().len(), 2);
    }

    #[test]
    fn test_seed_skipped_when_jobs_exist() {
        let repo = repo();
        repo.create_job(sample_job("Existing")).unwrap();
        repo.seed_jobs_if_empty("emp-1", "Acme HR").unwrap();
        assert_eq!(repo.all_jobs_for_admin().unwrap().len(), 1);
    }
}
