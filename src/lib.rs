//! Data-access and domain-rules core of a job-board application.
//!
//! Job seekers browse and apply to postings, employers post and manage
//! jobs and applicants, admins moderate users and bulk-publish jobs. This
//! crate is the layer between those surfaces and the document store: job
//! querying and filtering, the application lifecycle with counter
//! consistency, saved-job toggling, role-gated admin and employer
//! operations, bulk spreadsheet ingestion, and a session/authorization
//! context. It exposes no network listener or CLI of its own.

pub mod ai;
pub mod auth;
pub mod db;
pub mod excel;
pub mod models;
pub mod storage;
pub mod store;

pub use ai::{Advisor, ChatMessage};
pub use auth::{
    AuthBackend, AuthConfig, AuthContext, FileUnlockStore, Identity, MemoryUnlockStore,
    SessionState, SignUp, UnlockStore,
};
pub use db::{
    ApplicationWithJob, JobFilters, JobPatch, NewApplication, NewJob, NewProfile, ProfilePatch,
    Repository,
};
pub use excel::{BULK_JOB_HEADERS, JobRow, ParseOutcome};
pub use models::{
    AccountStatus, Application, ApplicationStatus, EmployerStatus, ExternalClick, FieldKind,
    FormField, Job, JobStatus, Millis, PostingMode, Profile, Role, normalize_role,
};
pub use storage::{BlobStore, FsBlobStore};
pub use store::{Query, Store};
