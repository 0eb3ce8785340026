use anyhow::{Result, anyhow};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::db::{NewProfile, Repository};
use crate::models::{Profile, Role};

pub const DEFAULT_ADMIN_PIN: &str = "723899";
const ADMIN_PIN_ENV: &str = "JOBBOARD_ADMIN_PIN";

/// How long a signed-in session may sit in the loading state before the
/// flag is force-cleared, fetch outcome or not.
const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub admin_pin: String,
    pub load_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_pin: DEFAULT_ADMIN_PIN.to_string(),
            load_timeout: DEFAULT_LOAD_TIMEOUT,
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Self {
        Self {
            admin_pin: env::var(ADMIN_PIN_ENV).unwrap_or_else(|_| DEFAULT_ADMIN_PIN.to_string()),
            load_timeout: DEFAULT_LOAD_TIMEOUT,
        }
    }

    pub fn validate_pin(&self, pin: &str) -> bool {
        pin.trim() == self.admin_pin
    }
}

/// Identity reported by the authentication provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Authentication provider collaborator.
pub trait AuthBackend: Send + Sync {
    fn sign_in(&self, email: &str, password: &str) -> Result<Identity>;
    fn create_account(&self, email: &str, password: &str) -> Result<Identity>;
    fn sign_out(&self) -> Result<()>;
    fn update_display_name(&self, uid: &str, display_name: &str) -> Result<()>;
    fn current_identity(&self) -> Option<Identity>;
}

/// Per-session persistence for the elevated-admin marker. Both operations
/// are best-effort; failures cost at most a re-unlock.
pub trait UnlockStore: Send + Sync {
    fn read(&self) -> bool;
    fn write(&self, unlocked: bool);
}

/// Marker file under the user cache directory.
pub struct FileUnlockStore {
    path: PathBuf,
}

impl FileUnlockStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Self {
        let path = directories::ProjectDirs::from("", "", "jobboard")
            .map(|dirs| dirs.cache_dir().join("admin_unlocked"))
            .unwrap_or_else(|| PathBuf::from(".jobboard_admin_unlocked"));
        Self { path }
    }
}

impl UnlockStore for FileUnlockStore {
    fn read(&self) -> bool {
        self.path.exists()
    }

    fn write(&self, unlocked: bool) {
        let result = if unlocked {
            if let Some(parent) = self.path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            std::fs::write(&self.path, b"1")
        } else {
            match std::fs::remove_file(&self.path) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            }
        };
        if let Err(e) = result {
            debug!("admin unlock marker update failed: {e}");
        }
    }
}

#[derive(Default)]
pub struct MemoryUnlockStore(AtomicBool);

impl UnlockStore for MemoryUnlockStore {
    fn read(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn write(&self, unlocked: bool) {
        self.0.store(unlocked, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub user: Option<Identity>,
    pub profile: Option<Profile>,
    pub loading: bool,
    pub admin_unlocked: bool,
}

pub struct SignUp {
    pub display_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub job_title: Option<String>,
    pub experience_level: Option<String>,
    pub skills: Vec<String>,
}

/// Session and authorization context: tracks the signed-in identity, its
/// profile (kept live through a store subscription), a loading flag, and
/// the elevated-admin unlock. One context per process surface; it is the
/// sole writer of the unlock flag and the sole consumer of the provider's
/// identity stream.
///
/// Each identity change bumps a generation counter; background work from
/// a previous identity (the profile fetch, the loading timeout, watch
/// callbacks) checks the counter before touching state, so a stale fetch
/// can never clobber a newer session. A fetch that outlives the loading
/// timeout still lands its profile when it completes.
pub struct AuthContext {
    backend: Arc<dyn AuthBackend>,
    repo: Repository,
    unlock_store: Arc<dyn UnlockStore>,
    config: AuthConfig,
    state: Arc<Mutex<SessionState>>,
    generation: Arc<AtomicU64>,
    watch: Arc<Mutex<Option<crate::store::WatchToken>>>,
}

impl AuthContext {
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        repo: Repository,
        unlock_store: Arc<dyn UnlockStore>,
        config: AuthConfig,
    ) -> Self {
        let ctx = Self {
            state: Arc::new(Mutex::new(SessionState {
                user: None,
                profile: None,
                loading: true,
                admin_unlocked: unlock_store.read(),
            })),
            backend,
            repo,
            unlock_store,
            config,
            generation: Arc::new(AtomicU64::new(0)),
            watch: Arc::new(Mutex::new(None)),
        };
        let current = ctx.backend.current_identity();
        ctx.handle_identity(current);
        ctx
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().expect("session state poisoned")
    }

    fn clear_watch(&self) {
        let token = self.watch.lock().expect("watch slot poisoned").take();
        if let Some(token) = token {
            self.repo.unsubscribe(token);
        }
    }

    /// Apply an identity event from the provider. Signed out clears the
    /// profile and the elevated-admin unlock; signed in kicks off the
    /// profile fetch raced against the loading timeout, then a live
    /// profile subscription.
    pub fn handle_identity(&self, identity: Option<Identity>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.clear_watch();

        let Some(identity) = identity else {
            let mut st = self.state();
            st.user = None;
            st.profile = None;
            st.admin_unlocked = false;
            st.loading = false;
            drop(st);
            self.unlock_store.write(false);
            debug!("session signed out");
            return;
        };

        let uid = identity.uid.clone();
        {
            let mut st = self.state();
            st.user = Some(identity);
            st.loading = true;
        }

        let repo = self.repo.clone();
        let state = Arc::clone(&self.state);
        let generations = Arc::clone(&self.generation);
        let watch = Arc::clone(&self.watch);
        thread::spawn(move || {
            let fetched = repo.user_profile(&uid);
            if generations.load(Ordering::SeqCst) != generation {
                return;
            }
            // A failed fetch leaves a signed-in-but-profile-less session,
            // not a hard error.
            let profile = match fetched {
                Ok(profile) => profile,
                Err(e) => {
                    warn!("profile fetch failed for {uid}: {e}");
                    None
                }
            };
            {
                let mut st = state.lock().expect("session state poisoned");
                if generations.load(Ordering::SeqCst) != generation {
                    return;
                }
                st.profile = profile;
                st.loading = false;
            }

            let sub_state = Arc::clone(&state);
            let sub_generations = Arc::clone(&generations);
            let token = repo.subscribe_user_profile(&uid, move |profile| {
                if sub_generations.load(Ordering::SeqCst) == generation {
                    sub_state.lock().expect("session state poisoned").profile = profile;
                }
            });
            let mut slot = watch.lock().expect("watch slot poisoned");
            if generations.load(Ordering::SeqCst) == generation {
                *slot = Some(token);
            } else {
                repo.unsubscribe(token);
            }
        });

        let state = Arc::clone(&self.state);
        let generations = Arc::clone(&self.generation);
        let timeout = self.config.load_timeout;
        thread::spawn(move || {
            thread::sleep(timeout);
            if generations.load(Ordering::SeqCst) != generation {
                return;
            }
            let mut st = state.lock().expect("session state poisoned");
            if st.loading {
                debug!("profile load timed out, clearing loading flag");
                st.loading = false;
            }
        });
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<()> {
        let identity = self.backend.sign_in(email, password)?;
        self.handle_identity(Some(identity));
        Ok(())
    }

    /// Create an account and its profile. Admin accounts cannot
    /// self-register; employer profiles start pending approval.
    pub fn sign_up(&self, email: &str, password: &str, data: SignUp) -> Result<()> {
        if data.role == Role::Admin {
            return Err(anyhow!(
                "Invalid role. Only seeker or employer accounts can be registered."
            ));
        }
        let mut identity = self.backend.create_account(email, password)?;
        self.backend
            .update_display_name(&identity.uid, &data.display_name)?;
        identity.display_name = Some(data.display_name.clone());
        self.repo.create_user_profile(
            &identity.uid,
            NewProfile {
                email: identity.email.clone(),
                display_name: data.display_name,
                phone: data.phone,
                role: data.role,
                job_title: data.job_title,
                experience_level: data.experience_level,
                skills: data.skills,
            },
        )?;
        self.handle_identity(Some(identity));
        Ok(())
    }

    pub fn sign_out(&self) -> Result<()> {
        self.lock_admin();
        self.backend.sign_out()?;
        self.handle_identity(None);
        Ok(())
    }

    /// Second-factor gate for admin surfaces: a PIN on top of an already
    /// signed-in admin account. The unlock persists for the session.
    pub fn unlock_admin(&self, pin: &str) -> Result<()> {
        if !self.config.validate_pin(pin) {
            return Err(anyhow!("Invalid admin PIN"));
        }
        let (user, profile) = {
            let st = self.state();
            (st.user.clone(), st.profile.clone())
        };
        let Some(user) = user else {
            return Err(anyhow!("Please sign in first."));
        };
        let profile = match profile {
            Some(profile) => Some(profile),
            None => self.repo.user_profile(&user.uid)?,
        };
        if profile.map(|p| p.role) != Some(Role::Admin) {
            return Err(anyhow!("This account is not an admin."));
        }
        self.state().admin_unlocked = true;
        self.unlock_store.write(true);
        Ok(())
    }

    pub fn lock_admin(&self) {
        self.state().admin_unlocked = false;
        self.unlock_store.write(false);
    }

    /// Credential sign-in, PIN check and role check in one step. If the
    /// authenticated account turns out not to be an admin, the sign-in is
    /// rolled back.
    pub fn admin_login(&self, pin: &str, email: &str, password: &str) -> Result<()> {
        if !self.config.validate_pin(pin) {
            return Err(anyhow!("Invalid admin PIN"));
        }
        let identity = self.backend.sign_in(email, password)?;
        self.handle_identity(Some(identity.clone()));
        let profile = self.repo.user_profile(&identity.uid)?;
        if profile.map(|p| p.role) != Some(Role::Admin) {
            self.backend.sign_out()?;
            self.handle_identity(None);
            return Err(anyhow!("This account is not an admin."));
        }
        self.state().admin_unlocked = true;
        self.unlock_store.write(true);
        Ok(())
    }

    pub fn snapshot(&self) -> SessionState {
        self.state().clone()
    }

    pub fn loading(&self) -> bool {
        self.state().loading
    }

    pub fn admin_unlocked(&self) -> bool {
        self.state().admin_unlocked
    }

    pub fn is_admin(&self) -> bool {
        self.state()
            .profile
            .as_ref()
            .is_some_and(|p| p.role == Role::Admin)
    }

    pub fn is_employer(&self) -> bool {
        self.state()
            .profile
            .as_ref()
            .is_some_and(|p| p.role == Role::Employer)
    }
}

impl Drop for AuthContext {
    fn drop(&mut self) {
        self.clear_watch();
    }
}
