//! Credential Store
//! Mission: Durable username -> user record mapping on a JSON file

use crate::auth::models::{Role, UserRecord};
use anyhow::{Context, Result};
use bcrypt::DEFAULT_COST;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use uuid::Uuid;

/// The account bootstrapped on first run. It cannot be deleted.
pub const BOOTSTRAP_ADMIN: &str = "admin";

/// Domain appended to generated addresses when a user is created without one.
pub const DEFAULT_EMAIL_DOMAIN: &str = "opsdeck.local";

#[derive(Debug, Default, Serialize, Deserialize)]
struct UsersFile {
    users: HashMap<String, UserRecord>,
}

/// File-backed credential store.
///
/// Writes are rare administrative actions; concurrent writers are
/// last-writer-wins and deliberately uncoordinated.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the users file on first run with a single admin account.
    ///
    /// The bootstrap password is generated, not fixed; it is returned exactly
    /// once so the caller can surface it, and must be rotated by the
    /// operator. Returns `None` when the file already exists. Fails only if
    /// the backing file cannot be written.
    pub async fn initialize(&self) -> Result<Option<String>> {
        if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(None);
        }

        let password = Uuid::new_v4().simple().to_string();
        let password_hash = hash_password(&password).await?;

        let admin = UserRecord::new(
            BOOTSTRAP_ADMIN,
            password_hash,
            Role::Admin,
            format!("{}@{}", BOOTSTRAP_ADMIN, DEFAULT_EMAIL_DOMAIN),
        );

        let mut users = HashMap::new();
        users.insert(admin.username.clone(), admin);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        self.write(&UsersFile { users })
            .await
            .with_context(|| format!("failed to create users file {}", self.path.display()))?;

        info!("Created default admin user at {}", self.path.display());
        Ok(Some(password))
    }

    /// Load all users. Read or parse failures are logged and yield an empty
    /// map; a corrupt store is treated as "no users", never as a request
    /// failure.
    pub async fn load(&self) -> HashMap<String, UserRecord> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(err) => {
                error!("Failed to read users file {}: {}", self.path.display(), err);
                return HashMap::new();
            }
        };

        match serde_json::from_str::<UsersFile>(&data) {
            Ok(file) => file.users,
            Err(err) => {
                error!(
                    "Failed to parse users file {}: {}",
                    self.path.display(),
                    err
                );
                HashMap::new()
            }
        }
    }

    /// Persist the full user map. Returns `false` on failure; callers must
    /// not assume the write landed.
    pub async fn save(&self, users: &HashMap<String, UserRecord>) -> bool {
        let file = UsersFile {
            users: users.clone(),
        };
        match self.write(&file).await {
            Ok(()) => true,
            Err(err) => {
                error!("Failed to save users file {}: {}", self.path.display(), err);
                false
            }
        }
    }

    async fn write(&self, file: &UsersFile) -> Result<()> {
        let data = serde_json::to_string_pretty(file).context("failed to serialize users")?;
        tokio::fs::write(&self.path, data)
            .await
            .context("failed to write users file")?;
        Ok(())
    }
}

/// Hash a password with bcrypt at the default cost.
///
/// bcrypt is deliberately slow; both helpers run on the blocking pool so a
/// login burst cannot stall the async executor.
pub async fn hash_password(password: &str) -> Result<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, DEFAULT_COST))
        .await
        .context("hashing task failed")?
        .context("failed to hash password")
}

/// Check a password against a stored hash. Any failure counts as a mismatch.
pub async fn verify_password(password: &str, hash: &str) -> bool {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || {
        bcrypt::verify(password, &hash).unwrap_or_else(|err| {
            warn!("bcrypt verify failed: {}", err);
            false
        })
    })
    .await
    .unwrap_or(false)
}
