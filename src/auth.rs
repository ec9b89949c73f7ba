//! Local authentication gate.
//!
//! One system account guards the app. The password is stored as a bcrypt
//! hash in the persistent store (never plaintext), alongside a device-bound
//! recovery key generated on first run — this is a local-first app, so
//! "forgot password" is a recovery-key check rather than an email flow.
//! Sessions are in-memory only and die with the process.

use std::sync::Mutex;

use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock;
use crate::store::Store;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const MIN_USERNAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 4;

/// First-run seed account (the operator is told to change it).
const DEFAULT_USERNAME: &str = "admin";
const DEFAULT_PASSWORD: &str = "1234";

const KEY_USERNAME: &str = "username";
const KEY_PASSWORD_HASH: &str = "password_hash";
const KEY_RECOVERY_KEY: &str = "recovery_key";
const KEY_RECOVERY_EMAIL: &str = "recovery_email";

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// The active login session, if any.
#[derive(Clone)]
struct Session {
    session_id: String,
    username: String,
    login_time: String,
}

impl Session {
    fn to_json(&self) -> Value {
        serde_json::json!({
            "sessionId": self.session_id,
            "username": self.username,
            "loginTime": self.login_time,
        })
    }
}

/// Managed auth state.
pub struct AuthState {
    current: Mutex<Option<Session>>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthState {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

/// Seed the default account and the device recovery key on first run.
///
/// The recovery key is logged once at startup so the operator can write it
/// down; after that it is only visible on the settings screen.
pub fn ensure_defaults(store: &Store) -> Result<(), String> {
    if store.get_credential(KEY_USERNAME).is_none() {
        store.set_credential(KEY_USERNAME, DEFAULT_USERNAME)?;
    }
    if store.get_credential(KEY_PASSWORD_HASH).is_none() {
        let hash = hash_password(DEFAULT_PASSWORD)?;
        store.set_credential(KEY_PASSWORD_HASH, &hash)?;
    }
    if store.get_credential(KEY_RECOVERY_KEY).is_none() {
        let key = generate_recovery_key();
        store.set_credential(KEY_RECOVERY_KEY, &key)?;
        info!(recovery_key = %key, "generated device recovery key, write it down");
    }
    Ok(())
}

fn generate_recovery_key() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("SAMA-{}", raw[..6].to_uppercase())
}

fn hash_password(password: &str) -> Result<String, String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| format!("hash password: {e}"))
}

fn verify_password(store: &Store, password: &str) -> Result<bool, String> {
    let hash = store
        .get_credential(KEY_PASSWORD_HASH)
        .ok_or("No system password configured")?;
    bcrypt::verify(password, &hash).map_err(|e| format!("verify password: {e}"))
}

// ---------------------------------------------------------------------------
// Login / logout
// ---------------------------------------------------------------------------

/// Check the credential pair and open a session.
pub fn login(
    store: &Store,
    auth: &AuthState,
    username: &str,
    password: &str,
) -> Result<Value, String> {
    let stored_username = store
        .get_credential(KEY_USERNAME)
        .unwrap_or_else(|| DEFAULT_USERNAME.to_string());

    if username.trim() != stored_username || !verify_password(store, password)? {
        warn!("failed login attempt");
        return Err("Invalid credentials".to_string());
    }

    let session = Session {
        session_id: Uuid::new_v4().to_string(),
        username: stored_username,
        login_time: clock::now_rfc3339(),
    };
    let json = session.to_json();
    *auth.current.lock().map_err(|e| e.to_string())? = Some(session);

    info!("login successful");
    Ok(json)
}

pub fn logout(auth: &AuthState) {
    if let Ok(mut guard) = auth.current.lock() {
        *guard = None;
    }
}

/// The active session, or `None` when logged out.
pub fn current_session(auth: &AuthState) -> Option<Value> {
    auth.current
        .lock()
        .ok()
        .and_then(|guard| guard.as_ref().map(Session::to_json))
}

// ---------------------------------------------------------------------------
// Credential management
// ---------------------------------------------------------------------------

/// Change username and (optionally) password after re-authenticating.
pub fn update_security(
    store: &Store,
    new_username: &str,
    current_password: &str,
    new_password: Option<&str>,
) -> Result<(), String> {
    if !verify_password(store, current_password)? {
        return Err("Current password incorrect".to_string());
    }

    let new_username = new_username.trim();
    if new_username.len() < MIN_USERNAME_LEN {
        return Err(format!(
            "Username must be at least {MIN_USERNAME_LEN} characters"
        ));
    }
    if let Some(pw) = new_password {
        if pw.len() < MIN_PASSWORD_LEN {
            return Err(format!(
                "New password must be at least {MIN_PASSWORD_LEN} characters"
            ));
        }
    }

    store.set_credential(KEY_USERNAME, new_username)?;
    if let Some(pw) = new_password {
        let hash = hash_password(pw)?;
        store.set_credential(KEY_PASSWORD_HASH, &hash)?;
    }

    info!("security credentials updated");
    Ok(())
}

/// Reset the password with the device recovery key.
pub fn recover_password(
    store: &Store,
    recovery_key: &str,
    new_password: &str,
) -> Result<(), String> {
    let stored_key = store
        .get_credential(KEY_RECOVERY_KEY)
        .ok_or("Password recovery is not set up on this device")?;

    if recovery_key.trim() != stored_key {
        warn!("invalid recovery key presented");
        return Err("Invalid recovery key".to_string());
    }
    if new_password.len() < MIN_PASSWORD_LEN {
        return Err(format!(
            "New password must be at least {MIN_PASSWORD_LEN} characters"
        ));
    }

    let hash = hash_password(new_password)?;
    store.set_credential(KEY_PASSWORD_HASH, &hash)?;
    info!("password reset via recovery key");
    Ok(())
}

/// The device recovery key (settings screen display).
pub fn recovery_key(store: &Store) -> Option<String> {
    store.get_credential(KEY_RECOVERY_KEY)
}

pub fn recovery_email(store: &Store) -> Option<String> {
    store.get_credential(KEY_RECOVERY_EMAIL)
}

pub fn set_recovery_email(store: &Store, email: &str) -> Result<(), String> {
    store.set_credential(KEY_RECOVERY_EMAIL, email.trim())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::NoopMirror;
    use crate::db;
    use std::sync::Arc;

    fn setup() -> (Store, AuthState) {
        let store = Store::new(db::init_in_memory().expect("db"), Arc::new(NoopMirror));
        ensure_defaults(&store).expect("defaults");
        (store, AuthState::new())
    }

    #[test]
    fn default_account_can_log_in() {
        let (store, auth) = setup();
        let session = login(&store, &auth, "admin", "1234").expect("login");
        assert_eq!(
            session.get("username").and_then(Value::as_str),
            Some("admin")
        );
        assert!(current_session(&auth).is_some());

        logout(&auth);
        assert!(current_session(&auth).is_none());
    }

    #[test]
    fn wrong_credentials_are_rejected() {
        let (store, auth) = setup();
        assert!(login(&store, &auth, "admin", "wrong").is_err());
        assert!(login(&store, &auth, "somebody", "1234").is_err());
        assert!(current_session(&auth).is_none());
    }

    #[test]
    fn password_is_never_stored_in_plaintext() {
        let (store, _) = setup();
        let stored = store.get_credential("password_hash").expect("hash present");
        assert_ne!(stored, "1234");
        assert!(stored.starts_with("$2"), "expected a bcrypt hash");
    }

    #[test]
    fn update_security_enforces_rules() {
        let (store, auth) = setup();

        assert!(update_security(&store, "newadmin", "wrong", None).is_err());
        assert!(update_security(&store, "ab", "1234", None).is_err());
        assert!(update_security(&store, "newadmin", "1234", Some("123")).is_err());

        update_security(&store, "newadmin", "1234", Some("s3cret")).expect("update");
        assert!(login(&store, &auth, "newadmin", "s3cret").is_ok());
        assert!(login(&store, &auth, "admin", "1234").is_err());
    }

    #[test]
    fn recovery_key_resets_the_password() {
        let (store, auth) = setup();
        let key = recovery_key(&store).expect("key generated");
        assert!(key.starts_with("SAMA-"));

        assert!(recover_password(&store, "SAMA-WRONG1", "newpass").is_err());
        assert!(recover_password(&store, &key, "abc").is_err());

        recover_password(&store, &key, "newpass").expect("reset");
        assert!(login(&store, &auth, "admin", "newpass").is_ok());
    }

    #[test]
    fn recovery_key_is_stable_across_bootstraps() {
        let (store, _) = setup();
        let first = recovery_key(&store).expect("key");
        ensure_defaults(&store).expect("re-run");
        assert_eq!(recovery_key(&store).as_deref(), Some(first.as_str()));
    }
}
