//! Authentication support for the sync server.
//!
//! Two independent mechanisms live here:
//!
//! - [`ShareTokenService`] gates anonymous access. A share row binds a token
//!   to a scope and an Argon2 password hash; unlocking it yields a credential
//!   of the form `<expiry>|<hex HMAC-SHA256 of "token|expiry">`, presented
//!   on later requests as a cookie or header.
//! - [`ApiKeyValidator`] checks the bearer key of sync clients.
//!
//! Both compare secrets in constant time.

use crate::error::{ServerError, ServerResult};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use drivesync_core::{MetaStore, NormalizedPath, Share};
use hmac::{Hmac, Mac};
use password_hash::{PasswordHash, SaltString};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Length of generated share tokens.
pub const SHARE_TOKEN_LEN: usize = 40;

/// Prefix of the cookie carrying a share credential.
pub const SHARE_COOKIE_PREFIX: &str = "drivesync_share_";

/// Returns the cookie name for a share token.
pub fn share_cookie_name(token: &str) -> String {
    format!("{SHARE_COOKIE_PREFIX}{token}")
}

/// Strips a client-supplied token down to `[A-Za-z0-9_-]`.
pub fn sanitize_token(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Returns true if `path` is covered by a share scope.
///
/// A file scope covers only itself; a directory scope covers itself and
/// everything strictly below it.
pub fn within_scope(path: &NormalizedPath, scope: &NormalizedPath, scope_is_dir: bool) -> bool {
    if scope_is_dir {
        path.is_within(scope)
    } else {
        path == scope
    }
}

/// A signed share credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareCredential {
    /// Wire form, `<expiry>|<hex signature>`.
    pub value: String,
    /// Expiry, seconds since the epoch.
    pub expires_at: i64,
}

/// Issues and verifies share credentials and manages share rows.
pub struct ShareTokenService {
    mac: HmacSha256,
    ttl: Duration,
    meta: Arc<dyn MetaStore>,
}

impl ShareTokenService {
    /// Creates the service with an injected signing key.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidRequest`] if the key is empty.
    pub fn new(secret: &[u8], ttl: Duration, meta: Arc<dyn MetaStore>) -> ServerResult<Self> {
        if secret.is_empty() {
            return Err(ServerError::InvalidRequest(
                "share signing secret must not be empty".into(),
            ));
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| ServerError::Internal(format!("hmac key: {e}")))?;
        Ok(Self { mac, ttl, meta })
    }

    /// Issues a credential for `token` valid for the configured TTL.
    pub fn issue(&self, token: &str) -> ShareCredential {
        self.issue_at(token, Utc::now())
    }

    /// Issues a credential as of `now`.
    pub fn issue_at(&self, token: &str, now: DateTime<Utc>) -> ShareCredential {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = now.timestamp().saturating_add(ttl);
        let signature = hex::encode(self.signer(token, expires_at).finalize().into_bytes());
        ShareCredential {
            value: format!("{expires_at}|{signature}"),
            expires_at,
        }
    }

    /// Verifies a presented credential for `token`.
    pub fn verify(&self, token: &str, credential: &str) -> bool {
        self.verify_at(token, credential, Utc::now())
    }

    /// Verifies a presented credential as of `now`.
    ///
    /// Only the exact text [`issue_at`](Self::issue_at) produces is
    /// accepted: a canonical decimal expiry and 64 lowercase hex digits.
    /// Fails if the credential is malformed, expired, or its signature does
    /// not match.
    pub fn verify_at(&self, token: &str, credential: &str, now: DateTime<Utc>) -> bool {
        let Some((expiry, signature)) = credential.split_once('|') else {
            return false;
        };
        let Some(expires_at) = parse_canonical_expiry(expiry) else {
            return false;
        };
        if now.timestamp() > expires_at {
            return false;
        }
        if signature.len() != SIGNATURE_HEX_LEN
            || !signature.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return false;
        }
        let Ok(signature) = hex::decode(signature) else {
            return false;
        };
        self.signer(token, expires_at)
            .verify_slice(&signature)
            .is_ok()
    }

    fn signer(&self, token: &str, expires_at: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        mac.update(b"|");
        mac.update(expires_at.to_string().as_bytes());
        mac
    }

    /// Creates a password-protected share of `scope_path`.
    ///
    /// # Errors
    ///
    /// Fails if the scope path is invalid or the password cannot be hashed.
    pub fn create_share(
        &self,
        scope_path: &str,
        scope_is_dir: bool,
        password: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> ServerResult<Share> {
        let scope = NormalizedPath::parse(scope_path)?;
        if password.is_empty() {
            return Err(ServerError::InvalidRequest("share password is empty".into()));
        }
        let password_hash = hash_password(password)?;

        loop {
            let share = Share {
                token: generate_token(),
                scope_path: scope.as_str().to_string(),
                scope_is_dir,
                password_hash: password_hash.clone(),
                expires_at,
                created_at: Utc::now(),
            };
            if self.meta.insert_share(share.clone())? {
                tracing::info!(scope = %share.scope_path, scope_is_dir, "share created");
                return Ok(share);
            }
        }
    }

    /// Deletes a share. Returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// Fails if the metadata store cannot be written.
    pub fn revoke_share(&self, token: &str) -> ServerResult<bool> {
        let removed = self.meta.remove_share(&sanitize_token(token))?;
        if removed {
            tracing::info!("share revoked");
        }
        Ok(removed)
    }

    /// Looks up a live share by a client-supplied token.
    ///
    /// # Errors
    ///
    /// [`ServerError::UnknownShare`] or [`ServerError::ShareExpired`].
    pub fn lookup(&self, raw_token: &str) -> ServerResult<Share> {
        let token = sanitize_token(raw_token);
        if token.is_empty() {
            return Err(ServerError::UnknownShare);
        }
        let share = self.meta.get_share(&token)?.ok_or(ServerError::UnknownShare)?;
        if share.is_expired(Utc::now()) {
            return Err(ServerError::ShareExpired);
        }
        Ok(share)
    }

    /// Checks a share password and issues a credential.
    ///
    /// # Errors
    ///
    /// Lookup errors, or [`ServerError::NotAuthorized`] for a wrong password.
    pub fn unlock(&self, raw_token: &str, password: &str) -> ServerResult<(Share, ShareCredential)> {
        let share = self.lookup(raw_token)?;
        let parsed = PasswordHash::new(&share.password_hash)
            .map_err(|e| ServerError::Internal(format!("stored password hash: {e}")))?;
        if Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_err()
        {
            tracing::warn!("share unlock rejected: wrong password");
            return Err(ServerError::NotAuthorized("wrong password".into()));
        }
        let credential = self.issue(&share.token);
        Ok((share, credential))
    }

    /// Gates an anonymous request: the share must exist and be live, the
    /// credential must verify, and `path`, when given, must be in scope.
    ///
    /// Returns the share and its scope.
    ///
    /// # Errors
    ///
    /// Lookup errors, or [`ServerError::NotAuthorized`].
    pub fn authorize(
        &self,
        raw_token: &str,
        credential: Option<&str>,
        path: Option<&NormalizedPath>,
    ) -> ServerResult<(Share, NormalizedPath)> {
        let share = self.lookup(raw_token)?;
        let verified = credential.is_some_and(|c| self.verify(&share.token, c));
        if !verified {
            tracing::warn!("share credential rejected");
            return Err(ServerError::NotAuthorized("share is locked".into()));
        }
        let scope = NormalizedPath::parse(&share.scope_path)?;
        if let Some(path) = path {
            if !within_scope(path, &scope, share.scope_is_dir) {
                return Err(ServerError::NotAuthorized("path is outside the share".into()));
            }
        }
        Ok((share, scope))
    }
}

impl std::fmt::Debug for ShareTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareTokenService")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Hex length of an HMAC-SHA256 tag.
const SIGNATURE_HEX_LEN: usize = 64;

/// Parses an expiry written the way `i64::to_string` writes it.
fn parse_canonical_expiry(text: &str) -> Option<i64> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value = text.parse::<i64>().ok()?;
    (value.to_string() == text).then_some(value)
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SHARE_TOKEN_LEN)
        .map(char::from)
        .collect()
}

fn hash_password(password: &str) -> ServerResult<String> {
    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| ServerError::Internal(format!("salt: {e}")))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServerError::Internal(format!("password hash: {e}")))
}

/// Validates the bearer key of sync clients.
#[derive(Clone)]
pub struct ApiKeyValidator {
    expected: Vec<u8>,
}

impl ApiKeyValidator {
    const LABEL: &'static [u8] = b"drivesync-api-key";

    /// Creates a validator for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidRequest`] if the key is empty.
    pub fn new(key: &str) -> ServerResult<Self> {
        if key.is_empty() {
            return Err(ServerError::InvalidRequest("sync api key must not be empty".into()));
        }
        let expected = Self::tag(key.as_bytes())?;
        Ok(Self { expected })
    }

    // Keyed by the candidate, so the final comparison is a constant-time MAC check.
    fn tag(key: &[u8]) -> ServerResult<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| ServerError::Internal(format!("hmac key: {e}")))?;
        mac.update(Self::LABEL);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Validates a presented key.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AuthenticationFailed`] if the key is missing or wrong.
    pub fn validate(&self, presented: Option<&str>) -> ServerResult<()> {
        let presented = presented
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ServerError::AuthenticationFailed("missing sync key".into()))?;
        let mut mac = HmacSha256::new_from_slice(presented.as_bytes())
            .map_err(|e| ServerError::Internal(format!("hmac key: {e}")))?;
        mac.update(Self::LABEL);
        mac.verify_slice(&self.expected).map_err(|_| {
            tracing::warn!("sync key rejected");
            ServerError::AuthenticationFailed("invalid sync key".into())
        })
    }
}

impl std::fmt::Debug for ApiKeyValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKeyValidator")
    }
}
