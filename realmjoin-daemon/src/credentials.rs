//! Credential cache materialization.
//!
//! Admin credentials arrive either as the raw bytes of an existing
//! Kerberos credential cache or as a principal/password pair. Both paths
//! end in the same place: a securely-permissioned transient file on disk,
//! unlinked exactly once when its owning operation finishes.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use realmjoin_core::RealmError;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use zeroize::Zeroizing;

use crate::caller::CallerHandle;

/// Admin credentials supplied by the caller.
#[derive(Debug)]
pub enum AdminCredentials {
    /// Principal name plus password; exchanged for a ticket-granting
    /// ticket before any privileged work starts.
    Password {
        principal: String,
        password: Zeroizing<String>,
    },
    /// Raw bytes of a pre-built credential cache.
    CredentialCache(Vec<u8>),
}

/// A transient on-disk Kerberos credential cache.
///
/// Owned exclusively by one operation context and unlinked when dropped,
/// on every exit path.
#[derive(Debug)]
pub struct CredentialCacheFile {
    path: PathBuf,
}

impl CredentialCacheFile {
    /// Create an empty, owner-only cache file with a randomized name.
    pub fn create_empty(dir: &Path) -> std::io::Result<Self> {
        use std::os::unix::fs::OpenOptionsExt;

        loop {
            let path = dir.join(format!("realmjoin-krb5-cc-{:016x}", rand::random::<u64>()));
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(0o600)
                .open(&path)
            {
                Ok(_file) => return Ok(Self { path }),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Create a cache file holding the given bytes.
    pub fn write_bytes(dir: &Path, bytes: &[u8]) -> std::io::Result<Self> {
        let cache = Self::create_empty(dir)?;
        std::fs::write(&cache.path, bytes)?;
        Ok(cache)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CredentialCacheFile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "Couldn't remove kerberos cache file"
                );
            }
        }
    }
}

/// The Kerberos credential-acquisition boundary.
///
/// Password enrollment exchanges the password for initial credentials
/// through this trait; the error string is the mechanism's diagnostic
/// text, which goes to the diagnostics stream, never to the caller.
#[async_trait]
pub trait CredentialAuthority: Send + Sync {
    async fn acquire(&self, principal: &str, password: &str) -> Result<Vec<u8>, String>;
}

/// Authority backed by the system `kinit` tool.
///
/// This performs blocking network I/O toward the KDC for its duration.
/// Credential acquisition is infrequent and short, so the latency is
/// accepted.
#[derive(Debug)]
pub struct KinitAuthority {
    kinit_path: PathBuf,
    runtime_dir: PathBuf,
}

impl KinitAuthority {
    pub fn new(kinit_path: PathBuf, runtime_dir: PathBuf) -> Self {
        Self {
            kinit_path,
            runtime_dir,
        }
    }
}

#[async_trait]
impl CredentialAuthority for KinitAuthority {
    async fn acquire(&self, principal: &str, password: &str) -> Result<Vec<u8>, String> {
        let scratch = CredentialCacheFile::create_empty(&self.runtime_dir)
            .map_err(|err| format!("Couldn't create credential cache file: {}", err))?;

        let mut child = Command::new(&self.kinit_path)
            .arg(principal)
            .env("KRB5CCNAME", scratch.path())
            .env("LC_ALL", "C")
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| format!("Couldn't run {}: {}", self.kinit_path.display(), err))?;

        if let Some(mut stdin) = child.stdin.take() {
            let line = Zeroizing::new(format!("{}\n", password));
            stdin
                .write_all(line.as_bytes())
                .await
                .map_err(|err| format!("Couldn't supply password: {}", err))?;
        }

        let out = child
            .wait_with_output()
            .await
            .map_err(|err| format!("Couldn't wait for {}: {}", self.kinit_path.display(), err))?;

        if !out.status.success() {
            let mut text = String::from_utf8_lossy(&out.stderr).into_owned();
            text.push_str(&String::from_utf8_lossy(&out.stdout));
            return Err(text.trim().to_string());
        }

        tokio::fs::read(scratch.path())
            .await
            .map_err(|err| format!("Couldn't read credential cache: {}", err))
        // scratch drops here, removing the intermediate file.
    }
}

/// Resolve admin credentials into credential cache bytes, with no file
/// I/O of the daemon's own.
///
/// This runs before the action lock is taken: zero-length cache bytes
/// are an invalid argument with no side effects at all, and a failed
/// password exchange is an authentication failure whose mechanism
/// diagnostic goes to the diagnostics stream only. The transient cache
/// file itself is written later, under the lock, by [`materialize`].
pub async fn resolve(
    authority: &dyn CredentialAuthority,
    credentials: AdminCredentials,
    caller: &CallerHandle,
) -> Result<Vec<u8>, RealmError> {
    match credentials {
        AdminCredentials::CredentialCache(bytes) => {
            if bytes.is_empty() {
                return Err(RealmError::InvalidArgument(
                    "Invalid zero length credential cache argument".into(),
                ));
            }
            Ok(bytes)
        }
        AdminCredentials::Password {
            principal,
            password,
        } => match authority.acquire(&principal, &password).await {
            Ok(bytes) => Ok(bytes),
            Err(diagnostic) => {
                caller.error(format!("Couldn't authenticate as {}: {}", principal, diagnostic));
                Err(RealmError::AuthFailed(
                    "Failed to authenticate with password".into(),
                ))
            }
        },
    }
}

/// Write resolved cache bytes out as a transient on-disk credential
/// cache. Runs under the action lock, so a busy daemon never touches
/// the filesystem for a rejected request.
pub fn materialize(
    runtime_dir: &Path,
    bytes: &[u8],
    caller: &CallerHandle,
) -> Result<CredentialCacheFile, RealmError> {
    CredentialCacheFile::write_bytes(runtime_dir, bytes).map_err(|err| {
        caller.error(format!("Couldn't write out the credential cache: {}", err));
        RealmError::internal("Problem writing out the kerberos cache data")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RejectingAuthority;

    #[async_trait]
    impl CredentialAuthority for RejectingAuthority {
        async fn acquire(&self, _principal: &str, _password: &str) -> Result<Vec<u8>, String> {
            Err("Preauthentication failed while getting initial credentials".into())
        }
    }

    struct StaticAuthority(Vec<u8>);

    #[async_trait]
    impl CredentialAuthority for StaticAuthority {
        async fn acquire(&self, _principal: &str, _password: &str) -> Result<Vec<u8>, String> {
            Ok(self.0.clone())
        }
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("realmjoin-test-{}-{:x}", tag, rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn cache_file_is_owner_only_and_removed_on_drop() {
        use std::os::unix::fs::PermissionsExt;

        let dir = scratch_dir("perm");
        let cache = CredentialCacheFile::write_bytes(&dir, b"ticket data").unwrap();
        let path = cache.path().to_path_buf();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(std::fs::read(&path).unwrap(), b"ticket data");

        drop(cache);
        assert!(!path.exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn zero_length_cache_is_invalid_argument() {
        let caller = CallerHandle::detached();

        let result = resolve(
            &RejectingAuthority,
            AdminCredentials::CredentialCache(Vec::new()),
            &caller,
        )
        .await;

        assert!(matches!(result, Err(RealmError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn failed_password_exchange_is_auth_failed() {
        let (caller, mut diag_rx, _cancel) = CallerHandle::new();

        let result = resolve(
            &RejectingAuthority,
            AdminCredentials::Password {
                principal: "admin@CORP.EXAMPLE.COM".into(),
                password: Zeroizing::new("wrong".into()),
            },
            &caller,
        )
        .await;

        assert!(matches!(result, Err(RealmError::AuthFailed(_))));

        // The mechanism diagnostic lands on the stream, not in the error.
        let event = diag_rx.recv().await.unwrap();
        assert!(event.message.contains("Preauthentication failed"));
    }

    #[tokio::test]
    async fn password_exchange_materializes_cache_bytes() {
        let dir = scratch_dir("pw");
        let caller = CallerHandle::detached();

        let bytes = resolve(
            &StaticAuthority(b"tgt bytes".to_vec()),
            AdminCredentials::Password {
                principal: "admin@CORP.EXAMPLE.COM".into(),
                password: Zeroizing::new("secret".into()),
            },
            &caller,
        )
        .await
        .unwrap();

        let cache = materialize(&dir, &bytes, &caller).unwrap();
        assert_eq!(std::fs::read(cache.path()).unwrap(), b"tgt bytes");

        drop(cache);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn unwritable_runtime_dir_is_internal() {
        let caller = CallerHandle::detached();
        let missing = std::env::temp_dir().join(format!(
            "realmjoin-test-missing-{:x}",
            rand::random::<u64>()
        ));

        let result = materialize(&missing, b"ticket", &caller);
        match result {
            Err(RealmError::Internal(message)) => {
                assert_eq!(message, "Problem writing out the kerberos cache data")
            }
            other => panic!("Expected Internal, got {:?}", other),
        }
    }
}
