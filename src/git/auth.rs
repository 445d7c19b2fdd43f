use git2::{CertificateCheckStatus, Cred, CredentialType, RemoteCallbacks};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// libgit2 re-invokes the credentials callback after a rejected attempt
const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

/// Key pair used for SSH remotes, supplied out of band
#[derive(Clone, Default)]
pub struct SshCredentials {
    pub private_key: Option<PathBuf>,
    pub public_key: Option<PathBuf>,
    pub passphrase: Option<String>,
}

impl fmt::Debug for SshCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshCredentials")
            .field("private_key", &self.private_key)
            .field("public_key", &self.public_key)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// How remote host certificates are validated.
///
/// `AcceptAll` (the default) accepts any certificate or host key and is a
/// known risk. `Passthrough` lets libgit2 validate; `Custom` decides per host.
#[derive(Clone, Default)]
pub enum CertificateCheck {
    #[default]
    AcceptAll,
    Passthrough,
    Custom(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl fmt::Debug for CertificateCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertificateCheck::AcceptAll => f.write_str("AcceptAll"),
            CertificateCheck::Passthrough => f.write_str("Passthrough"),
            CertificateCheck::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Callbacks shared by clone and fetch: credentials, host validation and
/// transfer cancellation
pub(crate) fn remote_callbacks<'a>(
    credentials: &'a SshCredentials,
    certificates: &'a CertificateCheck,
    cancel: &'a CancellationToken,
) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    let mut attempts = 0;

    callbacks.credentials(move |_url, username, allowed| {
        attempts += 1;
        if attempts > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::from_str("authentication rejected"));
        }
        let username = username.unwrap_or("git");
        if allowed.contains(CredentialType::SSH_KEY) {
            if let Some(private_key) = &credentials.private_key {
                return Cred::ssh_key(
                    username,
                    credentials.public_key.as_deref(),
                    private_key,
                    credentials.passphrase.as_deref(),
                );
            }
        }
        if allowed.contains(CredentialType::USERNAME) {
            return Cred::username(username);
        }
        Cred::default()
    });

    callbacks.certificate_check(move |_cert, host| match certificates {
        CertificateCheck::AcceptAll => Ok(CertificateCheckStatus::CertificateOk),
        CertificateCheck::Passthrough => Ok(CertificateCheckStatus::CertificatePassthrough),
        CertificateCheck::Custom(accept) => {
            if accept(host) {
                Ok(CertificateCheckStatus::CertificateOk)
            } else {
                Err(git2::Error::from_str(&format!("certificate for {} rejected", host)))
            }
        }
    });

    // Returning false aborts the transfer
    callbacks.transfer_progress(move |_stats| !cancel.is_cancelled());

    callbacks
}
