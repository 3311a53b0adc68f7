use std::{
    fmt,
    sync::{Arc, Mutex},
    thread,
};

use crate::{error::DeployError, logging::LogSink};
use crate::{info, warn};

/// Opaque name of the interactive user (a SID string on Windows).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One-shot OS lookup of the current user's identity.
pub trait IdentityLookup: Send + Sync {
    fn lookup(&self) -> Result<Identity, String>;
}

/// Memoizes the first successful lookup for the life of the process.
/// Callers arriving while a lookup is running block on the same lock and
/// receive its result; failures are not cached.
pub struct IdentityResolver {
    lookup: Box<dyn IdentityLookup>,
    cached: Mutex<Option<Identity>>,
    log: Arc<dyn LogSink>,
}

impl IdentityResolver {
    pub fn new(lookup: Box<dyn IdentityLookup>, log: Arc<dyn LogSink>) -> Self {
        Self {
            lookup,
            cached: Mutex::new(None),
            log,
        }
    }

    pub fn resolve(&self) -> Result<Identity, DeployError> {
        let mut slot = self
            .cached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(identity) = slot.as_ref() {
            return Ok(identity.clone());
        }

        match self.lookup.lookup() {
            Ok(identity) => {
                info!(self.log, "[LOCKSCREEN][IDENTITY] Resolved user identity {}", identity);
                *slot = Some(identity.clone());
                Ok(identity)
            }
            Err(reason) => {
                warn!(self.log, "[LOCKSCREEN][IDENTITY] Lookup failed: {}", reason);
                Err(DeployError::IdentityUnavailable(reason))
            }
        }
    }

    /// Starts the lookup on a background thread so the first apply does not
    /// pay for it.
    pub fn prefetch(self: &Arc<Self>) {
        let resolver = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("identity-prefetch".into())
            .spawn(move || {
                let _ = resolver.resolve();
            });
        if let Err(e) = spawned {
            warn!(self.log, "[LOCKSCREEN][IDENTITY] Could not start prefetch thread: {e}");
        }
    }
}

/// Reads the user SID from the current process token.
pub struct ProcessTokenLookup;

#[cfg(windows)]
impl IdentityLookup for ProcessTokenLookup {
    fn lookup(&self) -> Result<Identity, String> {
        use windows::{
            core::PWSTR,
            Win32::{
                Foundation::{CloseHandle, LocalFree, HANDLE, HLOCAL},
                Security::{
                    Authorization::ConvertSidToStringSidW, GetTokenInformation, TokenUser,
                    TOKEN_QUERY, TOKEN_USER,
                },
                System::Threading::{GetCurrentProcess, OpenProcessToken},
            },
        };

        unsafe {
            let mut token = HANDLE::default();
            OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token)
                .map_err(|e| format!("OpenProcessToken failed: {e}"))?;

            let mut needed = 0u32;
            let _ = GetTokenInformation(token, TokenUser, None, 0, &mut needed);
            if needed == 0 {
                let _ = CloseHandle(token);
                return Err("GetTokenInformation reported an empty TokenUser".into());
            }

            // u64 backing keeps TOKEN_USER suitably aligned.
            let mut buffer = vec![0u64; (needed as usize).div_ceil(8)];
            let queried = GetTokenInformation(
                token,
                TokenUser,
                Some(buffer.as_mut_ptr() as *mut _),
                needed,
                &mut needed,
            );
            let _ = CloseHandle(token);
            queried.map_err(|e| format!("GetTokenInformation failed: {e}"))?;

            let user = &*(buffer.as_ptr() as *const TOKEN_USER);
            let mut sid_string = PWSTR::null();
            ConvertSidToStringSidW(user.User.Sid, &mut sid_string)
                .map_err(|e| format!("ConvertSidToStringSidW failed: {e}"))?;

            let value = sid_string.to_string();
            let _ = LocalFree(Some(HLOCAL(sid_string.0 as *mut _)));
            value
                .map(Identity::new)
                .map_err(|e| format!("SID string was not valid UTF-16: {e}"))
        }
    }
}

#[cfg(not(windows))]
impl IdentityLookup for ProcessTokenLookup {
    fn lookup(&self) -> Result<Identity, String> {
        std::env::var("USER")
            .or_else(|_| std::env::var("LOGNAME"))
            .map(Identity::new)
            .map_err(|_| "neither USER nor LOGNAME is set".to_string())
    }
}
