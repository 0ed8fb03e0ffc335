//! Ordered credential sets and sequential fallback across them

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{ErrorKind, LlmError};
use crate::error::PipelineError;

/// Environment variables holding Gemini keys, in rotation order
pub const CREDENTIAL_ENV_VARS: [&str; 5] = [
    "GEMINI_API_KEY",
    "GEMINI_API_KEY2",
    "GEMINI_API_KEY3",
    "GEMINI_API_KEY4",
    "GEMINI_API_KEY5",
];

/// A single API credential. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    secret: Arc<str>,
}

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Arc::from(secret.into()),
        }
    }

    pub fn expose(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Immutable, ordered, non-empty list of interchangeable credentials.
/// Built once at startup and shared by reference-counted clone.
#[derive(Debug, Clone)]
pub struct CredentialSet {
    credentials: Arc<[Credential]>,
}

impl CredentialSet {
    /// Blank entries are dropped; an empty result is a configuration error
    pub fn new<I, S>(secrets: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let credentials: Vec<Credential> = secrets
            .into_iter()
            .map(|s| {
                let secret: String = s.into();
                secret.trim().to_string()
            })
            .filter(|s| !s.is_empty())
            .map(Credential::new)
            .collect();

        if credentials.is_empty() {
            return Err(PipelineError::Configuration(
                "no generative AI credentials configured".to_string(),
            ));
        }

        Ok(Self {
            credentials: credentials.into(),
        })
    }

    /// Read `GEMINI_API_KEY` .. `GEMINI_API_KEY5` from the process environment
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::new(CREDENTIAL_ENV_VARS.iter().filter_map(|var| std::env::var(var).ok()))
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.credentials.iter()
    }
}

/// Every credential failed
#[derive(Error, Debug)]
#[error("all {attempts} credential(s) failed; last error: {last}")]
pub struct AggregateError {
    pub attempts: usize,
    #[source]
    pub last: LlmError,
}

/// Successful value plus how many credentials were tried to get it
#[derive(Debug, Clone)]
pub struct Rotated<T> {
    pub value: T,
    pub attempts: usize,
    /// Zero-based index of the credential that succeeded
    pub credential_index: usize,
}

/// Tries a unit of work against each credential in order until one succeeds.
///
/// Holds no cursor: every call walks the full list from the start, so one
/// rotator can be shared by concurrent callers.
#[derive(Debug, Clone)]
pub struct CredentialRotator {
    credentials: CredentialSet,
}

impl CredentialRotator {
    pub fn new(credentials: CredentialSet) -> Self {
        Self { credentials }
    }

    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }

    /// Run `unit` with each credential until one returns `Ok`.
    ///
    /// Every error kind moves on to the next credential; the kind only picks
    /// the log line.
    pub async fn attempt<T, F, Fut>(&self, operation: &str, mut unit: F) -> Result<Rotated<T>, AggregateError>
    where
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let total = self.credentials.len();
        let mut last_error = None;

        for (index, credential) in self.credentials.iter().enumerate() {
            debug!("Trying API key {}/{} for {}", index + 1, total, operation);

            match unit(credential.clone()).await {
                Ok(value) => {
                    if index > 0 {
                        info!("✅ {} succeeded with API key {}/{}", operation, index + 1, total);
                    }
                    return Ok(Rotated {
                        value,
                        attempts: index + 1,
                        credential_index: index,
                    });
                }
                Err(e) => {
                    match e.kind() {
                        ErrorKind::Quota => warn!(
                            "⚠️ Rate limit hit with API key {}/{} during {}, trying next key",
                            index + 1, total, operation
                        ),
                        ErrorKind::Parse => warn!(
                            "⚠️ Unparseable response with API key {}/{} during {}: {}",
                            index + 1, total, operation, e
                        ),
                        kind => warn!(
                            "⚠️ {:?} error with API key {}/{} during {}: {}",
                            kind, index + 1, total, operation, e
                        ),
                    }
                    last_error = Some(e);
                }
            }
        }

        let last = last_error
            .unwrap_or_else(|| LlmError::Configuration("no credentials configured".to_string()));
        warn!("❌ All {} API keys failed for {}", total, operation);
        Err(AggregateError { attempts: total, last })
    }
}
