use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use trialwatch::credentials::{Credentials, CredentialsResolver, SecretResolver};
use trialwatch::errors::ResolveError;

/// Always resolves to the same username/password.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    pub username: String,
    pub password: String,
    calls: Arc<AtomicUsize>,
}

impl StaticCredentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            calls: Arc::default(),
        }
    }

    pub fn shared(username: &str, password: &str) -> Arc<Self> {
        Arc::new(Self::new(username, password))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialsResolver for StaticCredentials {
    async fn resolve(&self) -> Result<Credentials, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        })
    }
}

/// Always resolves to the same secret.
#[derive(Debug, Clone)]
pub struct StaticSecret {
    value: String,
    calls: Arc<AtomicUsize>,
}

impl StaticSecret {
    pub fn shared(value: &str) -> Arc<Self> {
        Arc::new(Self {
            value: value.to_string(),
            calls: Arc::default(),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretResolver for StaticSecret {
    async fn resolve(&self) -> Result<String, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.value.clone())
    }
}

/// Always fails with [`ResolveError::Missing`].
#[derive(Debug, Clone)]
pub struct MissingSecret(pub &'static str);

#[async_trait]
impl SecretResolver for MissingSecret {
    async fn resolve(&self) -> Result<String, ResolveError> {
        Err(ResolveError::Missing(self.0.to_string()))
    }
}

/// Never resolves, like a user who never types the OTP code.
#[derive(Debug, Clone, Default)]
pub struct PendingSecret;

#[async_trait]
impl SecretResolver for PendingSecret {
    async fn resolve(&self) -> Result<String, ResolveError> {
        std::future::pending().await
    }
}
