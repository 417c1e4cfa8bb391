// src/credentials.rs

//! Credential and interactive-input resolvers.
//!
//! Reactions receive resolvers as injected collaborators and call them at
//! the moment a form asks for a value. Nothing here caches: every call
//! resolves again (environment variables may rotate, OTP codes always do).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Account;
use crate::errors::ResolveError;

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Resolves a username/password pair. May suspend indefinitely.
#[async_trait]
pub trait CredentialsResolver: Send + Sync {
    async fn resolve(&self) -> Result<Credentials, ResolveError>;
}

/// Resolves a single secret value (password, OTP code). May suspend
/// indefinitely.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn resolve(&self) -> Result<String, ResolveError>;
}

/// Credentials from a configured [`Account`].
#[derive(Debug, Clone)]
pub struct AccountResolver {
    owner: String,
    account: Account,
}

impl AccountResolver {
    /// `owner` names the account in error messages.
    pub fn new(owner: impl Into<String>, account: Account) -> Self {
        Self {
            owner: owner.into(),
            account,
        }
    }
}

#[async_trait]
impl CredentialsResolver for AccountResolver {
    async fn resolve(&self) -> Result<Credentials, ResolveError> {
        if let Some(plain) = &self.account.plain {
            return Ok(Credentials {
                username: plain.username.clone(),
                password: plain.password.clone(),
            });
        }

        if let Some(env) = &self.account.env {
            debug!(owner = %self.owner, "resolving credentials from environment");
            return Ok(Credentials {
                username: env_var(&env.username)?,
                password: env_var(&env.password)?,
            });
        }

        Err(ResolveError::Missing(self.owner.clone()))
    }
}

fn env_var(var: &str) -> Result<String, ResolveError> {
    std::env::var(var).map_err(|_| ResolveError::Env {
        var: var.to_string(),
    })
}

/// The username half of a [`CredentialsResolver`].
#[derive(Clone)]
pub struct UsernameOf(pub Arc<dyn CredentialsResolver>);

#[async_trait]
impl SecretResolver for UsernameOf {
    async fn resolve(&self) -> Result<String, ResolveError> {
        Ok(self.0.resolve().await?.username)
    }
}

/// The password half of a [`CredentialsResolver`].
#[derive(Clone)]
pub struct PasswordOf(pub Arc<dyn CredentialsResolver>);

#[async_trait]
impl SecretResolver for PasswordOf {
    async fn resolve(&self) -> Result<String, ResolveError> {
        Ok(self.0.resolve().await?.password)
    }
}

/// Prompts on stdout and reads one line from `input`.
///
/// All clones share one buffered reader, so lines typed ahead of a prompt
/// are kept for the next one.
pub struct PromptResolver<R> {
    prompt: String,
    what: String,
    input: Arc<Mutex<R>>,
}

/// Prompts for codes on the terminal.
pub type StdinCodeResolver = PromptResolver<BufReader<Stdin>>;

impl<R> Clone for PromptResolver<R> {
    fn clone(&self) -> Self {
        Self {
            prompt: self.prompt.clone(),
            what: self.what.clone(),
            input: Arc::clone(&self.input),
        }
    }
}

impl<R> std::fmt::Debug for PromptResolver<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptResolver")
            .field("prompt", &self.prompt)
            .field("what", &self.what)
            .finish_non_exhaustive()
    }
}

impl<R> PromptResolver<R> {
    pub fn new(prompt: impl Into<String>, what: impl Into<String>, input: R) -> Self {
        Self {
            prompt: prompt.into(),
            what: what.into(),
            input: Arc::new(Mutex::new(input)),
        }
    }
}

impl StdinCodeResolver {
    /// The two-step verification code prompt.
    pub fn otp() -> Self {
        Self::new("OTP Code: ", "OTP code", BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R> SecretResolver for PromptResolver<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn resolve(&self) -> Result<String, ResolveError> {
        // Held across the prompt so concurrent callers don't interleave.
        let mut input = self.input.lock().await;

        let mut stdout = tokio::io::stdout();
        stdout.write_all(self.prompt.as_bytes()).await?;
        stdout.flush().await?;

        let mut line = String::new();
        input.read_line(&mut line).await?;

        let code = line.trim().to_string();
        if code.is_empty() {
            return Err(ResolveError::Empty(self.what.clone()));
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvAccount, PlainAccount};

    #[tokio::test]
    async fn test_plain_account_resolves() {
        let resolver = AccountResolver::new(
            "jira",
            Account {
                plain: Some(PlainAccount {
                    username: "admin".into(),
                    password: "hunter2".into(),
                }),
                env: None,
            },
        );

        let creds = resolver.resolve().await.unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password, "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[tokio::test]
    async fn test_missing_env_var_is_reported() {
        let resolver = AccountResolver::new(
            "jira",
            Account {
                plain: None,
                env: Some(EnvAccount {
                    username: "TRIALWATCH_TEST_SURELY_UNSET_USER".into(),
                    password: "TRIALWATCH_TEST_SURELY_UNSET_PASSWORD".into(),
                }),
            },
        );

        match resolver.resolve().await {
            Err(ResolveError::Env { var }) => assert_eq!(var, "TRIALWATCH_TEST_SURELY_UNSET_USER"),
            other => panic!("expected Env error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_account_without_source_is_missing() {
        let resolver = AccountResolver::new("atlassian", Account::default());
        assert!(matches!(
            resolver.resolve().await,
            Err(ResolveError::Missing(owner)) if owner == "atlassian"
        ));
    }

    #[tokio::test]
    async fn test_prompt_keeps_lines_typed_ahead() {
        let resolver = PromptResolver::new("Code: ", "code", &b"123456\n654321\n"[..]);
        let other = resolver.clone();

        assert_eq!(resolver.resolve().await.unwrap(), "123456");
        assert_eq!(other.resolve().await.unwrap(), "654321");
        assert!(matches!(
            resolver.resolve().await,
            Err(ResolveError::Empty(what)) if what == "code"
        ));
    }
}
