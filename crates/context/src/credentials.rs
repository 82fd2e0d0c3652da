//! Credential Pool - Per-provider API key rotation
//!
//! Provides:
//! - Round-robin selection across active credentials
//! - One-strike deactivation on reported failure
//! - Fixed-slot addressing (primary / secondary)
//!
//! Each provider's pool sits behind its own lock, so rotation and
//! deactivation are serialized per provider while different providers
//! never contend.

use genesis_common::config::ProvidersConfig;
use genesis_common::errors::AppError;
use genesis_common::metrics;
use genesis_common::{Provider, Secret};
use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Recorded failures after which a credential leaves rotation
pub const FAILURE_STRIKES: u32 = 1;

/// Configuration slot addressed by `select_by_position`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Primary,
    Secondary,
}

impl Position {
    /// Zero-based index into the configured credential list
    pub fn slot(&self) -> usize {
        match self {
            Position::Primary => 0,
            Position::Secondary => 1,
        }
    }
}

impl FromStr for Position {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(Position::Primary),
            "secondary" => Ok(Position::Secondary),
            other => Err(AppError::Validation {
                message: format!("unknown credential position '{}'", other),
            }),
        }
    }
}

/// Selection and health tracking for provider credentials.
///
/// Implementations must serialize mutations per provider.
pub trait CredentialStore: Send + Sync {
    /// Next active credential for `provider`, rotating it to the back
    fn select(&self, provider: Provider) -> Option<Secret>;

    /// Record a failed call made with `secret`
    fn report_failure(&self, provider: Provider, secret: &Secret);

    /// Credential configured at a fixed slot, regardless of rotation
    fn select_by_position(&self, provider: Provider, position: Position) -> Option<Secret>;

    /// Whether any credential (active or not) was configured for `provider`
    fn has_credentials(&self, provider: Provider) -> bool;

    /// Number of credentials still in rotation
    fn active_count(&self, provider: Provider) -> usize;
}

#[derive(Debug, Clone)]
struct Credential {
    secret: Secret,
    active: bool,
    error_count: u32,

    /// Index in the configured list, stable across rotation
    slot: usize,
}

#[derive(Debug, Default)]
struct ProviderPool {
    credentials: VecDeque<Credential>,
}

impl ProviderPool {
    fn select(&mut self) -> Option<Secret> {
        let idx = self.credentials.iter().position(|c| c.active)?;
        let credential = self.credentials.remove(idx)?;
        let secret = credential.secret.clone();
        self.credentials.push_back(credential);
        Some(secret)
    }

    fn by_slot(&self, slot: usize) -> Option<&Credential> {
        self.credentials.iter().find(|c| c.slot == slot)
    }

    fn find_mut(&mut self, secret: &Secret) -> Option<&mut Credential> {
        self.credentials.iter_mut().find(|c| &c.secret == secret)
    }

    fn active_count(&self) -> usize {
        self.credentials.iter().filter(|c| c.active).count()
    }
}

/// In-process credential store
#[derive(Debug)]
pub struct CredentialPool {
    pools: HashMap<Provider, Mutex<ProviderPool>>,
}

impl CredentialPool {
    /// Build pools from configured secrets.
    ///
    /// Blank secrets are dropped. A secret seen earlier, in this or another
    /// provider's list, is skipped so each credential lives in one pool.
    pub fn new(mut secrets: HashMap<Provider, Vec<Secret>>) -> Self {
        let mut seen: HashSet<Secret> = HashSet::new();
        let mut pools = HashMap::new();

        for provider in Provider::ALL {
            let mut pool = ProviderPool::default();
            for secret in secrets.remove(&provider).unwrap_or_default() {
                if secret.is_blank() {
                    continue;
                }
                if !seen.insert(secret.clone()) {
                    warn!(
                        provider = %provider,
                        credential = %secret,
                        "Duplicate credential skipped"
                    );
                    continue;
                }
                let slot = pool.credentials.len();
                pool.credentials.push_back(Credential {
                    secret,
                    active: true,
                    error_count: 0,
                    slot,
                });
            }
            debug!(provider = %provider, credentials = pool.credentials.len(), "Credential pool ready");
            pools.insert(provider, Mutex::new(pool));
        }

        Self { pools }
    }

    pub fn from_config(config: &ProvidersConfig) -> Self {
        let secrets = Provider::ALL
            .into_iter()
            .map(|provider| {
                let keys = config
                    .api_keys(provider)
                    .iter()
                    .map(|key| Secret::new(key.trim()))
                    .collect();
                (provider, keys)
            })
            .collect();
        Self::new(secrets)
    }

    fn lock(&self, provider: Provider) -> Option<MutexGuard<'_, ProviderPool>> {
        self.pools
            .get(&provider)
            .map(|pool| pool.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl CredentialStore for CredentialPool {
    fn select(&self, provider: Provider) -> Option<Secret> {
        let secret = self.lock(provider)?.select();
        if secret.is_none() {
            debug!(provider = %provider, "No active credentials");
        }
        secret
    }

    fn report_failure(&self, provider: Provider, secret: &Secret) {
        let Some(mut pool) = self.lock(provider) else {
            return;
        };
        let Some(credential) = pool.find_mut(secret) else {
            debug!(provider = %provider, credential = %secret, "Failure reported for unknown credential");
            return;
        };

        credential.error_count += 1;
        if credential.active && credential.error_count >= FAILURE_STRIKES {
            credential.active = false;
            metrics::record_credential_deactivated(provider.as_str());
            warn!(
                provider = %provider,
                credential = %secret,
                slot = credential.slot,
                errors = credential.error_count,
                "Credential deactivated"
            );
        }
    }

    fn select_by_position(&self, provider: Provider, position: Position) -> Option<Secret> {
        let pool = self.lock(provider)?;
        let credential = pool.by_slot(position.slot())?;
        if !credential.active {
            warn!(
                provider = %provider,
                position = ?position,
                credential = %credential.secret,
                "Pinned credential is deactivated, using it anyway"
            );
        }
        Some(credential.secret.clone())
    }

    fn has_credentials(&self, provider: Provider) -> bool {
        self.lock(provider)
            .map(|pool| !pool.credentials.is_empty())
            .unwrap_or(false)
    }

    fn active_count(&self, provider: Provider) -> usize {
        self.lock(provider).map(|pool| pool.active_count()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn pool_of(provider: Provider, keys: &[&str]) -> CredentialPool {
        let mut secrets = HashMap::new();
        secrets.insert(provider, keys.iter().map(|k| Secret::new(*k)).collect());
        CredentialPool::new(secrets)
    }

    #[test]
    fn test_rotation_visits_each_once() {
        let pool = pool_of(Provider::Groq, &["a", "b", "c"]);

        let picked: Vec<Secret> = (0..3).filter_map(|_| pool.select(Provider::Groq)).collect();
        assert_eq!(picked, vec![Secret::new("a"), Secret::new("b"), Secret::new("c")]);
        assert_eq!(pool.select(Provider::Groq), Some(Secret::new("a")));
    }

    #[test]
    fn test_one_strike_excludes_credential() {
        let pool = pool_of(Provider::Google, &["a", "b"]);
        let first = pool.select(Provider::Google).unwrap();
        pool.report_failure(Provider::Google, &first);

        for _ in 0..5 {
            assert_eq!(pool.select(Provider::Google), Some(Secret::new("b")));
        }
        assert_eq!(pool.active_count(Provider::Google), 1);
    }

    #[test]
    fn test_exhausted_provider_selects_none() {
        let pool = pool_of(Provider::SambaNova, &["only"]);
        pool.report_failure(Provider::SambaNova, &Secret::new("only"));

        assert_eq!(pool.select(Provider::SambaNova), None);
        assert!(pool.has_credentials(Provider::SambaNova));
        assert!(!pool.has_credentials(Provider::OpenRouter));
        assert_eq!(pool.select(Provider::OpenRouter), None);
    }

    #[test]
    fn test_select_by_position_ignores_rotation() {
        let pool = pool_of(Provider::SambaNova, &["first", "second"]);
        pool.select(Provider::SambaNova);

        assert_eq!(
            pool.select_by_position(Provider::SambaNova, Position::Primary),
            Some(Secret::new("first"))
        );
        assert_eq!(
            pool.select_by_position(Provider::SambaNova, Position::Secondary),
            Some(Secret::new("second"))
        );
        assert_eq!(pool.select_by_position(Provider::Groq, Position::Primary), None);
    }

    #[test]
    fn test_duplicates_and_blanks_are_dropped() {
        let mut secrets = HashMap::new();
        secrets.insert(Provider::Google, vec![Secret::new("k1"), Secret::new("  "), Secret::new("k1")]);
        secrets.insert(Provider::Groq, vec![Secret::new("k1"), Secret::new("k2")]);
        let pool = CredentialPool::new(secrets);

        assert_eq!(pool.active_count(Provider::Google), 1);
        assert_eq!(pool.active_count(Provider::Groq), 1);
        assert_eq!(pool.select(Provider::Groq), Some(Secret::new("k2")));
    }

    #[test]
    fn test_from_config_reads_api_keys() {
        let mut config = ProvidersConfig::default();
        config.openrouter.api_keys = vec!["or-1".into(), " or-2 ".into()];
        let pool = CredentialPool::from_config(&config);

        assert_eq!(pool.active_count(Provider::OpenRouter), 2);
        assert_eq!(
            pool.select_by_position(Provider::OpenRouter, Position::Secondary),
            Some(Secret::new("or-2"))
        );
    }

    #[test]
    fn test_position_parse() {
        assert_eq!("Primary".parse::<Position>().unwrap(), Position::Primary);
        assert!("tertiary".parse::<Position>().is_err());
    }

    #[test]
    fn test_concurrent_failures_deactivate_once() {
        let keys: Vec<String> = (0..8).map(|i| format!("key-{}", i)).collect();
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let pool = Arc::new(pool_of(Provider::Groq, &refs));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    if let Some(secret) = pool.select(Provider::Groq) {
                        pool.report_failure(Provider::Groq, &secret);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pool.active_count(Provider::Groq), 0);
        assert_eq!(pool.select(Provider::Groq), None);
    }
}
