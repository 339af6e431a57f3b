//! Credential rotation registry
//!
//! Every provider owns an immutable pool of API keys. Selection is round-robin
//! over a per-provider cursor; a key that failed sits out of rotation until its
//! cooldown elapses. Keys are never removed and never logged: diagnostics show
//! the pool index and a short SHA-256 fingerprint.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};

/// A credential handed out for one attempt
#[derive(Clone)]
pub struct Lease {
    /// Pool index, used to report the outcome
    pub index: usize,
    /// The API key
    pub credential: Arc<SecretString>,
}

impl Lease {
    /// Short fingerprint safe for logs
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.credential)
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("index", &self.index)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Health of one credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialStatus {
    pub working: bool,
    pub last_failure_at: Option<Instant>,
}

impl Default for CredentialStatus {
    fn default() -> Self {
        Self {
            working: true,
            last_failure_at: None,
        }
    }
}

impl CredentialStatus {
    /// Whether the credential may be handed out at `now`
    fn is_eligible(&self, now: Instant, cooldown: Duration) -> bool {
        if self.working {
            return true;
        }
        match self.last_failure_at {
            Some(failed_at) => now.saturating_duration_since(failed_at) >= cooldown,
            None => true,
        }
    }
}

/// Diagnostic view of one credential
#[derive(Debug, Clone)]
pub struct CredentialSnapshot {
    pub index: usize,
    pub fingerprint: String,
    pub working: bool,
    /// Time left before a failed credential is eligible again
    pub cooldown_remaining: Option<Duration>,
}

/// Source of credentials for the provider router
pub trait CredentialRegistry: Send + Sync {
    /// Next credential for a provider, or `None` for an unknown provider or empty pool
    fn next_credential(&self, provider: &str) -> Option<Lease>;

    /// Mark a credential healthy
    fn report_success(&self, provider: &str, index: usize);

    /// Mark a credential failed; it stays out of rotation for the cooldown
    fn report_failure(&self, provider: &str, index: usize, error: &str);

    /// Number of credentials configured for a provider
    fn pool_size(&self, provider: &str) -> usize;
}

/// Cursor and statuses, guarded together
struct PoolState {
    cursor: usize,
    statuses: Vec<CredentialStatus>,
}

struct Pool {
    keys: Vec<Arc<SecretString>>,
    state: Mutex<PoolState>,
}

impl Pool {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Statuses are plain data; a panic mid-update leaves them usable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Production registry: round-robin with failure cooldown
pub struct RotationRegistry {
    pools: HashMap<String, Pool>,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
}

impl RotationRegistry {
    /// Build a registry from provider pools using the system clock
    pub fn new(pools: HashMap<String, Vec<SecretString>>, cooldown: Duration) -> Self {
        Self::with_clock(pools, cooldown, Arc::new(SystemClock))
    }

    /// Build a registry with an injected clock
    pub fn with_clock(
        pools: HashMap<String, Vec<SecretString>>,
        cooldown: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let pools = pools
            .into_iter()
            .map(|(provider, keys)| {
                let statuses = vec![CredentialStatus::default(); keys.len()];
                let pool = Pool {
                    keys: keys.into_iter().map(Arc::new).collect(),
                    state: Mutex::new(PoolState {
                        cursor: 0,
                        statuses,
                    }),
                };
                (provider, pool)
            })
            .collect();

        Self {
            pools,
            cooldown,
            clock,
        }
    }

    /// Configured cooldown
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Provider names with at least one credential
    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .pools
            .iter()
            .filter(|(_, pool)| !pool.keys.is_empty())
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Per-credential health for diagnostics
    pub fn snapshot(&self, provider: &str) -> Vec<CredentialSnapshot> {
        let Some(pool) = self.pools.get(provider) else {
            return Vec::new();
        };
        let now = self.clock.now();
        let state = pool.lock();

        pool.keys
            .iter()
            .zip(state.statuses.iter())
            .enumerate()
            .map(|(index, (key, status))| {
                let cooldown_remaining = match (status.working, status.last_failure_at) {
                    (false, Some(at)) => self
                        .cooldown
                        .checked_sub(now.saturating_duration_since(at))
                        .filter(|d| !d.is_zero()),
                    _ => None,
                };
                CredentialSnapshot {
                    index,
                    fingerprint: fingerprint(key),
                    working: status.working,
                    cooldown_remaining,
                }
            })
            .collect()
    }

    fn update(&self, provider: &str, index: usize, f: impl FnOnce(&mut CredentialStatus)) {
        let Some(pool) = self.pools.get(provider) else {
            return;
        };
        let mut state = pool.lock();
        if let Some(status) = state.statuses.get_mut(index) {
            f(status);
        }
    }
}

impl CredentialRegistry for RotationRegistry {
    fn next_credential(&self, provider: &str) -> Option<Lease> {
        let pool = self.pools.get(provider)?;
        let len = pool.keys.len();
        if len == 0 {
            return None;
        }

        let now = self.clock.now();
        let mut state = pool.lock();
        let start = state.cursor % len;
        state.cursor = state.cursor.wrapping_add(1);

        let chosen = (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&idx| state.statuses[idx].is_eligible(now, self.cooldown));

        let index = match chosen {
            Some(idx) => idx,
            None => {
                warn!(provider, pool = len, "All credentials cooling down, using index 0");
                0
            }
        };
        drop(state);

        debug!(provider, index, "Selected credential");
        Some(Lease {
            index,
            credential: Arc::clone(&pool.keys[index]),
        })
    }

    fn report_success(&self, provider: &str, index: usize) {
        self.update(provider, index, |status| {
            status.working = true;
            status.last_failure_at = None;
        });
    }

    fn report_failure(&self, provider: &str, index: usize, error: &str) {
        let now = self.clock.now();
        self.update(provider, index, |status| {
            status.working = false;
            status.last_failure_at = Some(now);
        });
        warn!(provider, index, error = %first_line(error), "Credential failed, cooling down");
    }

    fn pool_size(&self, provider: &str) -> usize {
        self.pools.get(provider).map(|p| p.keys.len()).unwrap_or(0)
    }
}

/// First 8 hex chars of the key's SHA-256
pub fn fingerprint(secret: &SecretString) -> String {
    let digest = Sha256::digest(secret.expose_secret().as_bytes());
    hex::encode(&digest[..4])
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::NaiveDate;

    fn registry(keys: &[&str], clock: Arc<ManualClock>) -> RotationRegistry {
        let mut pools = HashMap::new();
        pools.insert(
            "openai".to_string(),
            keys.iter().map(|k| SecretString::from(k.to_string())).collect(),
        );
        pools.insert("empty".to_string(), Vec::new());
        RotationRegistry::with_clock(pools, Duration::from_secs(300), clock)
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(NaiveDate::from_ymd_opt(2025, 9, 10).unwrap()))
    }

    fn next_index(registry: &RotationRegistry) -> usize {
        registry.next_credential("openai").unwrap().index
    }

    #[test]
    fn test_round_robin_visits_every_index() {
        let registry = registry(&["a", "b", "c"], clock());
        let visited: Vec<usize> = (0..3).map(|_| next_index(&registry)).collect();
        assert_eq!(visited, vec![0, 1, 2]);
        assert_eq!(next_index(&registry), 0);
    }

    #[test]
    fn test_failed_credential_skipped_until_cooldown() {
        let clock = clock();
        let registry = registry(&["a", "b"], clock.clone());

        registry.report_failure("openai", 0, "401 Unauthorized");
        for _ in 0..4 {
            assert_eq!(next_index(&registry), 1);
        }

        clock.advance(Duration::from_secs(299));
        assert_eq!(next_index(&registry), 1);
        assert_eq!(next_index(&registry), 1);

        clock.advance(Duration::from_secs(1));
        let picks: Vec<usize> = (0..2).map(|_| next_index(&registry)).collect();
        assert!(picks.contains(&0));
    }

    #[test]
    fn test_all_cooling_returns_index_zero() {
        let registry = registry(&["a", "b", "c"], clock());
        for i in 0..3 {
            registry.report_failure("openai", i, "boom");
        }
        assert_eq!(next_index(&registry), 0);
        assert_eq!(next_index(&registry), 0);
    }

    #[test]
    fn test_success_restores_credential() {
        let registry = registry(&["a", "b"], clock());
        registry.report_failure("openai", 0, "boom");
        registry.report_success("openai", 0);
        let visited: Vec<usize> = (0..2).map(|_| next_index(&registry)).collect();
        assert_eq!(visited, vec![0, 1]);
    }

    #[test]
    fn test_report_failure_is_idempotent() {
        let registry = registry(&["a", "b"], clock());
        registry.report_failure("openai", 1, "boom");
        registry.report_failure("openai", 1, "boom");
        registry.report_failure("openai", 7, "out of range");
        registry.report_failure("unknown", 0, "no pool");
        assert_eq!(registry.pool_size("openai"), 2);
        assert_eq!(next_index(&registry), 0);
        assert_eq!(next_index(&registry), 0);
    }

    #[test]
    fn test_unknown_or_empty_pool() {
        let registry = registry(&["a"], clock());
        assert!(registry.next_credential("missing").is_none());
        assert!(registry.next_credential("empty").is_none());
        assert_eq!(registry.pool_size("empty"), 0);
        assert_eq!(registry.providers(), vec!["openai"]);
    }

    #[test]
    fn test_snapshot_hides_keys() {
        let clock = clock();
        let registry = registry(&["sk-very-secret"], clock.clone());
        registry.report_failure("openai", 0, "boom");
        clock.advance(Duration::from_secs(100));

        let snapshot = registry.snapshot("openai");
        assert_eq!(snapshot.len(), 1);
        assert!(!snapshot[0].working);
        assert_eq!(snapshot[0].fingerprint.len(), 8);
        assert_eq!(
            snapshot[0].cooldown_remaining,
            Some(Duration::from_secs(200))
        );

        let lease = registry.next_credential("openai").unwrap();
        assert!(!format!("{:?}", lease).contains("sk-very-secret"));
    }

    #[test]
    fn test_concurrent_selection_is_fair() {
        let registry = Arc::new(registry(&["a", "b", "c", "d"], clock()));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| registry.next_credential("openai").unwrap().index)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts = [0usize; 4];
        for handle in handles {
            for index in handle.join().unwrap() {
                counts[index] += 1;
            }
        }
        assert_eq!(counts, [100, 100, 100, 100]);
    }
}
