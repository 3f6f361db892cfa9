use async_trait::async_trait;
use pf_core::GameError;
use pf_core::GameResult;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;

/// Lock acquisition order. A task holding a lock of one class may only
/// acquire locks of a strictly later class; nothing acquires two locks of
/// the same class concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockClass {
    Player,
    Content,
    Phase,
    Party,
}

impl LockClass {
    /// Whether a lock of this class may be acquired while `outer` is held.
    pub fn may_follow(self, outer: LockClass) -> bool {
        self > outer
    }
}

/// Identity of a named mutex: its class plus an entity key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockName {
    class: LockClass,
    key: String,
}

impl LockName {
    pub fn player(id: impl std::fmt::Display) -> Self {
        Self {
            class: LockClass::Player,
            key: format!("player:{}", id),
        }
    }
    pub fn content(kind: &str, id: impl std::fmt::Display) -> Self {
        Self {
            class: LockClass::Content,
            key: format!("{}:{}", kind, id),
        }
    }
    pub fn phase(id: impl std::fmt::Display) -> Self {
        Self {
            class: LockClass::Phase,
            key: format!("phase:{}", id),
        }
    }
    pub fn party(id: impl std::fmt::Display) -> Self {
        Self {
            class: LockClass::Party,
            key: format!("party:{}", id),
        }
    }
    pub fn class(&self) -> LockClass {
        self.class
    }
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Display for LockName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}

/// RAII guard for a held named lock. Dropping the guard releases the lock,
/// so release on scope exit is guaranteed even across early returns.
pub struct LockGuard {
    name: LockName,
    _hold: Box<dyn std::any::Any + Send>,
}

impl LockGuard {
    pub fn new(name: LockName, hold: Box<dyn std::any::Any + Send>) -> Self {
        Self { name, _hold: hold }
    }
    pub fn name(&self) -> &LockName {
        &self.name
    }
    pub fn class(&self) -> LockClass {
        self.name.class
    }
    /// Assert the global lock order before taking a nested lock.
    pub fn check_order(&self, next: &LockName) {
        debug_assert!(
            next.class().may_follow(self.class()),
            "lock order violation: {} held while acquiring {}",
            self.name,
            next,
        );
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        log::trace!("[locks] released {}", self.name);
    }
}

/// Named mutex service usable across tasks (and, with a suitable
/// implementation, across processes). Blocking acquire with timeout.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Acquire the named lock, waiting up to `timeout`. Times out with
    /// [`GameError::LockTimeout`].
    async fn lock(&self, name: LockName, timeout: Duration) -> GameResult<LockGuard>;
}

/// In-process lock service backed by per-name tokio mutexes.
#[derive(Default)]
pub struct MemoryLocks {
    names: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MemoryLocks {
    pub fn new() -> Self {
        Self::default()
    }
    async fn entry(&self, key: &str) -> Arc<Mutex<()>> {
        self.names
            .lock()
            .await
            .entry(key.to_string())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl LockService for MemoryLocks {
    async fn lock(&self, name: LockName, timeout: Duration) -> GameResult<LockGuard> {
        let entry = self.entry(name.key()).await;
        let acquire = entry.lock_owned();
        match tokio::time::timeout(timeout, acquire).await {
            Ok(guard) => {
                log::trace!("[locks] acquired {}", name);
                Ok(LockGuard::new(
                    name,
                    Box::new(guard) as Box<dyn std::any::Any + Send>,
                ))
            }
            Err(_) => Err(GameError::LockTimeout(name.key().to_string())),
        }
    }
}

// OwnedMutexGuard is 'static, so it can ride inside the type-erased guard.
const _: fn() = || {
    fn assert_send<T: Send + 'static>() {}
    assert_send::<OwnedMutexGuard<()>>();
};

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_is_exclusive_until_dropped() {
        let locks = MemoryLocks::new();
        let name = LockName::player("p1");
        let held = locks
            .lock(name.clone(), Duration::from_millis(50))
            .await
            .unwrap();
        let contended = locks.lock(name.clone(), Duration::from_millis(50)).await;
        assert!(matches!(contended, Err(GameError::LockTimeout(_))));
        drop(held);
        let reacquired = locks.lock(name, Duration::from_millis(50)).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn distinct_names_do_not_contend() {
        let locks = MemoryLocks::new();
        let a = locks
            .lock(LockName::content("quip", "pA"), Duration::from_millis(50))
            .await
            .unwrap();
        let b = locks
            .lock(LockName::content("quip", "pB"), Duration::from_millis(50))
            .await;
        assert!(b.is_ok());
        drop(a);
    }

    #[test]
    fn class_order_is_player_content_phase_party() {
        assert!(LockClass::Content.may_follow(LockClass::Player));
        assert!(LockClass::Phase.may_follow(LockClass::Content));
        assert!(LockClass::Party.may_follow(LockClass::Phase));
        assert!(!LockClass::Player.may_follow(LockClass::Content));
        assert!(!LockClass::Player.may_follow(LockClass::Player));
    }
}
