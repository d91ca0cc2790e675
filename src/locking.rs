use std::{
    fmt::{self, Display},
    str::FromStr,
    sync::Arc,
};

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

/// Describes how a parameter store is synchronized when multiple threads update it.
///
/// The variants are ordered by increasing safety and coordination cost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockingPolicy {
    /// No synchronization, meant for a single threaded caller.
    ///
    /// Sharing the store is memory safe but concurrent updates to the same
    /// element may be lost.
    #[default]
    None,
    /// Every element is updated with an atomic compare-and-swap.
    ///
    /// Aggregate calls are not atomic as a whole, a concurrent reader may
    /// observe a partially updated store.
    Atomic,
    /// A single lock guards the entire store for the duration of each call.
    Coarse,
    /// One lock per leaf row, calls are only serialized row by row.
    Fine,
}

impl Display for LockingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LockingPolicy::None => "none",
            LockingPolicy::Atomic => "atomic",
            LockingPolicy::Coarse => "coarse",
            LockingPolicy::Fine => "fine",
        };

        f.write_str(s)
    }
}

impl FromStr for LockingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(LockingPolicy::None),
            "atomic" => Ok(LockingPolicy::Atomic),
            "coarse" => Ok(LockingPolicy::Coarse),
            "fine" => Ok(LockingPolicy::Fine),
            other => Err(format!("unknown locking policy '{other}'")),
        }
    }
}

/// How the leaves of a store read and write their elements once the
/// store-wide lock, if any, has been taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    /// Relaxed loads and stores.
    Plain,
    /// Relaxed loads and stores inside the coarse lock.
    Serial,
    /// Compare-and-swap per element.
    Atomic,
    /// Relaxed loads and stores while holding each row's lock.
    Rows,
}

impl Access {
    pub(crate) fn locks_rows(self) -> bool {
        self == Access::Rows
    }
}

/// A locking policy together with the coarse lock it is enforced with.
///
/// Clones share the same lock, every tree of a hierarchy holds a clone of
/// its root's `Locking`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Locking {
    policy: LockingPolicy,
    lock: Arc<Mutex<()>>,
}

impl Locking {
    /// Creates a new `Locking` with a fresh coarse lock.
    ///
    /// # Arguments
    /// * `policy` - The policy to enforce.
    ///
    /// # Returns
    /// A new `Locking` instance.
    pub(crate) fn new(policy: LockingPolicy) -> Self {
        Self {
            policy,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub(crate) fn policy(&self) -> LockingPolicy {
        self.policy
    }

    pub(crate) fn access(&self) -> Access {
        match self.policy {
            LockingPolicy::None => Access::Plain,
            LockingPolicy::Atomic => Access::Atomic,
            LockingPolicy::Coarse => Access::Serial,
            LockingPolicy::Fine => Access::Rows,
        }
    }

    #[cfg(test)]
    pub(crate) fn shares_lock(&self, other: &Locking) -> bool {
        Arc::ptr_eq(&self.lock, &other.lock)
    }

    /// Takes the coarse lock when the policy asks for it.
    ///
    /// # Returns
    /// The guard to hold for the whole call, or `None` for the other policies.
    pub(crate) fn enter(&self) -> Option<MutexGuard<'_, ()>> {
        (self.policy == LockingPolicy::Coarse).then(|| self.lock.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_policies() {
        assert_eq!("none".parse::<LockingPolicy>(), Ok(LockingPolicy::None));
        assert_eq!(" Atomic ".parse::<LockingPolicy>(), Ok(LockingPolicy::Atomic));
        assert_eq!("COARSE".parse::<LockingPolicy>(), Ok(LockingPolicy::Coarse));
        assert_eq!("fine".parse::<LockingPolicy>(), Ok(LockingPolicy::Fine));
        assert!("spin".parse::<LockingPolicy>().is_err());
        assert_eq!(LockingPolicy::Fine.to_string(), "fine");
    }

    #[test]
    fn deserializes_snake_case() {
        let policy: LockingPolicy = serde_json::from_str("\"coarse\"").unwrap();
        assert_eq!(policy, LockingPolicy::Coarse);
    }

    #[test]
    fn only_coarse_takes_the_store_lock() {
        for policy in [LockingPolicy::None, LockingPolicy::Atomic, LockingPolicy::Fine] {
            assert!(Locking::new(policy).enter().is_none());
        }

        let locking = Locking::new(LockingPolicy::Coarse);
        let shared = locking.clone();
        let guard = locking.enter();
        assert!(guard.is_some());
        assert!(shared.lock.try_lock().is_none());
        drop(guard);
        assert!(shared.lock.try_lock().is_some());
    }

    #[test]
    fn access_follows_the_policy() {
        assert_eq!(Locking::new(LockingPolicy::None).access(), Access::Plain);
        assert_eq!(Locking::new(LockingPolicy::Atomic).access(), Access::Atomic);
        assert_eq!(Locking::new(LockingPolicy::Coarse).access(), Access::Serial);
        assert_eq!(Locking::new(LockingPolicy::Fine).access(), Access::Rows);
        assert!(Access::Rows.locks_rows());
    }
}
