//! Ordered set of credentials with rotation on authentication failures.
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use anyhow::Result;

use crate::conf::Credential;

/// Ordered set of credentials and the index of the one currently in use.
///
/// When a request fails authentication the credential it was issued with is reported
/// to [`Credentials::rotate_from`]. The active credential moves to the next one in the set
/// only if the reported credential is still the active one: concurrent failures observed
/// against the same credential rotate once, not once per failure.
#[derive(Debug)]
pub struct Credentials {
    current: AtomicUsize,
    list: Vec<Credential>,
}

impl Credentials {
    /// Credential currently in use along with its position in the set.
    pub fn current(&self) -> (usize, &Credential) {
        let index = self.current.load(Ordering::Acquire);
        (index, &self.list[index])
    }

    /// Number of credentials in the set.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Initialise a credentials set, which must not be empty.
    pub fn new(list: Vec<Credential>) -> Result<Credentials> {
        if list.is_empty() {
            anyhow::bail!(crate::error::NoCredentials);
        }
        Ok(Credentials {
            current: AtomicUsize::new(0),
            list,
        })
    }

    /// Move to the credential after `observed`, if `observed` is still the active one.
    ///
    /// Returns `true` if this call changed the active credential.
    pub fn rotate_from(&self, observed: usize) -> bool {
        let next = (observed + 1) % self.list.len();
        self.current
            .compare_exchange(observed, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::Credentials;
    use crate::conf::Credential;

    fn credentials() -> Credentials {
        Credentials::new(vec![Credential::named("a"), Credential::named("b")]).unwrap()
    }

    #[test]
    fn empty_set_is_rejected() {
        let error = Credentials::new(vec![]).unwrap_err();
        assert!(error.is::<crate::error::NoCredentials>());
    }

    #[test]
    fn rotate_moves_to_next() {
        let credentials = credentials();
        assert!(credentials.rotate_from(0));
        let (index, credential) = credentials.current();
        assert_eq!(index, 1);
        assert_eq!(credential.name, "b");
    }

    #[test]
    fn rotate_wraps_around() {
        let credentials = credentials();
        assert!(credentials.rotate_from(0));
        assert!(credentials.rotate_from(1));
        assert_eq!(credentials.current().0, 0);
    }

    #[test]
    fn stale_failure_does_not_rotate() {
        let credentials = credentials();
        assert!(credentials.rotate_from(0));

        // A second failure reported against "a" arrives after the rotation.
        assert!(!credentials.rotate_from(0));
        assert_eq!(credentials.current().1.name, "b");

        // Only a failure observed on "b" moves back.
        assert!(credentials.rotate_from(1));
        assert_eq!(credentials.current().1.name, "a");
    }

    #[test]
    fn single_credential_stays_put() {
        let credentials = Credentials::new(vec![Credential::named("only")]).unwrap();
        assert!(credentials.rotate_from(0));
        assert_eq!(credentials.current().0, 0);
    }
}
