// src/watch/probe.rs

//! Bounded waits where running out of time is the happy path.
//!
//! After submitting a form we look for an error banner for a short while.
//! Not finding it within the bound means the submission went through. Only
//! [`ActionError::Timeout`] is absorbed here; every other failure from the
//! same call is still an error.

use std::time::Duration;

use tracing::debug;

use crate::errors::ActionError;
use crate::page::{Locator, Page};

/// Result of an expected-absence probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Nothing showed up within the bound.
    Absent,
    /// The element appeared; carries its rendered text.
    Present(String),
}

impl Probe {
    pub fn is_absent(&self) -> bool {
        matches!(self, Probe::Absent)
    }
}

/// Wait up to `bound` for `locator` to become visible and read its text.
pub async fn probe_absence<P>(page: &P, locator: &Locator, bound: Duration) -> Result<Probe, ActionError>
where
    P: Page + ?Sized,
{
    match absorb_timeout(page.inner_text(locator, Some(bound)).await)? {
        Some(text) => {
            debug!(%locator, "probed element is present");
            Ok(Probe::Present(text))
        }
        None => {
            debug!(%locator, ?bound, "probed element absent within bound");
            Ok(Probe::Absent)
        }
    }
}

/// Turn an expired bounded wait into `None`, passing everything else through.
pub fn absorb_timeout<T>(res: Result<T, ActionError>) -> Result<Option<T>, ActionError> {
    match res {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_timeout() => Ok(None),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorb_timeout_only_absorbs_timeouts() {
        let timeout: Result<(), _> = Err(ActionError::Timeout {
            what: "//div".into(),
            after: Duration::from_millis(10),
        });
        assert_eq!(absorb_timeout(timeout), Ok(None));

        let closed: Result<(), _> = Err(ActionError::Closed);
        assert_eq!(absorb_timeout(closed), Err(ActionError::Closed));

        assert_eq!(absorb_timeout(Ok::<_, ActionError>(3)), Ok(Some(3)));
    }
}
