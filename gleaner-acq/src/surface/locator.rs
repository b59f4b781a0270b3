//! Element lookup with explicit outcomes and ordered fallbacks

use super::SurfaceError;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of one lookup attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located<T> {
    Found(T),
    NotFound,
    Timeout,
}

impl<T> Located<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Located::Found(value) => Some(value),
            _ => None,
        }
    }

    /// Convert to a surface result, naming what was looked for
    pub fn into_result(self, what: &str) -> Result<T, SurfaceError> {
        match self {
            Located::Found(value) => Ok(value),
            Located::NotFound => Err(SurfaceError::NotFound(what.to_string())),
            Located::Timeout => Err(SurfaceError::Timeout {
                operation: format!("locate {}", what),
                after_ms: 0,
            }),
        }
    }
}

/// Try `selectors` in order and return the first match
///
/// All probes share one `timeout` budget. Returns `Timeout` if the budget ran
/// out (or any probe timed out) before a match, `NotFound` otherwise.
pub async fn locate_first<T, F, Fut>(selectors: &[&str], timeout: Duration, mut probe: F) -> Located<T>
where
    F: FnMut(&str) -> Fut,
    Fut: Future<Output = Located<T>>,
{
    let deadline = Instant::now() + timeout;
    let mut timed_out = false;

    for selector in selectors {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            timed_out = true;
            break;
        }

        match tokio::time::timeout(remaining, probe(selector)).await {
            Ok(Located::Found(value)) => {
                debug!(selector, "Located element");
                return Located::Found(value);
            }
            Ok(Located::NotFound) => {}
            Ok(Located::Timeout) | Err(_) => timed_out = true,
        }
    }

    if timed_out {
        Located::Timeout
    } else {
        Located::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_match_wins_in_order() {
        let result = locate_first(&["#a", "#b", "#c"], Duration::from_secs(1), |s| {
            let s = s.to_string();
            async move {
                if s == "#a" {
                    Located::NotFound
                } else {
                    Located::Found(s)
                }
            }
        })
        .await;
        assert_eq!(result, Located::Found("#b".to_string()));
    }

    #[tokio::test]
    async fn test_not_found_when_nothing_matches() {
        let result: Located<()> =
            locate_first(&["#a", "#b"], Duration::from_secs(1), |_| async { Located::NotFound }).await;
        assert_eq!(result, Located::NotFound);
        assert!(result.into_result("card").is_err());
    }

    #[tokio::test]
    async fn test_timeout_when_probe_hangs() {
        let result: Located<()> = locate_first(&["#slow"], Duration::from_millis(20), |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Located::Found(())
        })
        .await;
        assert_eq!(result, Located::Timeout);
    }

    #[tokio::test]
    async fn test_later_selector_can_match_after_timeout() {
        let result = locate_first(&["#slow", "#fast"], Duration::from_secs(1), |s| {
            let slow = s == "#slow";
            async move {
                if slow {
                    Located::Timeout
                } else {
                    Located::Found(7)
                }
            }
        })
        .await;
        assert_eq!(result, Located::Found(7));
    }
}
