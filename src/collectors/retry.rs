//! Bounded corrective retry and sub-facet error classification.

use std::fmt::Display;
use std::future::Future;

use crate::orchestrator::CollectContext;
use crate::{unit_debug, unit_warn};

/// Run `op`, and when `classify` recognizes the failure and returns a
/// corrected state (for example the endpoint named in a redirect), run it
/// again with that state. At most `max_attempts` calls are made.
pub async fn corrective_retry<S, T, E, F, Fut, C>(initial: S, max_attempts: usize, classify: C, mut op: F) -> Result<T, E>
where
    F: FnMut(S) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> Option<S>,
{
    let mut state = initial;
    let mut attempt = 1;
    loop {
        match op(state).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts => return Err(e),
            Err(e) => match classify(&e) {
                Some(corrected) => {
                    state = corrected;
                    attempt += 1;
                }
                None => return Err(e),
            },
        }
    }
}

/// Whether an error only says a sub-facet is absent or not visible to us.
pub fn is_absent_error(message: &str) -> bool {
    const MARKERS: [&str; 12] = [
        "NoSuchEntity",
        "NoSuchBucketPolicy",
        "NoSuchLifecycleConfiguration",
        "NoSuchTagSet",
        "ServerSideEncryptionConfigurationNotFoundError",
        "NotFound",
        "AccessDenied",
        "UnauthorizedOperation",
        "Forbidden",
        "Permission denied",
        "403",
        "404",
    ];
    MARKERS.iter().any(|m| message.contains(m))
}

/// Turn the result of an optional detail call into an optional field.
///
/// Absent or forbidden facets are logged at debug level; anything else is a
/// warning. Neither fails the record.
pub fn optional_facet<T, E: Display>(ctx: &CollectContext, facet: &str, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            let message = e.to_string();
            if is_absent_error(&message) {
                unit_debug!(ctx, "{} not available: {}", facet, message);
            } else {
                unit_warn!(ctx, "{} lookup failed: {}", facet, message);
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::UnitLabels;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[derive(Debug)]
    enum FakeError {
        WrongEndpoint(String),
        Denied,
    }

    #[tokio::test]
    async fn test_retries_once_with_corrected_endpoint() {
        let mut seen = Vec::new();
        let result = corrective_retry(
            "us-east-1".to_string(),
            2,
            |e: &FakeError| match e {
                FakeError::WrongEndpoint(region) => Some(region.clone()),
                FakeError::Denied => None,
            },
            |region: String| {
                seen.push(region.clone());
                async move {
                    if region == "eu-west-1" {
                        Ok("policy")
                    } else {
                        Err(FakeError::WrongEndpoint("eu-west-1".to_string()))
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), "policy");
        assert_eq!(seen, vec!["us-east-1", "eu-west-1"]);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let mut calls = 0;
        let result: Result<(), FakeError> = corrective_retry(
            0u32,
            2,
            |_e: &FakeError| Some(1),
            |_| {
                calls += 1;
                async { Err(FakeError::WrongEndpoint("x".to_string())) }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 2);

        let mut calls = 0;
        let result: Result<(), FakeError> = corrective_retry(
            0u32,
            5,
            |_e: &FakeError| None,
            |_| {
                calls += 1;
                async { Err(FakeError::Denied) }
            },
        )
        .await;
        assert!(matches!(result, Err(FakeError::Denied)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_absent_errors() {
        assert!(is_absent_error("NoSuchBucketPolicy: The bucket policy does not exist"));
        assert!(is_absent_error("AccessDenied: Access Denied"));
        assert!(is_absent_error("Request ID: x, status 404"));
        assert!(!is_absent_error("Throttling: Rate exceeded"));
    }

    #[test]
    fn test_optional_facet() {
        let ctx = CollectContext::new(
            UnitLabels::new("a", "r1", "Bucket"),
            &CancellationToken::new(),
            Duration::from_secs(1),
        );
        assert_eq!(optional_facet::<_, String>(&ctx, "policy", Ok(3)), Some(3));
        assert_eq!(optional_facet::<u8, _>(&ctx, "policy", Err("NoSuchBucketPolicy")), None);
        assert_eq!(optional_facet::<u8, _>(&ctx, "tags", Err("InternalError")), None);
    }
}
