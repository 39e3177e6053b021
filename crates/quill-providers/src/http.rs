use core::time::Duration;

use quill_core::{ProviderError, ProviderResult};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Error as ReqwestError, Response as HttpResponse};
use serde::de::DeserializeOwned;

/// Classifies a transport-level failure (no HTTP status available).
pub(crate) fn classify_transport(error: &ReqwestError, timeout: Duration) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(timeout)
    } else if error.is_decode() {
        ProviderError::MalformedResponse(error.to_string())
    } else {
        ProviderError::Unavailable(error.to_string())
    }
}

/// Longest `Retry-After` honoured, in seconds.
const MAX_RETRY_AFTER_SECS: u64 = 3600;

/// Parses a delta-seconds `Retry-After` header, capped at one hour.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(|seconds| Duration::from_secs(seconds.min(MAX_RETRY_AFTER_SECS)))
}

/// Passes successful responses through and classifies everything else.
pub(crate) async fn check_status(
    response: HttpResponse,
    timeout: Duration,
) -> ProviderResult<HttpResponse> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let wait = retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    Err(match ProviderError::from_status(status.as_u16(), wait, &body) {
        ProviderError::Timeout(_) => ProviderError::Timeout(timeout),
        other => other,
    })
}

/// Decodes a JSON body, treating anything undecodable as malformed.
pub(crate) async fn decode<T: DeserializeOwned>(
    response: HttpResponse,
    timeout: Duration,
) -> ProviderResult<T> {
    response.json::<T>().await.map_err(|error| {
        if error.is_timeout() {
            ProviderError::Timeout(timeout)
        } else {
            ProviderError::MalformedResponse(format!("Failed to parse response: {error}"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(12)));
    }

    #[test]
    fn test_retry_after_is_capped() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("18446744073709551615"),
        );
        assert_eq!(
            retry_after(&headers),
            Some(Duration::from_secs(MAX_RETRY_AFTER_SECS))
        );
    }

    #[test]
    fn test_retry_after_http_date_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
        assert_eq!(retry_after(&HeaderMap::new()), None);
    }
}
