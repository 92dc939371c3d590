use super::{JobError, JobEventData};

/// Caller-supplied transforms applied before anything reaches the store.
pub trait HookPolicy: Send + Sync {
    /// Text stored for a failed job.
    fn stringify_error(&self, error: &JobError) -> String {
        error.to_string()
    }

    /// Rewrites a dispatched job before it is recorded, e.g. to redact its
    /// payload.
    fn transform_payload(&self, data: JobEventData) -> JobEventData {
        data
    }
}

/// Stores payloads as given and errors by their `Display` text.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHookPolicy;

impl HookPolicy for DefaultHookPolicy {}

/// Caps stored payloads at `max_bytes`, after applying the wrapped policy.
#[derive(Debug, Clone)]
pub struct TruncatingPolicy<P = DefaultHookPolicy> {
    max_bytes: usize,
    inner: P,
}

impl TruncatingPolicy {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            inner: DefaultHookPolicy,
        }
    }
}

impl<P: HookPolicy> TruncatingPolicy<P> {
    pub fn wrapping(max_bytes: usize, inner: P) -> Self {
        Self { max_bytes, inner }
    }
}

impl<P: HookPolicy> HookPolicy for TruncatingPolicy<P> {
    fn stringify_error(&self, error: &JobError) -> String {
        self.inner.stringify_error(error)
    }

    fn transform_payload(&self, data: JobEventData) -> JobEventData {
        let mut data = self.inner.transform_payload(data);
        data.payload.truncate(self.max_bytes);
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct Redacting;

    impl HookPolicy for Redacting {
        fn stringify_error(&self, _error: &JobError) -> String {
            "redacted".to_string()
        }

        fn transform_payload(&self, mut data: JobEventData) -> JobEventData {
            data.payload = b"{\"password\":\"***\"}".to_vec();
            data
        }
    }

    fn event(payload: &[u8]) -> JobEventData {
        JobEventData {
            id: "J1".to_string(),
            job_name: "send-email".to_string(),
            queue_name: "default".to_string(),
            payload: payload.to_vec(),
            max_retry_count: 0,
            delay_until: None,
            queued_at: Utc::now(),
        }
    }

    #[test]
    fn test_default_policy_is_identity() {
        let data = event(b"hello");
        assert_eq!(DefaultHookPolicy.transform_payload(data.clone()), data);

        let error = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert_eq!(DefaultHookPolicy.stringify_error(&error), "disk full");
    }

    #[test]
    fn test_truncation_applies_after_inner_policy() {
        let short = TruncatingPolicy::new(3).transform_payload(event(b"hello"));
        assert_eq!(short.payload, b"hel");

        let policy = TruncatingPolicy::wrapping(12, Redacting);
        let data = policy.transform_payload(event(b"{\"password\":\"hunter2\"}"));
        assert_eq!(data.payload, b"{\"password\":");

        let error = std::io::Error::new(std::io::ErrorKind::Other, "secret");
        assert_eq!(policy.stringify_error(&error), "redacted");
    }
}
