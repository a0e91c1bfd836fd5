use serde::{Deserialize, Serialize};

/// Outcome of probing one service's health endpoint.
///
/// `reachable` is only true when the endpoint answered with a 2xx status.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct HealthResult {
    pub service_name: String,
    pub reachable: bool,
    pub raw_response: Option<String>,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

impl HealthResult {
    /// Any HTTP answer; reachability follows the status code.
    pub fn answered(service_name: impl Into<String>, status_code: u16, body: String) -> Self {
        Self {
            service_name: service_name.into(),
            reachable: (200..300).contains(&status_code),
            raw_response: Some(body),
            status_code: Some(status_code),
            error: None,
        }
    }

    pub fn unreachable(service_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            reachable: false,
            raw_response: None,
            status_code: None,
            error: Some(error.into()),
        }
    }
}

/// Body returned by `GET /health` on a managed service.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct HealthReport {
    pub status: String,
}

impl HealthReport {
    pub fn ok(name: &str) -> Self {
        Self {
            status: format!("{} ok", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reachable_only_on_success_status() {
        let ok = HealthResult::answered("credit", 200, "{\"status\":\"credit ok\"}".into());
        assert!(ok.reachable);
        assert_eq!(ok.status_code, Some(200));

        let broken = HealthResult::answered("credit", 503, "starting".into());
        assert!(!broken.reachable);
        assert_eq!(broken.raw_response.as_deref(), Some("starting"));
    }

    #[test]
    fn test_unreachable_has_no_response() {
        let res = HealthResult::unreachable("asset", "connection refused");
        assert!(!res.reachable);
        assert!(res.raw_response.is_none());
        assert_eq!(res.error.as_deref(), Some("connection refused"));
    }
}
