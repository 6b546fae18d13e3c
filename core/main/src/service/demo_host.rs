// Copyright 2023 Comcast Cable Communications Management, LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0
//

use std::time::Duration;

use worktrack_sdk::{
    api::{
        context_store::{ContextStore, USER},
        identity::IdentityProvider,
        work_record::WorkRequest,
    },
    log::{error, warn},
    runtime::lifecycle::WorkTracker,
    tokio::time::sleep,
    utils::error::TrackerError,
};

pub const AUTHORIZATION_ATTRIBUTE: &str = "authorization";
pub const OUTSTANDING_PATH: &str = "/health/outstanding";

/// Reads the caller from a simulated `Authorization: Bearer <user>` header.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationIdentity;

impl IdentityProvider for AuthorizationIdentity {
    fn resolve(&self, request: &WorkRequest) -> Option<String> {
        let value = request.attribute(AUTHORIZATION_ATTRIBUTE)?;
        let (scheme, token) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let token = token.trim();
        if token.is_empty() {
            None
        } else {
            Some(token.to_owned())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DemoResponse {
    pub status: u16,
    pub body: String,
}

impl DemoResponse {
    fn ok(body: impl Into<String>) -> Self {
        DemoResponse {
            status: 200,
            body: body.into(),
        }
    }

    fn error(status: u16, body: impl Into<String>) -> Self {
        DemoResponse {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status < 300
    }
}

/// Simulated request handlers running behind the work tracker.
#[derive(Clone)]
pub struct DemoHost {
    tracker: WorkTracker,
    slow_work: Duration,
}

impl DemoHost {
    pub fn new(tracker: WorkTracker, slow_work: Duration) -> Self {
        DemoHost { tracker, slow_work }
    }

    /// Builds a request whose category is the first path segment.
    pub fn request(method: &str, path: &str, user: Option<&str>) -> WorkRequest {
        let mut request = WorkRequest::new(method, path);
        if let Some(category) = path.split('/').find(|s| !s.is_empty()) {
            request = request.with_category(category);
        }
        if let Some(user) = user {
            request = request.with_attribute(AUTHORIZATION_ATTRIBUTE, format!("Bearer {}", user));
        }
        request
    }

    pub async fn handle(&self, request: WorkRequest) -> DemoResponse {
        let host = self.clone();
        let path = request.path.clone();
        let result = self
            .tracker
            .run(request, move |work| async move {
                if work.is_flooded() {
                    warn!(
                        "rejecting {} flooded_rules={:?}",
                        path,
                        work.admission().flooded_rules
                    );
                    return DemoResponse::error(503, "service unavailable");
                }
                host.route(&path).await
            })
            .await;
        match result {
            Ok(response) => response,
            Err(TrackerError::Interrupted(id)) => {
                DemoResponse::error(504, format!("unit of work {} interrupted", id))
            }
            Err(e) => {
                error!("handle: {}", e);
                DemoResponse::error(500, e.to_string())
            }
        }
    }

    async fn route(&self, path: &str) -> DemoResponse {
        match path {
            OUTSTANDING_PATH => DemoResponse::ok(self.tracker.outstanding_view().to_html()),
            "/slow" => {
                sleep(self.slow_work).await;
                DemoResponse::ok("slow work done")
            }
            "/async" => {
                let offloaded = self.tracker.executor().execute_blocking(|| {
                    format!(
                        "offloaded for {}",
                        ContextStore::get(USER).unwrap_or_else(|| "anonymous".into())
                    )
                });
                match offloaded.await {
                    Ok(body) => DemoResponse::ok(body),
                    Err(e) => {
                        error!("offloaded work failed: {}", e);
                        DemoResponse::error(500, "offloaded work failed")
                    }
                }
            }
            p if p.starts_with("/service") => DemoResponse::ok(format!(
                "served {} for {}",
                p,
                ContextStore::get(USER).unwrap_or_else(|| "anonymous".into())
            )),
            _ => DemoResponse::error(404, "not found"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use worktrack_sdk::{
        api::config::{RuleConfig, TrackerConfig},
        tokio,
    };

    fn host(slow_work: Duration, runaway_threshold_secs: u64) -> DemoHost {
        let config = TrackerConfig {
            runaway_threshold_secs,
            sweep_interval_secs: 1,
            connection_limits: vec![RuleConfig {
                name: "service".into(),
                limit: 2,
                field: "category".into(),
                equals: Some("service".into()),
                pattern: None,
            }],
            ..Default::default()
        };
        let tracker = WorkTracker::builder(config)
            .with_identity_provider(AuthorizationIdentity)
            .build()
            .unwrap();
        DemoHost::new(tracker, slow_work)
    }

    #[rstest(
        header,
        expected,
        case("Bearer alice", Some("alice")),
        case("bearer  bob ", Some("bob")),
        case("Basic YWxpY2U6", None),
        case("Bearer ", None),
        case("alice", None)
    )]
    fn test_authorization_identity(header: &str, expected: Option<&str>) {
        let request =
            WorkRequest::new("GET", "/").with_attribute(AUTHORIZATION_ATTRIBUTE, header);
        assert_eq!(
            AuthorizationIdentity.resolve(&request),
            expected.map(String::from)
        );
    }

    #[test]
    fn test_request_category_from_path() {
        let request = DemoHost::request("GET", "/service/orders", Some("alice"));
        assert_eq!(request.category.as_deref(), Some("service"));
        assert_eq!(
            request.attribute(AUTHORIZATION_ATTRIBUTE).map(String::as_str),
            Some("Bearer alice")
        );
        assert_eq!(DemoHost::request("GET", "/", None).category, None);
    }

    #[tokio::test]
    async fn test_service_sees_caller() {
        let host = host(Duration::from_millis(10), 300);
        let response = host
            .handle(DemoHost::request("GET", "/service/orders", Some("alice")))
            .await;
        assert_eq!(response, DemoResponse::ok("served /service/orders for alice"));
        assert!(host.tracker.registry().is_empty());
    }

    #[tokio::test]
    async fn test_flooded_request_rejected() {
        let host = host(Duration::from_millis(10), 300);
        let _first = host.tracker.enter(DemoHost::request("GET", "/service/a", None));
        let _second = host.tracker.enter(DemoHost::request("GET", "/service/b", None));
        let response = host
            .handle(DemoHost::request("GET", "/service/c", None))
            .await;
        assert_eq!(response.status, 503);
        assert_eq!(host.tracker.registry().size(), 2);
        // other categories are unaffected
        let other = host.handle(DemoHost::request("GET", "/async", None)).await;
        assert!(other.is_success());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_async_offload_keeps_caller() {
        let host = host(Duration::from_millis(10), 300);
        let response = host
            .handle(DemoHost::request("POST", "/async", Some("carol")))
            .await;
        assert_eq!(response, DemoResponse::ok("offloaded for carol"));
    }

    #[tokio::test]
    async fn test_outstanding_page_lists_itself() {
        let host = host(Duration::from_millis(10), 300);
        let response = host
            .handle(DemoHost::request("GET", OUTSTANDING_PATH, None))
            .await;
        assert!(response.is_success());
        assert!(response.body.contains("<td>GET /health/outstanding</td>"));
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let host = host(Duration::from_millis(10), 300);
        let response = host.handle(DemoHost::request("GET", "/nope", None)).await;
        assert_eq!(response.status, 404);
        assert!(host.tracker.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runaway_slow_request_interrupted() {
        let host = host(Duration::from_secs(30), 5);
        host.tracker.start().unwrap();
        let response = host.handle(DemoHost::request("GET", "/slow", None)).await;
        assert_eq!(response.status, 504);
        assert!(host.tracker.registry().is_empty());
        host.tracker.stop().await.unwrap();
    }
}
