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

use crate::api::work_record::WorkRequest;

/// Resolves the caller of a unit of work, supplied by the host's authentication layer.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, request: &WorkRequest) -> Option<String>;
}

impl<F> IdentityProvider for F
where
    F: Fn(&WorkRequest) -> Option<String> + Send + Sync,
{
    fn resolve(&self, request: &WorkRequest) -> Option<String> {
        self(request)
    }
}

/// Takes the identity verbatim from a request attribute set by an upstream proxy.
#[derive(Debug, Clone)]
pub struct AttributeIdentityProvider {
    attribute: String,
}

impl AttributeIdentityProvider {
    pub fn new(attribute: impl Into<String>) -> Self {
        AttributeIdentityProvider {
            attribute: attribute.into(),
        }
    }
}

impl IdentityProvider for AttributeIdentityProvider {
    fn resolve(&self, request: &WorkRequest) -> Option<String> {
        request
            .attribute(&self.attribute)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_provider() {
        let provider = AttributeIdentityProvider::new("remote-user");
        let request = WorkRequest::new("GET", "/").with_attribute("remote-user", " alice ");
        assert_eq!(provider.resolve(&request), Some("alice".into()));
        let blank = WorkRequest::new("GET", "/").with_attribute("remote-user", "  ");
        assert_eq!(provider.resolve(&blank), None);
        assert_eq!(provider.resolve(&WorkRequest::new("GET", "/")), None);
    }

    #[test]
    fn test_closure_provider() {
        let provider = |r: &WorkRequest| Some(format!("{}-caller", r.method));
        assert_eq!(
            provider.resolve(&WorkRequest::new("PUT", "/")),
            Some("PUT-caller".into())
        );
    }
}
