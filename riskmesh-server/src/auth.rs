// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Principal resolution. Authentication policy here is deliberately thin —
//! a principal identifier maps only to a rate-limit bucket, not to any
//! permission model. Every non-health request carries the principal in the
//! `x-riskmesh-principal` header.

use axum::http::HeaderMap;

pub const PRINCIPAL_HEADER: &str = "x-riskmesh-principal";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrincipalResolution {
    Known(String),
    Missing,
}

/// Reads the principal header. Does not enforce the deny-unknown-principal
/// policy itself — that's the rate limiter's job once it sees `Missing` or
/// an unrecognized value; this function only extracts what was sent.
pub fn resolve_principal(headers: &HeaderMap) -> PrincipalResolution {
    match headers.get(PRINCIPAL_HEADER).and_then(|v| v.to_str().ok()) {
        Some(value) if !value.trim().is_empty() => PrincipalResolution::Known(value.trim().to_string()),
        _ => PrincipalResolution::Missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extracts_a_present_header() {
        let mut headers = HeaderMap::new();
        headers.insert(PRINCIPAL_HEADER, HeaderValue::from_static("tenant-a"));
        assert_eq!(resolve_principal(&headers), PrincipalResolution::Known("tenant-a".to_string()));
    }

    #[test]
    fn missing_header_resolves_to_missing() {
        let headers = HeaderMap::new();
        assert_eq!(resolve_principal(&headers), PrincipalResolution::Missing);
    }

    #[test]
    fn blank_header_resolves_to_missing() {
        let mut headers = HeaderMap::new();
        headers.insert(PRINCIPAL_HEADER, HeaderValue::from_static("   "));
        assert_eq!(resolve_principal(&headers), PrincipalResolution::Missing);
    }
}
