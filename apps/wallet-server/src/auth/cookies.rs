// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token extraction from requests and `Set-Cookie` construction.
//!
//! Cookie contract: `jwt-token` (access) and `refresh-token` (refresh),
//! `Path=/`, `SameSite=Lax`, `Max-Age` equal to the token lifetime, and
//! `Max-Age=0` to clear on logout.

use std::time::Duration;

use axum::http::{
    header::{AUTHORIZATION, COOKIE},
    HeaderMap, HeaderValue,
};

pub const ACCESS_COOKIE: &str = "jwt-token";
pub const REFRESH_COOKIE: &str = "refresh-token";

/// Read a cookie by name across every `Cookie` header. The first
/// non-empty value wins.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .filter(|(k, _)| k.trim() == name)
        .map(|(_, v)| v.trim())
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// Read a `Bearer` token from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Where a request's token was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Cookie,
    Bearer,
}

/// Gateway order: access cookie first, then bearer header.
pub fn token_cookie_first(headers: &HeaderMap) -> Option<(String, TokenSource)> {
    cookie_value(headers, ACCESS_COOKIE)
        .map(|t| (t, TokenSource::Cookie))
        .or_else(|| bearer_token(headers).map(|t| (t, TokenSource::Bearer)))
}

/// Service order: bearer header first, then access cookie.
pub fn token_header_first(headers: &HeaderMap) -> Option<(String, TokenSource)> {
    bearer_token(headers)
        .map(|t| (t, TokenSource::Bearer))
        .or_else(|| cookie_value(headers, ACCESS_COOKIE).map(|t| (t, TokenSource::Cookie)))
}

/// Cookie attributes shared by every token cookie.
#[derive(Debug, Clone, Copy, Default)]
pub struct CookiePolicy {
    pub secure: bool,
}

impl CookiePolicy {
    pub fn set(&self, name: &str, value: &str, max_age: Duration) -> Option<HeaderValue> {
        let secure = if self.secure { "; Secure" } else { "" };
        HeaderValue::from_str(&format!(
            "{name}={value}; Path=/; Max-Age={}; SameSite=Lax; HttpOnly{secure}",
            max_age.as_secs()
        ))
        .ok()
    }

    pub fn clear(&self, name: &str) -> Option<HeaderValue> {
        self.set(name, "", Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, HeaderValue::from_str(v).unwrap());
        }
        map
    }

    #[test]
    fn finds_cookie_among_many() {
        let h = headers(&[("cookie", "a=1; jwt-token=abc.def.ghi ; b=2")]);
        assert_eq!(cookie_value(&h, ACCESS_COOKIE).as_deref(), Some("abc.def.ghi"));
        assert_eq!(cookie_value(&h, REFRESH_COOKIE), None);
    }

    #[test]
    fn finds_cookie_across_headers() {
        let h = headers(&[("cookie", "a=1"), ("cookie", "refresh-token=r1")]);
        assert_eq!(cookie_value(&h, REFRESH_COOKIE).as_deref(), Some("r1"));
    }

    #[test]
    fn empty_cookie_counts_as_absent() {
        let h = headers(&[("cookie", "jwt-token=; other=x")]);
        assert_eq!(cookie_value(&h, ACCESS_COOKIE), None);
    }

    #[test]
    fn skips_empty_duplicate_before_real_value() {
        let h = headers(&[("cookie", "jwt-token=; jwt-token=abc.def.ghi")]);
        assert_eq!(cookie_value(&h, ACCESS_COOKIE).as_deref(), Some("abc.def.ghi"));

        let split = headers(&[("cookie", "jwt-token="), ("cookie", "jwt-token=t2")]);
        assert_eq!(cookie_value(&split, ACCESS_COOKIE).as_deref(), Some("t2"));
    }

    #[test]
    fn bearer_requires_scheme_and_value() {
        assert_eq!(bearer_token(&headers(&[("authorization", "Bearer  tok ")])).as_deref(), Some("tok"));
        assert_eq!(bearer_token(&headers(&[("authorization", "Basic abc")])), None);
        assert_eq!(bearer_token(&headers(&[("authorization", "Bearer   ")])), None);
    }

    #[test]
    fn extraction_order_differs_by_hop() {
        let h = headers(&[("cookie", "jwt-token=from-cookie"), ("authorization", "Bearer from-header")]);
        assert_eq!(token_cookie_first(&h), Some(("from-cookie".to_string(), TokenSource::Cookie)));
        assert_eq!(token_header_first(&h), Some(("from-header".to_string(), TokenSource::Bearer)));
    }

    #[test]
    fn empty_cookie_falls_through_to_header() {
        let h = headers(&[("cookie", "jwt-token="), ("authorization", "Bearer tok")]);
        assert_eq!(token_cookie_first(&h), Some(("tok".to_string(), TokenSource::Bearer)));
    }

    #[test]
    fn set_cookie_attributes() {
        let v = CookiePolicy::default().set(ACCESS_COOKIE, "t", Duration::from_secs(86400)).unwrap();
        assert_eq!(v.to_str().unwrap(), "jwt-token=t; Path=/; Max-Age=86400; SameSite=Lax; HttpOnly");

        let cleared = CookiePolicy { secure: true }.clear(REFRESH_COOKIE).unwrap();
        assert_eq!(cleared.to_str().unwrap(), "refresh-token=; Path=/; Max-Age=0; SameSite=Lax; HttpOnly; Secure");
    }
}
