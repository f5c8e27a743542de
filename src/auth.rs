//! Request authentication and role gating.
//!
//! Callers present an optional process-wide API key plus event-scoped role
//! and member headers. Admin and host are interchangeable for gating.

use axum::http::HeaderMap;

use crate::error::AppError;
use crate::state::AppState;
use crate::store::events::MemberRole;
use crate::store::moderation::Viewer;

/// `x-api-key` header.
pub const API_KEY_HEADER: &str = "x-api-key";
/// `x-event-role` header.
pub const ROLE_HEADER: &str = "x-event-role";
/// `x-event-member` header.
pub const MEMBER_HEADER: &str = "x-event-member";
/// `x-client-req-id` header used for score write replays.
pub const CLIENT_REQ_ID_HEADER: &str = "x-client-req-id";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Enforce the process-wide API key when one is required.
pub fn require_api_key(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    if !state.config.require_api_key {
        return Ok(());
    }
    let expected = state
        .config
        .api_key
        .as_deref()
        .ok_or_else(|| AppError::ServiceUnavailable("api key not configured".into()))?;
    match header(headers, API_KEY_HEADER) {
        Some(presented) if presented == expected => Ok(()),
        Some(_) => Err(AppError::Forbidden("invalid api key".into())),
        None => Err(AppError::Unauthorized("missing api key".into())),
    }
}

/// Role presented by the caller, if any.
pub fn role(headers: &HeaderMap) -> Option<MemberRole> {
    header(headers, ROLE_HEADER).and_then(MemberRole::parse)
}

/// Member id presented by the caller, if any.
pub fn member_id(headers: &HeaderMap) -> Option<String> {
    header(headers, MEMBER_HEADER).map(str::to_string)
}

/// Require an admin or host role.
pub fn require_admin(headers: &HeaderMap) -> Result<MemberRole, AppError> {
    match role(headers) {
        Some(role) if role.is_admin() => Ok(role),
        _ => Err(AppError::Forbidden("admin role required".into())),
    }
}

/// Require a member id (member-scoped endpoints such as presign and react).
pub fn require_member(headers: &HeaderMap) -> Result<String, AppError> {
    member_id(headers).ok_or_else(|| AppError::Forbidden("member id required".into()))
}

/// Classify the caller for the moderation visibility matrix.
pub fn viewer(headers: &HeaderMap) -> Viewer {
    if role(headers).is_some_and(MemberRole::is_admin) {
        Viewer::Admin
    } else if member_id(headers).is_some() {
        Viewer::Member
    } else {
        Viewer::Anonymous
    }
}

/// Best-effort client identifier for per-IP rate limits.
pub fn client_ip(headers: &HeaderMap) -> String {
    header(headers, "x-forwarded-for")
        .and_then(|raw| raw.split(',').next())
        .map(|ip| ip.trim().to_string())
        .unwrap_or_else(|| "unknown".into())
}

/// `X-Client-Req-Id` value, if present.
pub fn client_req_id(headers: &HeaderMap) -> Option<String> {
    header(headers, CLIENT_REQ_ID_HEADER).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn admin_and_host_both_pass_the_admin_gate() {
        assert!(require_admin(&headers(&[(ROLE_HEADER, "admin")])).is_ok());
        assert!(require_admin(&headers(&[(ROLE_HEADER, "host")])).is_ok());
        assert!(require_admin(&headers(&[(ROLE_HEADER, "spectator")])).is_err());
        assert!(require_admin(&headers(&[])).is_err());
    }

    #[test]
    fn viewer_classification() {
        assert_eq!(viewer(&headers(&[(ROLE_HEADER, "admin")])), Viewer::Admin);
        assert_eq!(
            viewer(&headers(&[(ROLE_HEADER, "spectator"), (MEMBER_HEADER, "m1")])),
            Viewer::Member
        );
        assert_eq!(viewer(&headers(&[])), Viewer::Anonymous);
    }

    #[test]
    fn forwarded_ip_takes_the_first_hop() {
        let map = headers(&[("x-forwarded-for", "10.0.0.1, 10.0.0.2")]);
        assert_eq!(client_ip(&map), "10.0.0.1");
        assert_eq!(client_ip(&headers(&[])), "unknown");
    }
}
