//! Signed viewer tokens and event invites.
//!
//! Viewer tokens are opaque strings `viewerIdHex.exp.sigB64url` where the
//! signature is HMAC-SHA256 over `viewerId|eventId|exp`. Invites are
//! `b64url(json).sigB64url` envelopes with canonical sorted-key JSON
//! `{"event":…,"exp":…,"type":"invite"}`; exchanging one mints a fresh
//! viewer token bound to the invite's event.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rand::TryRngCore;
use rand::rngs::OsRng;
use serde_json::Value;
use sha2::Sha256;
use time::OffsetDateTime;

use crate::error::ServiceError;

type HmacSha256 = Hmac<Sha256>;

const SIGNING_DISABLED: &str = "viewer token signing disabled";

/// A freshly minted viewer token.
#[derive(Debug, Clone)]
pub struct MintedToken {
    /// Opaque wire token.
    pub token: String,
    /// Hex viewer identifier embedded in the token.
    pub viewer_id: String,
    /// Expiry as unix seconds.
    pub exp: i64,
}

/// A freshly minted invite envelope.
#[derive(Debug, Clone)]
pub struct MintedInvite {
    /// Opaque invite string.
    pub invite: String,
    /// Expiry as unix seconds.
    pub exp: i64,
}

/// Result of exchanging an invite for a viewer token.
#[derive(Debug, Clone)]
pub struct ExchangedToken {
    /// Event the invite (and therefore the token) is bound to.
    pub event_id: String,
    /// The minted viewer token.
    pub token: MintedToken,
}

/// Metadata recoverable from a token without verifying it.
#[derive(Debug, Clone)]
pub struct TokenMetadata {
    /// Hex viewer identifier.
    pub viewer_id: String,
    /// Expiry as unix seconds.
    pub exp: i64,
}

/// Mints and verifies viewer tokens and invites with a shared HMAC key.
#[derive(Clone)]
pub struct TokenService {
    key: Option<Vec<u8>>,
}

impl TokenService {
    /// Build a service around an optional signing key; minting and
    /// verification fail with a disabled error while the key is unset.
    pub fn new(key: Option<String>) -> Self {
        Self {
            key: key.filter(|k| !k.is_empty()).map(String::into_bytes),
        }
    }

    fn mac(&self) -> Result<HmacSha256, ServiceError> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| ServiceError::Disabled(SIGNING_DISABLED.into()))?;
        HmacSha256::new_from_slice(key)
            .map_err(|err| ServiceError::Internal(format!("bad signing key: {err}")))
    }

    fn sign(&self, message: &[u8]) -> Result<String, ServiceError> {
        let mut mac = self.mac()?;
        mac.update(message);
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    fn verify(&self, message: &[u8], sig_b64: &str) -> Result<bool, ServiceError> {
        let Ok(sig) = URL_SAFE_NO_PAD.decode(sig_b64) else {
            return Ok(false);
        };
        let mut mac = self.mac()?;
        mac.update(message);
        // verify_slice is constant-time.
        Ok(mac.verify_slice(&sig).is_ok())
    }

    /// Mint a viewer token for an event; `ttl_s` is clamped to at least one
    /// second.
    pub fn mint_viewer_token(
        &self,
        event_id: &str,
        ttl_s: i64,
    ) -> Result<MintedToken, ServiceError> {
        self.mint_viewer_token_at(event_id, ttl_s, now_s())
    }

    pub(crate) fn mint_viewer_token_at(
        &self,
        event_id: &str,
        ttl_s: i64,
        now: i64,
    ) -> Result<MintedToken, ServiceError> {
        let viewer_id = random_viewer_id()?;
        let exp = now + ttl_s.max(1);
        let sig = self.sign(signing_input(&viewer_id, event_id, exp).as_bytes())?;
        Ok(MintedToken {
            token: format!("{viewer_id}.{exp}.{sig}"),
            viewer_id,
            exp,
        })
    }

    /// Verify a viewer token against an event, returning the viewer id when
    /// the signature checks out and the token has not expired.
    pub fn verify_viewer_token(
        &self,
        event_id: &str,
        token: &str,
    ) -> Result<Option<String>, ServiceError> {
        self.verify_viewer_token_at(event_id, token, now_s())
    }

    pub(crate) fn verify_viewer_token_at(
        &self,
        event_id: &str,
        token: &str,
        now: i64,
    ) -> Result<Option<String>, ServiceError> {
        let Some((viewer_id, exp, sig)) = split_token(token) else {
            return Ok(None);
        };
        if exp <= now {
            return Ok(None);
        }
        if !self.verify(signing_input(&viewer_id, event_id, exp).as_bytes(), &sig)? {
            return Ok(None);
        }
        Ok(Some(viewer_id))
    }

    /// Mint an invite envelope convertible into a viewer token for one event.
    pub fn mint_invite(&self, event_id: &str, ttl_s: i64) -> Result<MintedInvite, ServiceError> {
        self.mint_invite_at(event_id, ttl_s, now_s())
    }

    pub(crate) fn mint_invite_at(
        &self,
        event_id: &str,
        ttl_s: i64,
        now: i64,
    ) -> Result<MintedInvite, ServiceError> {
        let exp = now + ttl_s.max(1);
        let envelope = canonical_invite_json(event_id, exp);
        let sig = self.sign(envelope.as_bytes())?;
        let body = URL_SAFE_NO_PAD.encode(envelope.as_bytes());
        Ok(MintedInvite {
            invite: format!("{body}.{sig}"),
            exp,
        })
    }

    /// Exchange a valid invite for a fresh viewer token bound to the
    /// invite's event. Each exchange yields a new viewer id.
    pub fn exchange_invite(&self, invite: &str) -> Result<ExchangedToken, ServiceError> {
        self.exchange_invite_at(invite, now_s())
    }

    pub(crate) fn exchange_invite_at(
        &self,
        invite: &str,
        now: i64,
    ) -> Result<ExchangedToken, ServiceError> {
        let invalid = || ServiceError::InvalidInput("invalid invite".into());

        let (body_b64, sig) = invite.split_once('.').ok_or_else(invalid)?;
        let body = URL_SAFE_NO_PAD.decode(body_b64).map_err(|_| invalid())?;
        if !self.verify(&body, sig)? {
            return Err(invalid());
        }

        let envelope: Value = serde_json::from_slice(&body).map_err(|_| invalid())?;
        if envelope.get("type").and_then(Value::as_str) != Some("invite") {
            return Err(invalid());
        }
        let event_id = envelope
            .get("event")
            .and_then(Value::as_str)
            .filter(|event| !event.is_empty())
            .ok_or_else(invalid)?
            .to_string();
        let exp = envelope.get("exp").and_then(Value::as_i64).ok_or_else(invalid)?;
        if exp <= now {
            return Err(ServiceError::InvalidInput("invite expired".into()));
        }

        let ttl = (exp - now).max(1);
        let token = self.mint_viewer_token_at(&event_id, ttl, now)?;
        Ok(ExchangedToken { event_id, token })
    }
}

/// Decode the viewer id and expiry from a token without verifying it.
pub fn decode_token(token: &str) -> Option<TokenMetadata> {
    split_token(token).map(|(viewer_id, exp, _)| TokenMetadata { viewer_id, exp })
}

fn split_token(token: &str) -> Option<(String, i64, String)> {
    let mut parts = token.split('.');
    let viewer_id = parts.next()?;
    let exp = parts.next()?.parse::<i64>().ok()?;
    let sig = parts.next()?;
    if parts.next().is_some() || viewer_id.is_empty() || sig.is_empty() {
        return None;
    }
    Some((viewer_id.to_string(), exp, sig.to_string()))
}

fn signing_input(viewer_id: &str, event_id: &str, exp: i64) -> String {
    format!("{viewer_id}|{event_id}|{exp}")
}

/// Canonical sorted-key invite JSON with compact separators.
fn canonical_invite_json(event_id: &str, exp: i64) -> String {
    let event = serde_json::to_string(event_id).expect("string serializes");
    format!("{{\"event\":{event},\"exp\":{exp},\"type\":\"invite\"}}")
}

fn random_viewer_id() -> Result<String, ServiceError> {
    let mut bytes = [0u8; 8];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| ServiceError::Internal(format!("randomness unavailable: {err}")))?;
    Ok(hex::encode(bytes))
}

fn now_s() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(Some("test-signing-key".into()))
    }

    #[test]
    fn mint_then_verify_round_trips() {
        let tokens = service();
        let minted = tokens.mint_viewer_token_at("event-1", 900, 1_000).unwrap();
        let verified = tokens
            .verify_viewer_token_at("event-1", &minted.token, 1_000)
            .unwrap();
        assert_eq!(verified.as_deref(), Some(minted.viewer_id.as_str()));
    }

    #[test]
    fn verification_fails_after_expiry() {
        let tokens = service();
        let minted = tokens.mint_viewer_token_at("event-1", 60, 1_000).unwrap();
        assert!(
            tokens
                .verify_viewer_token_at("event-1", &minted.token, minted.exp)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn verification_fails_for_other_event() {
        let tokens = service();
        let minted = tokens.mint_viewer_token_at("event-1", 900, 1_000).unwrap();
        assert!(
            tokens
                .verify_viewer_token_at("event-2", &minted.token, 1_000)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let tokens = service();
        let minted = tokens.mint_viewer_token_at("event-1", 900, 1_000).unwrap();
        let mut tampered = minted.token.clone();
        tampered.pop();
        tampered.push('A');
        assert!(
            tokens
                .verify_viewer_token_at("event-1", &tampered, 1_000)
                .unwrap()
                .is_none()
        );
        assert!(
            tokens
                .verify_viewer_token_at("event-1", "not-even-a-token", 1_000)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn minting_without_key_is_disabled() {
        let tokens = TokenService::new(None);
        let err = tokens.mint_viewer_token_at("event-1", 900, 1_000).unwrap_err();
        assert!(matches!(err, ServiceError::Disabled(_)));
    }

    #[test]
    fn invite_exchange_binds_the_event() {
        let tokens = service();
        let invite = tokens.mint_invite_at("event-7", 300, 1_000).unwrap();
        let exchanged = tokens.exchange_invite_at(&invite.invite, 1_010).unwrap();
        assert_eq!(exchanged.event_id, "event-7");
        assert!(
            tokens
                .verify_viewer_token_at("event-7", &exchanged.token.token, 1_010)
                .unwrap()
                .is_some()
        );
        assert!(
            tokens
                .verify_viewer_token_at("event-8", &exchanged.token.token, 1_010)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn invite_exchange_produces_fresh_viewer_ids() {
        let tokens = service();
        let invite = tokens.mint_invite_at("event-7", 300, 1_000).unwrap();
        let first = tokens.exchange_invite_at(&invite.invite, 1_010).unwrap();
        let second = tokens.exchange_invite_at(&invite.invite, 1_010).unwrap();
        assert_ne!(first.token.viewer_id, second.token.viewer_id);
    }

    #[test]
    fn expired_or_mangled_invites_are_rejected() {
        let tokens = service();
        let invite = tokens.mint_invite_at("event-7", 10, 1_000).unwrap();
        assert!(tokens.exchange_invite_at(&invite.invite, 2_000).is_err());
        assert!(tokens.exchange_invite_at("garbage", 1_000).is_err());

        // Valid signature over a non-invite envelope must not exchange.
        let envelope = "{\"event\":\"event-7\",\"exp\":9999,\"type\":\"other\"}";
        let sig = tokens.sign(envelope.as_bytes()).unwrap();
        let forged = format!("{}.{sig}", URL_SAFE_NO_PAD.encode(envelope));
        assert!(tokens.exchange_invite_at(&forged, 1_000).is_err());
    }
}
