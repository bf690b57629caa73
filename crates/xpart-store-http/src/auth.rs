// crates/xpart-store-http/src/auth.rs
// ============================================================================
// Module: Master Key Authorization
// Description: Request signing for the account REST interface.
// Purpose: Produce per-request authorization tokens and request dates.
// Dependencies: base64, hmac, sha2, time, url
// ============================================================================

//! ## Overview
//! Every request carries an `x-ms-date` header and an `authorization` token.
//! The token is an HMAC-SHA256 over the lowercase verb, lowercase resource
//! type, resource link, and lowercase date, keyed by the base64-decoded
//! account key, then URL-encoded as `type=master&ver=1.0&sig=<signature>`.
//!
//! Security posture: the decoded key lives only inside [`MasterKey`], whose
//! `Debug` output is redacted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::Hmac;
use hmac::Mac;
use sha2::Sha256;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use xpart_core::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// RFC 1123 date layout expected by the service.
const RFC1123: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

// ============================================================================
// SECTION: Types
// ============================================================================

/// Decoded account key.
#[derive(Clone)]
pub struct MasterKey {
    /// Raw key bytes.
    bytes: Vec<u8>,
}

impl MasterKey {
    /// Decodes a base64 account key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unauthorized`] when the key is not valid base64.
    pub fn from_base64(encoded: &str) -> Result<Self, StoreError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| StoreError::Unauthorized("account key is not valid base64".to_string()))?;
        if bytes.is_empty() {
            return Err(StoreError::Unauthorized("account key is empty".to_string()));
        }
        Ok(Self {
            bytes,
        })
    }

    /// Builds the URL-encoded authorization token for one request.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unauthorized`] when the MAC cannot be keyed.
    pub fn authorization(
        &self,
        verb: &str,
        resource_type: &str,
        resource_link: &str,
        date: &str,
    ) -> Result<String, StoreError> {
        let payload = format!(
            "{}\n{}\n{}\n{}\n\n",
            verb.to_ascii_lowercase(),
            resource_type.to_ascii_lowercase(),
            resource_link,
            date.to_ascii_lowercase()
        );
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&self.bytes)
            .map_err(|_| StoreError::Unauthorized("account key rejected by hmac".to_string()))?;
        mac.update(payload.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());
        let token = format!("type=master&ver=1.0&sig={signature}");
        Ok(url::form_urlencoded::byte_serialize(token.as_bytes()).collect())
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Formats a timestamp as an RFC 1123 date in GMT.
///
/// # Errors
///
/// Returns [`StoreError::InvalidResponse`] when the timestamp cannot be
/// formatted.
pub fn rfc1123_date(now: OffsetDateTime) -> Result<String, StoreError> {
    now.to_offset(time::UtcOffset::UTC)
        .format(RFC1123)
        .map_err(|err| StoreError::InvalidResponse(format!("date formatting failed: {err}")))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
