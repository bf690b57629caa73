// crates/xpart-core/src/model/connection.rs
// ============================================================================
// Module: Account Connection Strings
// Description: Tokenizer and validator for account connection strings.
// Purpose: Produce an immutable endpoint + credential descriptor.
// Dependencies: thiserror, url
// ============================================================================

//! ## Overview
//! Connection strings are `;`-delimited `name=value` settings with
//! case-insensitive names, for example
//! `AccountEndpoint=https://account.example/;AccountKey=...`. Only
//! `AccountEndpoint` and `AccountKey` are required; other settings are kept in
//! [`ConnectionSettings`] but ignored by [`ConnectionDescriptor`].
//!
//! [`ConnectionDescriptor::parse`] and [`ConnectionDescriptor::try_parse`]
//! share one tokenizer so the two call styles cannot disagree.
//!
//! Security posture: the account key is a secret. It is redacted from `Debug`
//! output and never echoed in error messages.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Setting name carrying the account endpoint URI.
pub const ACCOUNT_ENDPOINT_KEY: &str = "AccountEndpoint";
/// Setting name carrying the account credential.
pub const ACCOUNT_KEY_KEY: &str = "AccountKey";
/// Settings that must be present in every connection string.
const REQUIRED_SETTINGS: [&str; 2] = [ACCOUNT_ENDPOINT_KEY, ACCOUNT_KEY_KEY];
/// Separator between settings.
const SETTING_SEPARATOR: char = ';';
/// Separator between a setting name and its value.
const NAME_VALUE_SEPARATOR: char = '=';
/// Placeholder rendered instead of credential material.
const REDACTED: &str = "<redacted>";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Classification of connection string failures.
///
/// # Invariants
/// - `Format` covers syntax problems; `Configuration` covers values that are
///   syntactically present but unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// The connection string is missing or carries unusable values.
    Configuration,
    /// The connection string is syntactically malformed.
    Format,
}

/// Connection string parse failures.
///
/// # Invariants
/// - Messages name settings but never include setting values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionStringError {
    /// Input was empty or whitespace only.
    #[error("connection string is empty")]
    Empty,
    /// A segment was not of the form `name=value`.
    #[error("settings must be of the form \"name=value\" (segment {segment})")]
    InvalidSetting {
        /// Zero-based index of the offending non-empty segment.
        segment: usize,
    },
    /// The same setting name appeared twice (case-insensitive).
    #[error("duplicate setting '{0}' found")]
    DuplicateSetting(String),
    /// A required setting was absent.
    #[error("required setting '{0}' is missing")]
    MissingSetting(&'static str),
    /// A required setting was present but blank.
    #[error("setting '{0}' must not be empty")]
    EmptyValue(&'static str),
    /// The endpoint value is not an absolute URI.
    #[error("invalid account endpoint: {0}")]
    InvalidEndpoint(String),
}

impl ConnectionStringError {
    /// Returns whether the failure is a syntax or a configuration problem.
    #[must_use]
    pub const fn kind(&self) -> ConnectionErrorKind {
        match self {
            Self::Empty | Self::EmptyValue(_) | Self::InvalidEndpoint(_) => {
                ConnectionErrorKind::Configuration
            }
            Self::InvalidSetting {
                ..
            }
            | Self::DuplicateSetting(_)
            | Self::MissingSetting(_) => ConnectionErrorKind::Format,
        }
    }
}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Tokenized connection string settings.
///
/// # Invariants
/// - Names are unique under ASCII case folding.
/// - Original name spelling and raw values are preserved.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct ConnectionSettings {
    /// Folded name mapped to `(original name, value)`.
    entries: BTreeMap<String, (String, String)>,
}

impl ConnectionSettings {
    /// Tokenizes a connection string into settings.
    ///
    /// Empty segments are skipped. Each remaining segment is split on its
    /// first `=`, so values may contain `=` themselves. Names are trimmed;
    /// values are kept verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionStringError`] when the input is blank, a segment
    /// has no `=` or an empty name, or a name repeats.
    pub fn parse(connection_string: &str) -> Result<Self, ConnectionStringError> {
        if connection_string.trim().is_empty() {
            return Err(ConnectionStringError::Empty);
        }
        let mut entries = BTreeMap::new();
        let segments = connection_string
            .split(SETTING_SEPARATOR)
            .filter(|segment| !segment.trim().is_empty());
        for (index, segment) in segments.enumerate() {
            let Some((name, value)) = segment.split_once(NAME_VALUE_SEPARATOR) else {
                return Err(ConnectionStringError::InvalidSetting {
                    segment: index,
                });
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(ConnectionStringError::InvalidSetting {
                    segment: index,
                });
            }
            let folded = name.to_ascii_lowercase();
            if entries.contains_key(&folded) {
                return Err(ConnectionStringError::DuplicateSetting(name.to_string()));
            }
            entries.insert(folded, (name.to_string(), value.to_string()));
        }
        Ok(Self {
            entries,
        })
    }

    /// Returns the value for a setting, matching the name case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(&name.to_ascii_lowercase()).map(|(_, value)| value.as_str())
    }

    /// Returns true when the setting is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Returns the setting names as originally spelled.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|(name, _)| name.as_str())
    }

    /// Returns the number of settings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no settings were parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings").field("names", &self.names().collect::<Vec<_>>()).finish()
    }
}

// ============================================================================
// SECTION: Descriptor
// ============================================================================

/// Validated account endpoint and credential.
///
/// # Invariants
/// - `endpoint` is an absolute URI.
/// - `auth_key` is not blank.
/// - Fields are private and never reassigned after construction.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    /// Account endpoint.
    endpoint: Url,
    /// Account credential.
    auth_key: String,
}

impl ConnectionDescriptor {
    /// Builds a descriptor from already-separated parts.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionStringError::EmptyValue`] when the key is blank.
    pub fn new(endpoint: Url, auth_key: impl Into<String>) -> Result<Self, ConnectionStringError> {
        let auth_key = auth_key.into();
        if auth_key.trim().is_empty() {
            return Err(ConnectionStringError::EmptyValue(ACCOUNT_KEY_KEY));
        }
        Ok(Self {
            endpoint,
            auth_key,
        })
    }

    /// Parses a connection string into a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionStringError`] when tokenization or validation fails.
    pub fn parse(connection_string: &str) -> Result<Self, ConnectionStringError> {
        parse_descriptor(connection_string)
    }

    /// Parses a connection string, reporting failure as `None`.
    #[must_use]
    pub fn try_parse(connection_string: &str) -> Option<Self> {
        parse_descriptor(connection_string).ok()
    }

    /// Builds a descriptor from tokenized settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionStringError`] when a required setting is missing,
    /// blank, or the endpoint is not an absolute URI.
    pub fn from_settings(settings: &ConnectionSettings) -> Result<Self, ConnectionStringError> {
        for required in REQUIRED_SETTINGS {
            if !settings.contains(required) {
                return Err(ConnectionStringError::MissingSetting(required));
            }
        }
        let endpoint = settings.get(ACCOUNT_ENDPOINT_KEY).unwrap_or_default().trim();
        if endpoint.is_empty() {
            return Err(ConnectionStringError::EmptyValue(ACCOUNT_ENDPOINT_KEY));
        }
        let endpoint = Url::parse(endpoint)
            .map_err(|err| ConnectionStringError::InvalidEndpoint(err.to_string()))?;
        Self::new(endpoint, settings.get(ACCOUNT_KEY_KEY).unwrap_or_default())
    }

    /// Returns the account endpoint in its parsed, normalized form.
    ///
    /// The value is the URL-standard serialization of the configured text:
    /// scheme and host are lowercased, a default port such as `:443` for
    /// `https` is dropped, and an empty path becomes `/`. Endpoints already in
    /// that form round-trip exactly.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Returns the account credential.
    #[must_use]
    pub fn auth_key(&self) -> &str {
        &self.auth_key
    }
}

impl FromStr for ConnectionDescriptor {
    type Err = ConnectionStringError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        parse_descriptor(value)
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("endpoint", &self.endpoint.as_str())
            .field("auth_key", &REDACTED)
            .finish()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Shared tokenize-then-validate path for both parse entry points.
fn parse_descriptor(connection_string: &str) -> Result<ConnectionDescriptor, ConnectionStringError> {
    let settings = ConnectionSettings::parse(connection_string)?;
    ConnectionDescriptor::from_settings(&settings)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
