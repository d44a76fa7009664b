//! `Person` (author/committer identity) and the commit-level GPG `Signature`
//! verification status reported by a forge.

use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::errors::RecoveryError;

/// An author or committer identity: name, email, and an ISO-8601 date string
/// exactly as the forge returned it.
///
/// The forge sometimes hands back a date that is not a valid ISO offset (most
/// often a bare `Z` suffix that a strict parser rejects); [`Person::variants`]
/// is the C8 fallback that papers over that by guessing the timezone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub email: String,
    pub date: String,
}

impl Person {
    pub fn new(name: impl Into<String>, email: impl Into<String>, date: impl Into<String>) -> Self {
        Person {
            name: name.into(),
            email: email.into(),
            date: date.into(),
        }
    }

    /// `"<name> <email> <unix> <tzoffset>"` using the ISO date's own explicit offset.
    pub fn render_canonical(&self) -> Result<String, RecoveryError> {
        let dt = chrono::DateTime::parse_from_rfc3339(&self.date)
            .map_err(|e| RecoveryError::Repository(format!("unparseable date {}: {e}", self.date)))?;
        Ok(format!(
            "{} <{}> {} {}",
            self.name,
            self.email,
            dt.timestamp(),
            dt.format("%z")
        ))
    }

    /// All plausible renderings: the canonical one if the date carries an
    /// explicit numeric offset, otherwise the `±i hour` / `±HH00` guesses
    /// from §4.8.
    ///
    /// `chrono::DateTime::parse_from_rfc3339` treats a bare `Z` suffix as a
    /// valid explicit `+00:00` offset, so it must be special-cased here
    /// before falling through to [`Person::render_canonical`] — otherwise
    /// the offset-guessing fallback below is never reached.
    pub fn variants(&self) -> Vec<String> {
        if !Self::has_zulu_suffix(&self.date) {
            if let Ok(canonical) = self.render_canonical() {
                return vec![canonical];
            }
        }

        let Ok(naive) = NaiveDateTime::parse_from_str(&self.date, "%Y-%m-%dT%H:%M:%SZ") else {
            return Vec::new();
        };
        let timestamp = naive.and_utc().timestamp();

        let mut strings = Vec::with_capacity(23 * 4);
        for i in 1..24i64 {
            let offset = i * 3600;
            strings.push(format!(
                "{} <{}> {} +0000",
                self.name,
                self.email,
                timestamp - offset
            ));
            strings.push(format!(
                "{} <{}> {} +0000",
                self.name,
                self.email,
                timestamp + offset
            ));
            strings.push(format!(
                "{} <{}> {} -{:02}00",
                self.name,
                self.email,
                timestamp - offset,
                i
            ));
            strings.push(format!(
                "{} <{}> {} +{:02}00",
                self.name,
                self.email,
                timestamp + offset,
                i
            ));
        }
        strings
    }

    /// True when `date` ends in a literal `Z`/`z` zone designator rather
    /// than a numeric offset.
    fn has_zulu_suffix(date: &str) -> bool {
        date.trim_end().ends_with(['Z', 'z'])
    }
}

/// Commit-signature verification status, as reported by the forge.
///
/// Only [`SignatureStatus::Unsigned`] changes reconstruction behavior (no
/// `gpgsig` section); every other value is carried through so callers can
/// report it, but all of them select the "signed" reconstruction path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureStatus {
    Unsigned,
    Valid,
    NoUser,
    UnknownKey,
    BadCert,
    BadEmail,
    ExpiredKey,
    GpgverifyError,
    GpgverifyUnavailable,
    Invalid,
    MalformedSig,
    NotSigningKey,
    OcspError,
    OcspPending,
    OcspRevoked,
    UnknownSigType,
    UnverifiedEmail,
}

impl Display for SignatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SignatureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureStatus::Unsigned => "unsigned",
            SignatureStatus::Valid => "valid",
            SignatureStatus::NoUser => "no_user",
            SignatureStatus::UnknownKey => "unknown_key",
            SignatureStatus::BadCert => "bad_cert",
            SignatureStatus::BadEmail => "bad_email",
            SignatureStatus::ExpiredKey => "expired_key",
            SignatureStatus::GpgverifyError => "gpgverify_error",
            SignatureStatus::GpgverifyUnavailable => "gpgverify_unavailable",
            SignatureStatus::Invalid => "invalid",
            SignatureStatus::MalformedSig => "malformed_sig",
            SignatureStatus::NotSigningKey => "not_signing_key",
            SignatureStatus::OcspError => "ocsp_error",
            SignatureStatus::OcspPending => "ocsp_pending",
            SignatureStatus::OcspRevoked => "ocsp_revoked",
            SignatureStatus::UnknownSigType => "unknown_sig_type",
            SignatureStatus::UnverifiedEmail => "unverified_email",
        }
    }
}

impl FromStr for SignatureStatus {
    type Err = RecoveryError;

    /// Parses the forge's verification-status string. An unrecognized value
    /// is fatal by design (§4.5 point 4): silently dropping it would hide a
    /// forge schema change.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unsigned" => Ok(SignatureStatus::Unsigned),
            "valid" => Ok(SignatureStatus::Valid),
            "no_user" => Ok(SignatureStatus::NoUser),
            "unknown_key" => Ok(SignatureStatus::UnknownKey),
            "bad_cert" => Ok(SignatureStatus::BadCert),
            "bad_email" => Ok(SignatureStatus::BadEmail),
            "expired_key" => Ok(SignatureStatus::ExpiredKey),
            "gpgverify_error" => Ok(SignatureStatus::GpgverifyError),
            "gpgverify_unavailable" => Ok(SignatureStatus::GpgverifyUnavailable),
            "invalid" => Ok(SignatureStatus::Invalid),
            "malformed_sig" => Ok(SignatureStatus::MalformedSig),
            "not_signing_key" => Ok(SignatureStatus::NotSigningKey),
            "ocsp_error" => Ok(SignatureStatus::OcspError),
            "ocsp_pending" => Ok(SignatureStatus::OcspPending),
            "ocsp_revoked" => Ok(SignatureStatus::OcspRevoked),
            "unknown_sig_type" => Ok(SignatureStatus::UnknownSigType),
            "unverified_email" => Ok(SignatureStatus::UnverifiedEmail),
            other => Err(RecoveryError::UnknownSignatureStatus(other.to_string())),
        }
    }
}

/// A commit's GPG signature state: the verification status, plus (when
/// signed) the exact unsigned payload and signature block needed to
/// reconstruct the signed commit byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSignature {
    pub status: SignatureStatus,
    /// The forge-provided commit payload (tree/parent/author/committer/message,
    /// without the `gpgsig` block). Present when `status != Unsigned`.
    pub payload: Option<String>,
    /// The raw (unwrapped) `-----BEGIN PGP SIGNATURE-----` block. Present when
    /// `status != Unsigned`.
    pub signature_block: Option<String>,
}

impl CommitSignature {
    pub fn unsigned() -> Self {
        CommitSignature {
            status: SignatureStatus::Unsigned,
            payload: None,
            signature_block: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_uses_explicit_offset() {
        let p = Person::new("Ada", "ada@example.com", "2024-01-02T03:04:05+02:00");
        let rendered = p.render_canonical().unwrap();
        assert!(rendered.starts_with("Ada <ada@example.com> "));
        assert!(rendered.ends_with("+0200"));
    }

    #[test]
    fn variants_falls_back_on_z_suffix() {
        let p = Person::new("Ada", "ada@example.com", "2024-01-02T03:04:05Z");
        let variants = p.variants();
        assert_eq!(variants.len(), 23 * 4);
        assert!(variants.iter().all(|v| v.contains("Ada <ada@example.com>")));
    }

    #[test]
    fn unknown_signature_status_is_fatal() {
        assert!("totally_made_up".parse::<SignatureStatus>().is_err());
    }
}
