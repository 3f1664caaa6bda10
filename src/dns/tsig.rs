// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! TSIG credentials and update signing.
//!
//! SHA-2 keys are signed by hickory's [`TSigner`]. Older BIND deployments still
//! issue `hmac-md5` and `hmac-sha1` keys, which hickory's ring backend cannot
//! compute, so those go through [`LegacySigner`] built on the `hmac` crate.
//! Both produce the same RFC 8945 TSIG record and verify the signed reply.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hickory_proto::error::{ProtoError, ProtoErrorKind, ProtoResult};
use hickory_proto::op::{Message, MessageFinalizer, MessageVerifier};
use hickory_proto::rr::dnssec::rdata::tsig::{
    make_tsig_record, message_tbs, signed_bitmessage_to_buf, TsigAlgorithm, TSIG,
};
use hickory_proto::rr::dnssec::rdata::DNSSECRData;
use hickory_proto::rr::dnssec::tsig::TSigner;
use hickory_proto::rr::{Name, RData, Record};
use hickory_proto::xfer::DnsResponse;
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use std::str::FromStr;
use std::sync::Arc;

use crate::constants::{DEFAULT_TSIG_ALGORITHM, TSIG_FUDGE_TIME_SECS};
use crate::dns_errors::StartupError;

/// HMAC algorithms accepted for signing updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TsigAlgorithmName {
    HmacMd5,
    HmacSha1,
    HmacSha256,
    HmacSha384,
    HmacSha512,
}

impl TsigAlgorithmName {
    /// Every supported algorithm.
    pub const ALL: [Self; 5] = [
        Self::HmacMd5,
        Self::HmacSha1,
        Self::HmacSha256,
        Self::HmacSha384,
        Self::HmacSha512,
    ];

    /// Algorithm name as written in BIND key files.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HmacMd5 => "hmac-md5",
            Self::HmacSha1 => "hmac-sha1",
            Self::HmacSha256 => "hmac-sha256",
            Self::HmacSha384 => "hmac-sha384",
            Self::HmacSha512 => "hmac-sha512",
        }
    }

    /// Whether hickory's ring backend cannot compute this MAC.
    #[must_use]
    pub fn is_legacy(self) -> bool {
        matches!(self, Self::HmacMd5 | Self::HmacSha1)
    }

    fn to_hickory(self) -> TsigAlgorithm {
        match self {
            Self::HmacMd5 => TsigAlgorithm::HmacMd5,
            Self::HmacSha1 => TsigAlgorithm::HmacSha1,
            Self::HmacSha256 => TsigAlgorithm::HmacSha256,
            Self::HmacSha384 => TsigAlgorithm::HmacSha384,
            Self::HmacSha512 => TsigAlgorithm::HmacSha512,
        }
    }
}

impl FromStr for TsigAlgorithmName {
    type Err = StartupError;

    /// An empty string selects the default, `hmac-sha256`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = if s.is_empty() { DEFAULT_TSIG_ALGORITHM } else { s };
        Self::ALL
            .into_iter()
            .find(|algorithm| algorithm.as_str() == s)
            .ok_or_else(|| StartupError::UnsupportedAlgorithm {
                algorithm: s.to_string(),
            })
    }
}

impl std::fmt::Display for TsigAlgorithmName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared-secret key used to sign updates.
///
/// The algorithm is kept as written in configuration and parsed when a signer
/// is built, so an unsupported name surfaces before any packet is sent.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// TSIG key name (e.g., `ddns-key`)
    pub key_name: String,
    /// Base64-encoded shared secret
    pub secret: String,
    /// HMAC algorithm name
    pub algorithm: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("key_name", &self.key_name)
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

impl Credential {
    /// Parsed signing algorithm.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedAlgorithm` for anything outside the supported set.
    pub fn algorithm(&self) -> Result<TsigAlgorithmName, StartupError> {
        self.algorithm.parse()
    }

    /// Decoded shared secret.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the secret is empty or not valid base64.
    pub fn decoded_secret(&self) -> Result<Vec<u8>, StartupError> {
        let bytes = BASE64
            .decode(self.secret.trim())
            .map_err(|e| self.invalid_key(format!("failed to decode secret: {e}")))?;

        if bytes.is_empty() {
            return Err(self.invalid_key("secret is empty".to_string()));
        }
        Ok(bytes)
    }

    fn invalid_key(&self, reason: String) -> StartupError {
        StartupError::InvalidKey {
            key_name: self.key_name.clone(),
            reason,
        }
    }
}

/// Signs update requests and verifies the server's signed reply.
#[derive(Clone)]
pub enum UpdateSigner {
    /// SHA-2 family, computed by hickory
    Hickory(TSigner),
    /// MD5 and SHA-1, computed with the `hmac` crate
    Legacy(LegacySigner),
}

impl UpdateSigner {
    /// Algorithm carried in the TSIG record.
    #[must_use]
    pub fn algorithm(&self) -> &TsigAlgorithm {
        match self {
            Self::Hickory(signer) => signer.algorithm(),
            Self::Legacy(signer) => &signer.inner.algorithm,
        }
    }

    /// Key name carried in the TSIG record.
    #[must_use]
    pub fn key_name(&self) -> &Name {
        match self {
            Self::Hickory(signer) => signer.signer_name(),
            Self::Legacy(signer) => &signer.inner.key_name,
        }
    }

    /// Allowed clock skew in seconds.
    #[must_use]
    pub fn fudge(&self) -> u16 {
        match self {
            Self::Hickory(signer) => signer.fudge(),
            Self::Legacy(signer) => signer.inner.fudge,
        }
    }

    /// MAC of `data` with this key, as a server would compute it for a reply.
    #[cfg(test)]
    pub(crate) fn sign(&self, data: &[u8]) -> ProtoResult<Vec<u8>> {
        match self {
            Self::Hickory(signer) => signer.sign(data),
            Self::Legacy(signer) => signer.sign(data),
        }
    }
}

impl MessageFinalizer for UpdateSigner {
    fn finalize_message(
        &self,
        message: &Message,
        current_time: u32,
    ) -> ProtoResult<(Vec<Record>, Option<MessageVerifier>)> {
        match self {
            Self::Hickory(signer) => signer.finalize_message(message, current_time),
            Self::Legacy(signer) => signer.finalize_message(message, current_time),
        }
    }
}

/// HMAC-MD5 and HMAC-SHA1 TSIG signer.
#[derive(Clone)]
pub struct LegacySigner {
    inner: Arc<LegacyKey>,
}

struct LegacyKey {
    key: Vec<u8>,
    digest: TsigAlgorithmName,
    algorithm: TsigAlgorithm,
    key_name: Name,
    fudge: u16,
}

impl LegacySigner {
    /// Create a signer for `hmac-md5` or `hmac-sha1`.
    ///
    /// # Errors
    ///
    /// Returns `TsigUnsupportedMacAlgorithm` for any other algorithm.
    pub fn new(
        key: Vec<u8>,
        digest: TsigAlgorithmName,
        key_name: Name,
        fudge: u16,
    ) -> ProtoResult<Self> {
        if !digest.is_legacy() {
            return Err(ProtoErrorKind::TsigUnsupportedMacAlgorithm(digest.to_hickory()).into());
        }
        Ok(Self {
            inner: Arc::new(LegacyKey {
                key,
                digest,
                algorithm: digest.to_hickory(),
                key_name,
                fudge,
            }),
        })
    }

    fn sign(&self, data: &[u8]) -> ProtoResult<Vec<u8>> {
        let key = &self.inner.key;
        let tag = match self.inner.digest {
            TsigAlgorithmName::HmacMd5 => {
                let mut mac = Hmac::<Md5>::new_from_slice(key).map_err(hmac_error)?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            _ => {
                let mut mac = Hmac::<Sha1>::new_from_slice(key).map_err(hmac_error)?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
        };
        Ok(tag)
    }

    fn verify(&self, data: &[u8], tag: &[u8]) -> ProtoResult<()> {
        let key = &self.inner.key;
        let result = match self.inner.digest {
            TsigAlgorithmName::HmacMd5 => {
                let mut mac = Hmac::<Md5>::new_from_slice(key).map_err(hmac_error)?;
                mac.update(data);
                mac.verify_slice(tag)
            }
            _ => {
                let mut mac = Hmac::<Sha1>::new_from_slice(key).map_err(hmac_error)?;
                mac.update(data);
                mac.verify_slice(tag)
            }
        };
        result.map_err(|_| ProtoError::from("tsig validation error: invalid signature"))
    }

    /// Check the reply to a request signed with `request_mac` at `request_time`.
    fn verify_response(
        &self,
        request_mac: &[u8],
        request_time: u64,
        response: &[u8],
    ) -> ProtoResult<DnsResponse> {
        let (tbv, record) = signed_bitmessage_to_buf(Some(request_mac), response, true)?;
        let Some(RData::DNSSEC(DNSSECRData::TSIG(tsig))) = record.data() else {
            return Err(ProtoError::from("signature is not tsig"));
        };

        if record.name() != &self.inner.key_name || tsig.algorithm() != &self.inner.algorithm {
            return Err(ProtoErrorKind::TsigWrongKey.into());
        }

        self.verify(&tbv, tsig.mac())?;

        let fudge = u64::from(tsig.fudge());
        let window = tsig.time().saturating_sub(fudge)..tsig.time().saturating_add(fudge);
        if !window.contains(&request_time) {
            return Err(ProtoError::from("tsig validation error: outdated response"));
        }

        Ok(DnsResponse::new(Message::from_vec(response)?, response.to_vec()))
    }
}

impl MessageFinalizer for LegacySigner {
    fn finalize_message(
        &self,
        message: &Message,
        current_time: u32,
    ) -> ProtoResult<(Vec<Record>, Option<MessageVerifier>)> {
        let current_time = u64::from(current_time);
        let pre_tsig = TSIG::new(
            self.inner.algorithm.clone(),
            current_time,
            self.inner.fudge,
            Vec::new(),
            message.id(),
            0,
            Vec::new(),
        );
        let tbs = message_tbs(None, message, &pre_tsig, &self.inner.key_name)?;
        let request_mac = self.sign(&tbs)?;
        let record = make_tsig_record(
            self.inner.key_name.clone(),
            pre_tsig.set_mac(request_mac.clone()),
        );

        let signer = self.clone();
        let verifier = move |response: &[u8]| {
            signer.verify_response(&request_mac, current_time, response)
        };
        Ok((vec![record], Some(Box::new(verifier))))
    }
}

fn hmac_error(e: hmac::digest::InvalidLength) -> ProtoError {
    ProtoError::from(format!("invalid TSIG key: {e}"))
}

/// Create an update signer from a credential.
///
/// # Errors
///
/// Returns `UnsupportedAlgorithm` if the algorithm is not supported, or
/// `InvalidKey` if the key name or secret cannot be used.
pub fn create_tsig_signer(credential: &Credential) -> Result<UpdateSigner, StartupError> {
    let algorithm = credential.algorithm()?;
    let key_bytes = credential.decoded_secret()?;

    let key_name = Name::from_str(&credential.key_name)
        .map_err(|e| credential.invalid_key(format!("invalid key name: {e}")))?;
    let fudge = u16::try_from(TSIG_FUDGE_TIME_SECS).unwrap_or(u16::MAX);

    let signer = if algorithm.is_legacy() {
        LegacySigner::new(key_bytes, algorithm, key_name, fudge).map(UpdateSigner::Legacy)
    } else {
        TSigner::new(key_bytes, algorithm.to_hickory(), key_name, fudge).map(UpdateSigner::Hickory)
    };
    signer.map_err(|e| credential.invalid_key(format!("failed to create TSIG signer: {e}")))
}

#[cfg(test)]
#[path = "tsig_tests.rs"]
mod tsig_tests;
