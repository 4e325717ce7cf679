//! Chef server request signing.
//!
//! Implements authentication protocol version 1.1 with SHA-1 digests. The
//! canonical request is
//!
//! ```text
//! Method:<METHOD>
//! Hashed Path:<base64(sha1(path))>
//! X-Ops-Content-Hash:<base64(sha1(body))>
//! X-Ops-Timestamp:<YYYY-MM-DDTHH:MM:SSZ>
//! X-Ops-UserId:<base64(sha1(client name))>
//! ```
//!
//! signed with the client's RSA key (PKCS#1 v1.5, no digest prefix) and sent
//! base64-encoded across `X-Ops-Authorization-N` headers of 60 characters.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha1::{Digest, Sha1};

use crate::error::{ChefError, ChefResult};

/// `X-Ops-Sign` value for the protocol implemented here.
pub const SIGN_DESCRIPTION: &str = "algorithm=sha1;version=1.1;";

const AUTHORIZATION_LINE: usize = 60;

/// A Chef API client name paired with its private key.
#[derive(Clone)]
pub struct RequestSigner {
    user_id: String,
    key: RsaPrivateKey,
}

impl RequestSigner {
    /// Build a signer from a PEM key. PKCS#1 (`BEGIN RSA PRIVATE KEY`, as
    /// written by the Chef server) and PKCS#8 are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`ChefError::Config`] if the PEM holds no RSA private key.
    pub fn from_pem(user_id: impl Into<String>, pem: &str) -> ChefResult<Self> {
        let user_id = user_id.into();
        let key = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| ChefError::Config(format!("invalid private key for {user_id}: {e}")))?;
        Ok(Self { user_id, key })
    }

    /// Read a PEM key from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ChefError::Config`] if the file cannot be read or parsed.
    pub fn from_file(user_id: impl Into<String>, path: &Path) -> ChefResult<Self> {
        let pem = std::fs::read_to_string(path).map_err(|e| {
            ChefError::Config(format!("cannot read client key {}: {e}", path.display()))
        })?;
        Self::from_pem(user_id, &pem)
    }

    /// The client name requests are signed as.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Authentication headers for one request.
    ///
    /// `path` is the URL path as sent, without the query string.
    ///
    /// # Errors
    ///
    /// Returns [`ChefError::Signing`] if the key is too small for the
    /// canonical request.
    pub fn sign(
        &self,
        method: &str,
        path: &str,
        body: &[u8],
        timestamp: DateTime<Utc>,
    ) -> ChefResult<Vec<(String, String)>> {
        let timestamp = timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let content_hash = digest(body);
        let canonical = canonical_request(method, path, &content_hash, &timestamp, &self.user_id);

        let signature = self
            .key
            .sign(Pkcs1v15Sign::new_unprefixed(), canonical.as_bytes())
            .map_err(|e| ChefError::Signing(e.to_string()))?;
        let encoded = STANDARD.encode(signature);

        let mut headers = vec![
            ("X-Ops-Sign".to_owned(), SIGN_DESCRIPTION.to_owned()),
            ("X-Ops-UserId".to_owned(), self.user_id.clone()),
            ("X-Ops-Timestamp".to_owned(), timestamp),
            ("X-Ops-Content-Hash".to_owned(), content_hash),
        ];
        for (index, line) in encoded.as_bytes().chunks(AUTHORIZATION_LINE).enumerate() {
            headers.push((
                format!("X-Ops-Authorization-{}", index.saturating_add(1)),
                String::from_utf8_lossy(line).into_owned(),
            ));
        }
        Ok(headers)
    }
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

/// The string that gets signed.
pub(crate) fn canonical_request(
    method: &str,
    path: &str,
    content_hash: &str,
    timestamp: &str,
    user_id: &str,
) -> String {
    format!(
        "Method:{}\nHashed Path:{}\nX-Ops-Content-Hash:{content_hash}\nX-Ops-Timestamp:{timestamp}\nX-Ops-UserId:{}",
        method.to_ascii_uppercase(),
        digest(canonical_path(path).as_bytes()),
        digest(user_id.as_bytes()),
    )
}

/// Collapse repeated slashes and drop a trailing one.
fn canonical_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

fn digest(bytes: &[u8]) -> String {
    STANDARD.encode(Sha1::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rsa::RsaPublicKey;

    const KEY: &str = include_str!("../testdata/client.pem");

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 5, 2, 10, 20, 30).unwrap()
    }

    fn header<'a>(headers: &'a [(String, String)], name: &str) -> &'a str {
        headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .unwrap()
    }

    #[test]
    fn test_canonical_request() {
        let canonical = canonical_request(
            "delete",
            "/organizations/ops/nodes/web01",
            &digest(b""),
            "2016-05-02T10:20:30Z",
            "pivotal",
        );
        assert_eq!(
            canonical,
            "Method:DELETE\n\
             Hashed Path:zfVXQYhA8wH2FfEQ8eafBthXJsU=\n\
             X-Ops-Content-Hash:2jmj7l5rSw0yVb/vlWAYkK/YBwk=\n\
             X-Ops-Timestamp:2016-05-02T10:20:30Z\n\
             X-Ops-UserId:Z/UotqDP939p0wU191MFA7lYXCA="
        );
    }

    #[test]
    fn test_canonical_path() {
        assert_eq!(canonical_path("/organizations//ops/nodes/"), "/organizations/ops/nodes");
        assert_eq!(canonical_path("/"), "/");
        assert_eq!(canonical_path("/nodes/web01"), "/nodes/web01");
    }

    #[test]
    fn test_sign_header_block() {
        let signer = RequestSigner::from_pem("pivotal", KEY).unwrap();
        let headers = signer
            .sign("DELETE", "/organizations/ops/nodes/web01", b"", at())
            .unwrap();

        let names: Vec<&str> = headers.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "X-Ops-Sign",
                "X-Ops-UserId",
                "X-Ops-Timestamp",
                "X-Ops-Content-Hash",
                "X-Ops-Authorization-1",
                "X-Ops-Authorization-2",
                "X-Ops-Authorization-3",
                "X-Ops-Authorization-4",
                "X-Ops-Authorization-5",
                "X-Ops-Authorization-6",
            ]
        );
        assert_eq!(header(&headers, "X-Ops-Sign"), "algorithm=sha1;version=1.1;");
        assert_eq!(header(&headers, "X-Ops-UserId"), "pivotal");
        assert_eq!(header(&headers, "X-Ops-Timestamp"), "2016-05-02T10:20:30Z");
        assert_eq!(
            header(&headers, "X-Ops-Content-Hash"),
            "2jmj7l5rSw0yVb/vlWAYkK/YBwk="
        );
        assert_eq!(
            header(&headers, "X-Ops-Authorization-1"),
            "AfxIdyv2bQdsBZzBMfaf7FtXNoFGxE78wqk5kRPMx3pU2kQO9UAzaCEH0i9/"
        );
        assert_eq!(
            header(&headers, "X-Ops-Authorization-6"),
            "jcqUbsznmvvBq3iUX/1bxaE/gnGEP2mrCHX1ZCAelA=="
        );
    }

    #[test]
    fn test_signature_verifies_against_canonical_request() {
        let signer = RequestSigner::from_pem("chefdeck", KEY).unwrap();
        let body = br#"{"name":["name"]}"#;
        let headers = signer.sign("POST", "/search/node", body, at()).unwrap();

        assert_eq!(
            header(&headers, "X-Ops-Content-Hash"),
            "JL//osRfg/rX53PGPVFw0qp2UvY="
        );
        let encoded: String = headers
            .iter()
            .filter(|(n, _)| n.starts_with("X-Ops-Authorization-"))
            .map(|(_, v)| v.as_str())
            .collect();
        let signature = STANDARD.decode(encoded).unwrap();
        let canonical = canonical_request(
            "POST",
            "/search/node",
            &digest(body),
            "2016-05-02T10:20:30Z",
            "chefdeck",
        );

        let public = RsaPublicKey::from(&signer.key);
        public
            .verify(Pkcs1v15Sign::new_unprefixed(), canonical.as_bytes(), &signature)
            .unwrap();
    }

    #[test]
    fn test_from_pem_rejects_garbage() {
        assert!(matches!(
            RequestSigner::from_pem("chefdeck", "not a key"),
            Err(ChefError::Config(_))
        ));
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = RequestSigner::from_file("chefdeck", &dir.path().join("absent.pem")).unwrap_err();
        assert!(err.to_string().contains("absent.pem"));
    }

    #[test]
    fn test_debug_hides_key() {
        let signer = RequestSigner::from_pem("chefdeck", KEY).unwrap();
        let debug = format!("{signer:?}");
        assert!(debug.contains("chefdeck"));
        assert!(!debug.contains("PRIVATE"));
    }
}
