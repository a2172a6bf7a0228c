//! Signed cookie values for the HTTP session.
//!
//! Cookie format: `base64url(session_id).base64url(hmac_sha256(secret, session_id))`.
//! Only the id is carried by the browser; everything else lives server-side.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies HTTP session ids with a server secret.
#[derive(Clone)]
pub struct CookieSigner {
    secret: Vec<u8>,
}

impl CookieSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC key length is always valid")
    }

    /// Produce the cookie value for `session_id`.
    pub fn sign(&self, session_id: &str) -> String {
        let mut mac = self.mac();
        mac.update(session_id.as_bytes());
        let tag = mac.finalize().into_bytes();

        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(session_id.as_bytes()),
            URL_SAFE_NO_PAD.encode(tag)
        )
    }

    /// Return the session id carried by `value` if its signature checks out.
    pub fn verify(&self, value: &str) -> Option<String> {
        let (id_part, tag_part) = value.split_once('.')?;
        let session_id = String::from_utf8(URL_SAFE_NO_PAD.decode(id_part).ok()?).ok()?;
        let tag = URL_SAFE_NO_PAD.decode(tag_part).ok()?;

        let mut mac = self.mac();
        mac.update(session_id.as_bytes());
        mac.verify_slice(&tag).ok()?;

        Some(session_id)
    }
}
