use rand::Rng;

const CPN_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Absolute URL of the currently deployed player script.
///
/// Cache key for the playback context and the cipher transforms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct PlayerScriptRef(pub String);

impl From<String> for PlayerScriptRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::ops::Deref for PlayerScriptRef {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for PlayerScriptRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Anonymous visitor identifier shared by every request of a resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SessionToken(pub String);

impl From<String> for SessionToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::ops::Deref for SessionToken {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-request client playback nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackNonce(pub String);

impl PlaybackNonce {
    /// Generates a random nonce of `len` characters from the url-safe alphabet.
    pub fn generate(len: usize) -> Self {
        let mut rng = rand::thread_rng();
        let s: String = (0..len)
            .map(|_| CPN_CHARS[rng.gen_range(0..CPN_CHARS.len())] as char)
            .collect();
        Self(s)
    }
}

impl std::fmt::Display for PlaybackNonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_alphabet_and_length() {
        let nonce = PlaybackNonce::generate(12);
        assert_eq!(nonce.0.len(), 12);
        assert!(nonce.0.bytes().all(|b| CPN_CHARS.contains(&b)));
    }
}
