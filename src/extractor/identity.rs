//! Client identities tried, in order, by the Stream Extractor's strategy
//! chain (SPEC_FULL.md §4.2).

use serde_json::{json, Value};

/// One entry in the resolve strategy chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientIdentity {
    Mobile,
    Desktop,
    Headset,
    /// Requires signature/n-param deobfuscation via the embedded JS
    /// interpreter; gated behind the `web-strategy` feature.
    Web,
}

impl ClientIdentity {
    pub fn name(self) -> &'static str {
        match self {
            ClientIdentity::Mobile => "ANDROID",
            ClientIdentity::Desktop => "WEB",
            ClientIdentity::Headset => "IOS",
            ClientIdentity::Web => "WEB_REMIX",
        }
    }

    pub fn requires_deobfuscation(self) -> bool {
        matches!(self, ClientIdentity::Web)
    }

    fn client_version(self) -> &'static str {
        match self {
            ClientIdentity::Mobile => "19.09.37",
            ClientIdentity::Desktop => "2.20240101.00.00",
            ClientIdentity::Headset => "19.09.3",
            ClientIdentity::Web => "1.20240101.01.00",
        }
    }

    /// The ordered default chain: direct identities first, web identity
    /// last (only it needs deobfuscation).
    pub fn default_chain(include_web: bool) -> Vec<ClientIdentity> {
        let mut chain = vec![
            ClientIdentity::Mobile,
            ClientIdentity::Desktop,
            ClientIdentity::Headset,
        ];
        if include_web {
            chain.push(ClientIdentity::Web);
        }
        chain
    }

    /// Build the POST body for the `/player` endpoint for this identity.
    pub fn player_request_body(self, video_id: &str, signature_timestamp: Option<u32>) -> Value {
        let mut playback_context = json!({
            "contentPlaybackContext": {
                "html5Preference": "HTML5_PREF_WANTS",
            }
        });
        if let Some(ts) = signature_timestamp {
            playback_context["contentPlaybackContext"]["signatureTimestamp"] = json!(ts);
        }

        json!({
            "videoId": video_id,
            "context": {
                "client": {
                    "clientName": self.name(),
                    "clientVersion": self.client_version(),
                }
            },
            "contentCheckOk": true,
            "racyCheckOk": true,
            "playbackContext": playback_context,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chain_excludes_web_unless_requested() {
        let chain = ClientIdentity::default_chain(false);
        assert!(!chain.contains(&ClientIdentity::Web));
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn default_chain_includes_web_last() {
        let chain = ClientIdentity::default_chain(true);
        assert_eq!(chain.last(), Some(&ClientIdentity::Web));
    }

    #[test]
    fn only_web_identity_requires_deobfuscation() {
        for identity in ClientIdentity::default_chain(true) {
            assert_eq!(
                identity.requires_deobfuscation(),
                identity == ClientIdentity::Web
            );
        }
    }

    #[test]
    fn request_body_carries_video_id() {
        let body = ClientIdentity::Mobile.player_request_body("abc123", None);
        assert_eq!(body["videoId"], "abc123");
        assert_eq!(body["context"]["client"]["clientName"], "ANDROID");
    }
}
