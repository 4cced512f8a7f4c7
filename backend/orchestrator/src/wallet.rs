//! Wallet address metadata and identifier normalization.

use serde::{Deserialize, Serialize};

use crate::errors::{OrchestratorError, Result};

/// Public wallet metadata, served by the wallet's own address URL.
///
/// Resolved fresh on every payment attempt: the asset code and scale drive
/// the minor-unit conversion downstream, and stale values would size the
/// payment wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAddress {
    /// Canonical wallet URL; also used as the `client` value in grant requests.
    pub id: String,
    pub auth_server: String,
    pub resource_server: String,
    pub asset_code: String,
    pub asset_scale: u8,
}

/// Expand a user-entered payment identifier into the wallet's HTTPS URL.
///
/// The `$host/path` shorthand becomes `https://host/path`; full `https://`
/// URLs pass through unchanged. Anything else is rejected before a single
/// network call is made.
pub fn normalize_identifier(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let url = if let Some(rest) = trimmed.strip_prefix('$') {
        format!("https://{rest}")
    } else {
        trimmed.to_string()
    };

    let host_and_path = url.strip_prefix("https://").unwrap_or("");
    if host_and_path.is_empty() || host_and_path.contains(char::is_whitespace) {
        return Err(OrchestratorError::Resolution(format!(
            "Malformed wallet identifier: {raw}"
        )));
    }

    Ok(url.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_pointer_expands_to_https() {
        assert_eq!(
            normalize_identifier("$wallet.example/alice").unwrap(),
            "https://wallet.example/alice"
        );
    }

    #[test]
    fn https_url_passes_through() {
        assert_eq!(
            normalize_identifier("https://wallet.example/bob").unwrap(),
            "https://wallet.example/bob"
        );
    }

    #[test]
    fn surrounding_whitespace_and_trailing_slash_are_trimmed() {
        assert_eq!(
            normalize_identifier("  $wallet.example/alice/ ").unwrap(),
            "https://wallet.example/alice"
        );
    }

    #[test]
    fn plain_http_is_rejected() {
        let err = normalize_identifier("http://wallet.example/alice").unwrap_err();
        assert!(matches!(err, OrchestratorError::Resolution(_)));
    }

    #[test]
    fn garbage_identifiers_are_rejected() {
        for bad in ["", "$", "alice at example", "wallet.example/alice"] {
            assert!(
                matches!(
                    normalize_identifier(bad),
                    Err(OrchestratorError::Resolution(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn wallet_metadata_parses_from_wire_shape() {
        let body = r#"{
            "id": "https://wallet.example/alice",
            "publicName": "Alice",
            "assetCode": "USD",
            "assetScale": 2,
            "authServer": "https://auth.wallet.example",
            "resourceServer": "https://wallet.example/op"
        }"#;
        let wallet: WalletAddress = serde_json::from_str(body).unwrap();
        assert_eq!(wallet.id, "https://wallet.example/alice");
        assert_eq!(wallet.auth_server, "https://auth.wallet.example");
        assert_eq!(wallet.asset_code, "USD");
        assert_eq!(wallet.asset_scale, 2);
    }
}
