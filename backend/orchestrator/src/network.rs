//! Open Payments network client — wallet lookup, grant negotiation, and
//! payment resource creation.
//!
//! [`PaymentNetwork`] is the capability seam the orchestrator drives;
//! the HTTP implementation speaks the plain JSON grant shapes and
//! authorizes resource calls with the grant's access token.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::{OrchestratorError, Result};
use crate::wallet::{normalize_identifier, WalletAddress};

// ─────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────

/// An amount in integer minor units of a specific asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetAmount {
    /// Count of minor units, carried as a string on the wire.
    pub value: String,
    pub asset_code: String,
    pub asset_scale: u8,
}

/// Tokens issued by a non-interactive grant.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct GrantTokens {
    pub access_token: String,
    pub manage_url: Option<String>,
}

/// An interactive outgoing-payment grant awaiting user consent.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct InteractiveGrant {
    /// Consent page the payer's browser must visit.
    pub redirect_url: String,
    /// Continuation endpoint for finishing the grant after consent.
    pub continue_uri: String,
    pub continue_token: String,
}

/// An incoming payment created on the receiving wallet.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingPayment {
    pub id: String,
}

/// A priced quote: what the sending wallet will actually be debited.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub struct Quote {
    pub id: String,
    pub receiver: String,
    pub debit_amount: AssetAmount,
}

/// Parameters for the interactive leg of an outgoing-payment grant.
#[derive(Debug, Clone)]
pub struct ConsentRequest {
    /// Where the auth server redirects the payer's browser after consent.
    pub finish_uri: String,
    /// Fresh per-attempt nonce echoed back in the finish redirect.
    pub nonce: String,
    /// Human-auditable note carried on the grant (the project id).
    pub description: String,
}

// ─────────────────────────────────────────────────────────
// Grant response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GrantResponse {
    access_token: AccessToken,
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    value: String,
    manage: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InteractiveGrantResponse {
    interact: InteractRedirect,
    #[serde(rename = "continue")]
    continuation: Continuation,
}

#[derive(Debug, Deserialize)]
struct InteractRedirect {
    redirect: String,
}

#[derive(Debug, Deserialize)]
struct Continuation {
    uri: String,
    access_token: AccessToken,
}

// ─────────────────────────────────────────────────────────
// Capability seam
// ─────────────────────────────────────────────────────────

/// Everything the orchestrator needs from the payment network.
///
/// The sequencing of these calls lives in the orchestrator; implementations
/// only know how to make one request each.
#[async_trait]
pub trait PaymentNetwork: Send + Sync {
    /// Resolve a wallet identifier to its public metadata. Resolved fresh
    /// every time; results are never cached.
    async fn resolve_wallet(&self, identifier: &str) -> Result<WalletAddress>;

    /// Grant scoped to managing incoming payments on the receiving wallet.
    async fn request_incoming_payment_grant(
        &self,
        receiving: &WalletAddress,
    ) -> Result<GrantTokens>;

    /// Create an incoming payment sized to `amount` on the receiving wallet.
    async fn create_incoming_payment(
        &self,
        receiving: &WalletAddress,
        grant: &GrantTokens,
        amount: &AssetAmount,
    ) -> Result<IncomingPayment>;

    /// Grant scoped to creating quotes on the sending wallet.
    async fn request_quote_grant(&self, sending: &WalletAddress) -> Result<GrantTokens>;

    /// Price the payment: what `sending` must be debited to satisfy the
    /// incoming payment at `receiver`.
    async fn create_quote(
        &self,
        sending: &WalletAddress,
        grant: &GrantTokens,
        receiver: &str,
    ) -> Result<Quote>;

    /// Interactive outgoing-payment grant, debit-bounded by `quote`.
    async fn request_outgoing_payment_grant(
        &self,
        sending: &WalletAddress,
        quote: &Quote,
        consent: &ConsentRequest,
    ) -> Result<InteractiveGrant>;
}

// ─────────────────────────────────────────────────────────
// HTTP implementation
// ─────────────────────────────────────────────────────────

/// [`PaymentNetwork`] over plain HTTPS.
#[derive(Debug, Clone)]
pub struct OpenPaymentsClient {
    http: Client,
}

impl OpenPaymentsClient {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// POST a JSON body and parse the JSON response. Grant requests go to
    /// the auth server unauthenticated; resource requests carry the grant's
    /// token as `Authorization: GNAP <token>`.
    async fn post_json<T>(&self, url: &str, access_token: Option<&str>, body: &Value) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut request = self.http.post(url).json(body);
        if let Some(token) = access_token {
            request = request.header(reqwest::header::AUTHORIZATION, format!("GNAP {token}"));
        }

        let response = request.send().await.map_err(|e| {
            OrchestratorError::GrantRequest(format!("POST {url} failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::GrantRequest(format!(
                "POST {url} returned {status}: {body}"
            )));
        }

        response.json::<T>().await.map_err(|e| {
            OrchestratorError::GrantRequest(format!("POST {url} returned unexpected body: {e}"))
        })
    }
}

#[async_trait]
impl PaymentNetwork for OpenPaymentsClient {
    async fn resolve_wallet(&self, identifier: &str) -> Result<WalletAddress> {
        let url = normalize_identifier(identifier)?;

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| OrchestratorError::Resolution(format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::Resolution(format!(
                "GET {url} returned {status}: {body}"
            )));
        }

        let wallet: WalletAddress = response.json().await.map_err(|e| {
            OrchestratorError::Resolution(format!("GET {url} returned unexpected body: {e}"))
        })?;

        debug!(
            "Resolved wallet {} (asset {} scale {})",
            wallet.id, wallet.asset_code, wallet.asset_scale
        );
        Ok(wallet)
    }

    async fn request_incoming_payment_grant(
        &self,
        receiving: &WalletAddress,
    ) -> Result<GrantTokens> {
        let body = incoming_grant_body(receiving);
        let grant: GrantResponse = self
            .post_json(&receiving.auth_server, None, &body)
            .await?;
        Ok(GrantTokens {
            access_token: grant.access_token.value,
            manage_url: grant.access_token.manage,
        })
    }

    async fn create_incoming_payment(
        &self,
        receiving: &WalletAddress,
        grant: &GrantTokens,
        amount: &AssetAmount,
    ) -> Result<IncomingPayment> {
        let url = format!(
            "{}/incoming-payments",
            receiving.resource_server.trim_end_matches('/')
        );
        let body = json!({
            "walletAddress": receiving.id,
            "incomingAmount": amount,
        });
        let payment: IncomingPayment = self
            .post_json(&url, Some(&grant.access_token), &body)
            .await?;
        debug!("Created incoming payment {}", payment.id);
        Ok(payment)
    }

    async fn request_quote_grant(&self, sending: &WalletAddress) -> Result<GrantTokens> {
        let body = quote_grant_body(sending);
        let grant: GrantResponse = self.post_json(&sending.auth_server, None, &body).await?;
        Ok(GrantTokens {
            access_token: grant.access_token.value,
            manage_url: grant.access_token.manage,
        })
    }

    async fn create_quote(
        &self,
        sending: &WalletAddress,
        grant: &GrantTokens,
        receiver: &str,
    ) -> Result<Quote> {
        let url = format!(
            "{}/quotes",
            sending.resource_server.trim_end_matches('/')
        );
        let body = json!({
            "walletAddress": sending.id,
            "receiver": receiver,
            "method": "ilp",
        });
        let quote: Quote = self
            .post_json(&url, Some(&grant.access_token), &body)
            .await?;
        debug!(
            "Created quote {} (debit {} {})",
            quote.id, quote.debit_amount.value, quote.debit_amount.asset_code
        );
        Ok(quote)
    }

    async fn request_outgoing_payment_grant(
        &self,
        sending: &WalletAddress,
        quote: &Quote,
        consent: &ConsentRequest,
    ) -> Result<InteractiveGrant> {
        let body = outgoing_grant_body(sending, quote, consent);
        let grant: InteractiveGrantResponse = self
            .post_json(&sending.auth_server, None, &body)
            .await?;
        Ok(InteractiveGrant {
            redirect_url: grant.interact.redirect,
            continue_uri: grant.continuation.uri,
            continue_token: grant.continuation.access_token.value,
        })
    }
}

// ─────────────────────────────────────────────────────────
// Grant request bodies
// ─────────────────────────────────────────────────────────

fn incoming_grant_body(receiving: &WalletAddress) -> Value {
    json!({
        "client": receiving.id,
        "access_token": {
            "access": [
                {
                    "type": "incoming-payment",
                    "actions": ["read", "complete", "create"],
                }
            ],
        },
    })
}

fn quote_grant_body(sending: &WalletAddress) -> Value {
    json!({
        "client": sending.id,
        "access_token": {
            "access": [
                {
                    "type": "quote",
                    "actions": ["create", "read"],
                }
            ],
        },
    })
}

/// Body of the interactive outgoing-payment grant request. The debit limit
/// is the quoted amount verbatim, never a value recomputed locally.
fn outgoing_grant_body(sending: &WalletAddress, quote: &Quote, consent: &ConsentRequest) -> Value {
    json!({
        "client": sending.id,
        "access_token": {
            "access": [
                {
                    "type": "outgoing-payment",
                    "actions": ["read", "create"],
                    "identifier": sending.id,
                    "limits": {
                        "debitAmount": quote.debit_amount,
                        "metadata": {
                            "description": consent.description,
                        },
                    },
                }
            ],
        },
        "interact": {
            "start": ["redirect"],
            "finish": {
                "method": "redirect",
                "uri": consent.finish_uri,
                "nonce": consent.nonce,
            },
        },
    })
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(id: &str) -> WalletAddress {
        WalletAddress {
            id: id.to_string(),
            auth_server: "https://auth.wallet.example".to_string(),
            resource_server: "https://wallet.example/op".to_string(),
            asset_code: "ZAR".to_string(),
            asset_scale: 2,
        }
    }

    #[test]
    fn incoming_grant_requests_manage_actions() {
        let body = incoming_grant_body(&wallet("https://wallet.example/fund"));
        let access = &body["access_token"]["access"][0];
        assert_eq!(access["type"], "incoming-payment");
        assert_eq!(access["actions"], json!(["read", "complete", "create"]));
        assert_eq!(body["client"], "https://wallet.example/fund");
    }

    #[test]
    fn quote_grant_requests_create_and_read() {
        let body = quote_grant_body(&wallet("https://wallet.example/alice"));
        let access = &body["access_token"]["access"][0];
        assert_eq!(access["type"], "quote");
        assert_eq!(access["actions"], json!(["create", "read"]));
    }

    #[test]
    fn outgoing_grant_is_limited_to_the_quoted_debit() {
        let quote = Quote {
            id: "https://wallet.example/op/quotes/q1".to_string(),
            receiver: "https://wallet.example/op/incoming-payments/i1".to_string(),
            debit_amount: AssetAmount {
                value: "2532".to_string(),
                asset_code: "ZAR".to_string(),
                asset_scale: 2,
            },
        };
        let consent = ConsentRequest {
            finish_uri: "http://localhost:8000/payments/callback?projectID=7&amount=25.00&timeStamp=1716213300000".to_string(),
            nonce: "nonce-1".to_string(),
            description: "7".to_string(),
        };

        let body = outgoing_grant_body(&wallet("https://wallet.example/alice"), &quote, &consent);
        let access = &body["access_token"]["access"][0];

        assert_eq!(access["type"], "outgoing-payment");
        assert_eq!(access["actions"], json!(["read", "create"]));
        assert_eq!(access["identifier"], "https://wallet.example/alice");
        assert_eq!(access["limits"]["debitAmount"]["value"], "2532");
        assert_eq!(access["limits"]["debitAmount"]["assetCode"], "ZAR");
        assert_eq!(access["limits"]["debitAmount"]["assetScale"], 2);
        assert_eq!(access["limits"]["metadata"]["description"], "7");

        assert_eq!(body["interact"]["start"], json!(["redirect"]));
        assert_eq!(body["interact"]["finish"]["method"], "redirect");
        assert_eq!(body["interact"]["finish"]["uri"], consent.finish_uri.as_str());
        assert_eq!(body["interact"]["finish"]["nonce"], "nonce-1");
    }

    #[test]
    fn grant_response_parses_token_and_manage_url() {
        let raw = r#"{
            "access_token": {
                "value": "tok_abc",
                "manage": "https://auth.wallet.example/token/t1",
                "expires_in": 600
            },
            "continue": { "uri": "https://auth.wallet.example/continue/c0" }
        }"#;
        // The continue stanza of non-interactive grants is irrelevant here
        // and must not break parsing.
        let grant: GrantResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(grant.access_token.value, "tok_abc");
        assert_eq!(
            grant.access_token.manage.as_deref(),
            Some("https://auth.wallet.example/token/t1")
        );
    }

    #[test]
    fn interactive_grant_response_parses_redirect_and_continuation() {
        let raw = r#"{
            "interact": {
                "redirect": "https://auth.wallet.example/interact/4CF492ML/xyz",
                "finish": "F5XJ2Z"
            },
            "continue": {
                "access_token": { "value": "tok_continue" },
                "uri": "https://auth.wallet.example/continue/4CF492ML",
                "wait": 30
            }
        }"#;
        let grant: InteractiveGrantResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            grant.interact.redirect,
            "https://auth.wallet.example/interact/4CF492ML/xyz"
        );
        assert_eq!(
            grant.continuation.uri,
            "https://auth.wallet.example/continue/4CF492ML"
        );
        assert_eq!(grant.continuation.access_token.value, "tok_continue");
    }

    #[test]
    fn quote_parses_from_wire_shape() {
        let raw = r#"{
            "id": "https://wallet.example/op/quotes/q1",
            "walletAddress": "https://wallet.example/alice",
            "receiver": "https://wallet.example/op/incoming-payments/i1",
            "debitAmount": { "value": "2532", "assetCode": "ZAR", "assetScale": 2 },
            "receiveAmount": { "value": "2500", "assetCode": "ZAR", "assetScale": 2 },
            "method": "ilp"
        }"#;
        let quote: Quote = serde_json::from_str(raw).unwrap();
        assert_eq!(quote.id, "https://wallet.example/op/quotes/q1");
        assert_eq!(
            quote.receiver,
            "https://wallet.example/op/incoming-payments/i1"
        );
        assert_eq!(quote.debit_amount.value, "2532");
        assert_eq!(quote.debit_amount.asset_scale, 2);
    }

    #[test]
    fn asset_amount_serializes_camel_case() {
        let amount = AssetAmount {
            value: "2500".to_string(),
            asset_code: "ZAR".to_string(),
            asset_scale: 2,
        };
        assert_eq!(
            serde_json::to_value(&amount).unwrap(),
            json!({ "value": "2500", "assetCode": "ZAR", "assetScale": 2 })
        );
    }
}
