//! Grant negotiation sequencing — from a contributor's wallet identifier
//! and amount to the consent redirect URL.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::info;
use uuid::Uuid;

use crate::errors::{OrchestratorError, Result};
use crate::network::{AssetAmount, ConsentRequest, PaymentNetwork};
use crate::pending::{PendingAttempt, PendingStore};
use crate::wallet::WalletAddress;

/// Decimal supports at most 28 fractional digits, which caps the asset
/// scales this service can convert into minor units.
const MAX_ASSET_SCALE: u8 = 28;

/// Drives payment attempts against the network and stashes their context in
/// the pending store until consent finishes or the attempt expires.
pub struct PaymentOrchestrator {
    network: Arc<dyn PaymentNetwork>,
    pending: Arc<PendingStore>,
    /// Externally reachable base of this service; the consent finish
    /// redirect lands on `{public_base_url}/payments/callback`.
    public_base_url: String,
}

impl PaymentOrchestrator {
    pub fn new(
        network: Arc<dyn PaymentNetwork>,
        pending: Arc<PendingStore>,
        public_base_url: String,
    ) -> Self {
        Self {
            network,
            pending,
            public_base_url,
        }
    }

    /// Negotiate the full grant sequence for one contribution and return
    /// the consent page URL the payer's browser must visit.
    ///
    /// The steps are strictly ordered, each request needing a value from the
    /// previous response. The first failure aborts the attempt; grants
    /// already issued expire on the network's side, so nothing is rolled
    /// back here.
    pub async fn initiate_payment(
        &self,
        sender_identifier: &str,
        receiver_identifier: &str,
        amount: &str,
        project_id: i64,
    ) -> Result<String> {
        // Client input is checked before anything goes on the wire.
        let nominal = parse_amount(amount)?;

        let sending = self.network.resolve_wallet(sender_identifier).await?;
        let receiving = self.network.resolve_wallet(receiver_identifier).await?;

        let incoming_grant = self
            .network
            .request_incoming_payment_grant(&receiving)
            .await?;
        let incoming_amount = minor_units(nominal, &receiving)?;
        let incoming = self
            .network
            .create_incoming_payment(&receiving, &incoming_grant, &incoming_amount)
            .await?;

        let quote_grant = self.network.request_quote_grant(&sending).await?;
        let quote = self
            .network
            .create_quote(&sending, &quote_grant, &incoming.id)
            .await?;

        let nonce = Uuid::new_v4().to_string();
        let consent = ConsentRequest {
            finish_uri: self.finish_uri(project_id, nominal),
            nonce: nonce.clone(),
            description: project_id.to_string(),
        };
        let outgoing_grant = self
            .network
            .request_outgoing_payment_grant(&sending, &quote, &consent)
            .await?;

        let redirect_url = outgoing_grant.redirect_url.clone();
        info!(
            "Issued consent redirect for project {} (sender {}, debit {} {})",
            project_id, sending.id, quote.debit_amount.value, quote.debit_amount.asset_code
        );

        self.pending.insert(
            sending.id.clone(),
            PendingAttempt {
                project_id,
                nominal_amount: nominal,
                sending_wallet: sending,
                receiving_wallet: receiving,
                incoming_grant,
                quote_grant,
                quote,
                outgoing_grant,
                nonce,
            },
        );

        Ok(redirect_url)
    }

    /// Finish-callback URI carrying the context the auth server will not
    /// relay by itself; the server appends `hash` and `interact_ref` when it
    /// redirects the payer back.
    fn finish_uri(&self, project_id: i64, nominal: Decimal) -> String {
        format!(
            "{}/payments/callback?projectID={}&amount={}&timeStamp={}",
            self.public_base_url,
            project_id,
            nominal,
            Utc::now().timestamp_millis()
        )
    }
}

/// Parse a contributor-entered amount. Anything that is not a decimal
/// number, or not strictly positive, is rejected.
pub fn parse_amount(raw: &str) -> Result<Decimal> {
    let amount = raw
        .trim()
        .parse::<Decimal>()
        .map_err(|_| OrchestratorError::InvalidAmount(format!("not a decimal number: {raw}")))?;
    if amount <= Decimal::ZERO {
        return Err(OrchestratorError::InvalidAmount(format!(
            "must be positive: {raw}"
        )));
    }
    Ok(amount)
}

/// Convert a nominal amount into integer minor units of the receiving
/// wallet's asset: `amount * 10^asset_scale`, rounded half-up.
fn minor_units(amount: Decimal, wallet: &WalletAddress) -> Result<AssetAmount> {
    if wallet.asset_scale > MAX_ASSET_SCALE {
        return Err(OrchestratorError::InvalidAmount(format!(
            "asset scale {} of {} is not supported",
            wallet.asset_scale, wallet.asset_code
        )));
    }

    let factor = Decimal::from_i128_with_scale(10i128.pow(u32::from(wallet.asset_scale)), 0);
    let value = amount
        .checked_mul(factor)
        .map(|units| units.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|units| units.to_u64())
        .ok_or_else(|| {
            OrchestratorError::InvalidAmount(format!(
                "{amount} does not fit into {} minor units",
                wallet.asset_code
            ))
        })?;

    Ok(AssetAmount {
        value: value.to_string(),
        asset_code: wallet.asset_code.clone(),
        asset_scale: wallet.asset_scale,
    })
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
