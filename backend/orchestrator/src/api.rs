//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::db::{self, Contribution, NewContribution};
use crate::errors::{OrchestratorError, Result};
use crate::orchestrator::{parse_amount, PaymentOrchestrator};

#[derive(Clone)]
pub struct ApiState {
    pub pool: SqlitePool,
    pub orchestrator: Arc<PaymentOrchestrator>,
    /// The platform wallet all contributions are delivered to.
    pub receiving_wallet_address: String,
    /// Thank-you page the payer's browser lands on after a recorded (or
    /// replayed) completion.
    pub success_redirect_url: String,
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateRequest {
    /// Payment pointer (`$host/name`) or wallet URL of the contributor.
    pub sender_identifier: String,
    /// Decimal amount in the receiving asset's nominal unit, e.g. "25.00".
    pub amount: String,
    pub project_id: i64,
}

#[derive(Serialize)]
pub struct InitiateResponse {
    #[serde(rename = "redirectUrl")]
    pub redirect_url: String,
}

/// Query string of the consent finish redirect. The first three fields were
/// embedded in the finish URI at grant time; the auth server appends `hash`
/// and `interact_ref`. Everything is optional here so that absences are
/// reported by the taxonomy rather than the extractor.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(rename = "projectID")]
    pub project_id: Option<String>,
    pub amount: Option<String>,
    #[serde(rename = "timeStamp")]
    pub time_stamp: Option<String>,
    pub hash: Option<String>,
    pub interact_ref: Option<String>,
}

#[derive(Serialize)]
pub struct ContributionsResponse {
    pub project_id: i64,
    pub count: usize,
    pub contributions: Vec<Contribution>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// Optional funding goal; when present the response says whether it has
    /// been reached.
    pub goal: Option<String>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub project_id: i64,
    /// Exact decimal total, as a string.
    pub total: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_reached: Option<bool>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(e: &OrchestratorError) -> Response {
    let status = match e {
        OrchestratorError::InvalidAmount(_) | OrchestratorError::MissingParameters(_) => {
            StatusCode::BAD_REQUEST
        }
        OrchestratorError::DuplicateCompletion(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(serde_json::json!(ErrorResponse {
            error: e.to_string()
        })),
    )
        .into_response()
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /payments`
///
/// Runs the grant negotiation for one contribution and returns the consent
/// page URL. Contributors only say who pays, how much, and for which
/// project; the receiving wallet is always the configured platform wallet.
pub async fn initiate_payment(
    State(state): State<Arc<ApiState>>,
    body: std::result::Result<Json<InitiateRequest>, JsonRejection>,
) -> impl IntoResponse {
    // A body axum cannot parse still has to be answered in the `{ error }`
    // shape every other failure path uses.
    let Json(request) = match body {
        Ok(json) => json,
        Err(rejection) => {
            let e = bad_request_body(rejection);
            warn!("Rejected payment initiation body: {e}");
            return error_response(&e);
        }
    };

    match state
        .orchestrator
        .initiate_payment(
            &request.sender_identifier,
            &state.receiving_wallet_address,
            &request.amount,
            request.project_id,
        )
        .await
    {
        Ok(redirect_url) => (
            StatusCode::OK,
            Json(serde_json::json!(InitiateResponse { redirect_url })),
        )
            .into_response(),
        Err(e) => {
            warn!("Payment initiation failed: {e}");
            error_response(&e)
        }
    }
}

/// `GET /payments/callback`
///
/// The auth server redirects the payer's browser here once consent
/// finishes. A valid callback lands a ledger row; a replayed one is
/// swallowed so the payer still reaches the thank-you page.
pub async fn payment_callback(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    let new = match parse_callback(&params) {
        Ok(new) => new,
        Err(e) => {
            warn!("Rejected payment callback: {e}");
            return error_response(&e);
        }
    };

    match db::record_contribution(&state.pool, &new).await {
        Ok(contribution) => {
            info!(
                "Recorded contribution of {} to project {} (hash {})",
                contribution.amount, contribution.project_id, contribution.completion_hash
            );
            Redirect::to(&state.success_redirect_url).into_response()
        }
        Err(OrchestratorError::DuplicateCompletion(hash)) => {
            info!("Ignored replayed completion callback (hash {hash})");
            Redirect::to(&state.success_redirect_url).into_response()
        }
        Err(e) => {
            // The payment itself may have gone through on the network side;
            // keep this loud so the gap can be reconciled.
            error!("Failed to record contribution: {e}");
            error_response(&e)
        }
    }
}

/// `GET /projects/:id/contributions`
///
/// Returns all recorded contributions for the given project, newest first.
pub async fn get_project_contributions(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<i64>,
) -> impl IntoResponse {
    match db::list_contributions(&state.pool, project_id).await {
        Ok(contributions) => {
            let count = contributions.len();
            (
                StatusCode::OK,
                Json(serde_json::json!(ContributionsResponse {
                    project_id,
                    count,
                    contributions,
                })),
            )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// `GET /projects/:id/stats?goal=<amount>`
///
/// Returns the exact total raised for the project, and whether the goal has
/// been reached when one is supplied.
pub async fn get_project_stats(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<i64>,
    Query(query): Query<StatsQuery>,
) -> impl IntoResponse {
    let goal = match query.goal.as_deref().map(parse_amount).transpose() {
        Ok(goal) => goal,
        Err(e) => return error_response(&e),
    };

    match db::sum_contributions(&state.pool, project_id).await {
        Ok(total) => (
            StatusCode::OK,
            Json(serde_json::json!(StatsResponse {
                project_id,
                total: total.to_string(),
                goal: goal.map(|g| g.to_string()),
                goal_reached: goal.map(|g| db::goal_reached(total, g)),
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// Validate the finish-redirect query into a recordable contribution. All
/// five parameters must be present and non-blank before the ledger is
/// touched.
fn parse_callback(params: &CallbackParams) -> Result<NewContribution> {
    let project_id = require(&params.project_id, "projectID")?;
    let amount = require(&params.amount, "amount")?;
    let time_stamp = require(&params.time_stamp, "timeStamp")?;
    let hash = require(&params.hash, "hash")?;
    let interact_ref = require(&params.interact_ref, "interact_ref")?;

    let project_id: i64 = project_id.parse().map_err(|_| {
        OrchestratorError::MissingParameters(format!("projectID is not an integer: {project_id}"))
    })?;
    let amount: Decimal = parse_amount(&amount)?;

    Ok(NewContribution {
        project_id,
        amount,
        paid_at: time_stamp,
        completion_hash: hash,
        interact_ref,
    })
}

fn require(field: &Option<String>, name: &str) -> Result<String> {
    match field.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(OrchestratorError::MissingParameters(name.to_string())),
    }
}

/// Fold an unreadable initiation body into the parameter taxonomy, keeping
/// axum's own description of what was wrong with it.
fn bad_request_body(rejection: JsonRejection) -> OrchestratorError {
    OrchestratorError::MissingParameters(rejection.body_text())
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn full_params() -> CallbackParams {
        CallbackParams {
            project_id: Some("7".to_string()),
            amount: Some("25.00".to_string()),
            time_stamp: Some("1716213300000".to_string()),
            hash: Some("hash-a".to_string()),
            interact_ref: Some("1d2e3f".to_string()),
        }
    }

    #[test]
    fn complete_callback_parses_into_a_contribution() {
        let new = parse_callback(&full_params()).unwrap();
        assert_eq!(new.project_id, 7);
        assert_eq!(new.amount, dec!(25.00));
        assert_eq!(new.paid_at, "1716213300000");
        assert_eq!(new.completion_hash, "hash-a");
        assert_eq!(new.interact_ref, "1d2e3f");
    }

    #[test]
    fn each_missing_parameter_is_named_in_the_error() {
        let cases: [(&str, fn(&mut CallbackParams)); 5] = [
            ("projectID", |p| p.project_id = None),
            ("amount", |p| p.amount = None),
            ("timeStamp", |p| p.time_stamp = None),
            ("hash", |p| p.hash = None),
            ("interact_ref", |p| p.interact_ref = None),
        ];

        for (name, blank) in cases {
            let mut params = full_params();
            blank(&mut params);
            let err = parse_callback(&params).unwrap_err();
            assert!(
                matches!(err, OrchestratorError::MissingParameters(ref m) if m == name),
                "expected {name} to be reported, got {err}"
            );
        }
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut params = full_params();
        params.hash = Some("   ".to_string());
        assert!(matches!(
            parse_callback(&params),
            Err(OrchestratorError::MissingParameters(m)) if m == "hash"
        ));
    }

    #[test]
    fn non_integer_project_id_is_rejected() {
        let mut params = full_params();
        params.project_id = Some("seven".to_string());
        assert!(matches!(
            parse_callback(&params),
            Err(OrchestratorError::MissingParameters(_))
        ));
    }

    #[test]
    fn bad_amounts_are_rejected() {
        for bad in ["abc", "0", "-1"] {
            let mut params = full_params();
            params.amount = Some(bad.to_string());
            assert!(
                matches!(parse_callback(&params), Err(OrchestratorError::InvalidAmount(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn callback_params_use_the_wire_parameter_names() {
        let params: CallbackParams = serde_json::from_str(
            r#"{
                "projectID": "7",
                "amount": "25.00",
                "timeStamp": "1716213300000",
                "hash": "hash-a",
                "interact_ref": "1d2e3f"
            }"#,
        )
        .unwrap();
        assert_eq!(params.project_id.as_deref(), Some("7"));
        assert_eq!(params.time_stamp.as_deref(), Some("1716213300000"));
        assert_eq!(params.interact_ref.as_deref(), Some("1d2e3f"));
    }

    #[test]
    fn initiate_response_uses_the_redirect_url_key() {
        let body = serde_json::to_value(InitiateResponse {
            redirect_url: "https://auth.wallet.example/interact/xyz".to_string(),
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "redirectUrl": "https://auth.wallet.example/interact/xyz" })
        );
    }

    #[test]
    fn taxonomy_maps_to_http_statuses() {
        let bad = error_response(&OrchestratorError::InvalidAmount("x".to_string()));
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let missing = error_response(&OrchestratorError::MissingParameters("hash".to_string()));
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let duplicate = error_response(&OrchestratorError::DuplicateCompletion("h".to_string()));
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);

        let grant = error_response(&OrchestratorError::GrantRequest("down".to_string()));
        assert_eq!(grant.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn malformed_initiate_bodies_are_answered_in_the_error_shape() {
        use axum::body::Body;
        use axum::extract::FromRequest;
        use axum::http::{header, Request};

        // One body that is broken JSON, one that parses but lacks a field.
        for raw in [
            r#"{"amount": "25.00""#,
            r#"{"amount": "25.00", "projectId": 7}"#,
        ] {
            let request = Request::builder()
                .method("POST")
                .uri("/payments")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(raw))
                .unwrap();
            let rejection = Json::<InitiateRequest>::from_request(request, &())
                .await
                .unwrap_err();

            let response = error_response(&bad_request_body(rejection));
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let bytes = axum::body::to_bytes(response.into_body(), 1024)
                .await
                .unwrap();
            let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            let message = body["error"].as_str().unwrap();
            assert!(
                message.starts_with("Missing request parameter:"),
                "{raw:?} should be rejected through the taxonomy, got {message:?}"
            );
        }
    }
}
