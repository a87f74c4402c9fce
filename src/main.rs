use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::{IntoParams, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use eps_core::{
    CoreError, HttpCrlFetcher, PrescriptionDocument, RevocationPolicy, SignatureVerifier,
    SigningAlgorithm, load_trust_config, prepare_signing_payload,
};

/// Health check response
#[derive(Serialize, Deserialize, ToSchema)]
struct HealthRes {
    ok: bool,
    message: String,
}

/// What an external signer needs to sign a prescription
#[derive(Serialize, Deserialize, ToSchema)]
struct SigningPayloadRes {
    /// Base64 of the canonical SignedInfo
    digest: String,
    /// Author time, RFC 3339
    timestamp: String,
    /// RS1 or RS256
    algorithm: String,
}

/// Outcome of a signature verification
#[derive(Serialize, Deserialize, ToSchema)]
struct VerifySignatureRes {
    valid: bool,
    errors: Vec<String>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
struct SigningPayloadQuery {
    /// RS1 (default) or RS256
    algorithm: Option<String>,
}

/// Application state shared across REST API handlers
///
/// Holds the verifier, which owns the trust configuration resolved at startup.
#[derive(Clone)]
struct AppState {
    verifier: SignatureVerifier,
}

#[derive(OpenApi)]
#[openapi(
    paths(health, signing_payload, verify_signature),
    components(schemas(HealthRes, SigningPayloadRes, VerifySignatureRes))
)]
struct ApiDoc;

type ApiError = (StatusCode, String);

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/signing-payload", post(signing_payload))
        .route("/verify-signature", post(verify_signature))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn env_flag(value: Option<String>) -> bool {
    value
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Main entry point for the EPS signature service
///
/// # Environment Variables
/// - `EPS_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `EPS_TRUSTED_CA_PEM`: PEM bundle of trusted issuer certificates (required)
/// - `EPS_CRL_TIMEOUT_SECS`: CRL download timeout (default: 10)
/// - `EPS_ALLOW_UNKNOWN_REVOCATION`: accept unknown revocation status (default: false)
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("eps=info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("EPS_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let trusted_pem = std::env::var("EPS_TRUSTED_CA_PEM")
        .map_err(|_| anyhow::anyhow!("EPS_TRUSTED_CA_PEM must point at a PEM bundle"))?;
    let crl_timeout_secs: u64 = std::env::var("EPS_CRL_TIMEOUT_SECS")
        .ok()
        .map(|v| v.parse())
        .transpose()?
        .unwrap_or(10);
    let allow_unknown = env_flag(std::env::var("EPS_ALLOW_UNKNOWN_REVOCATION").ok());

    let config = load_trust_config(std::path::Path::new(&trusted_pem))?
        .with_revocation_policy(RevocationPolicy {
            unknown_is_failure: !allow_unknown,
        })
        .with_crl_fetch_timeout(Duration::from_secs(crl_timeout_secs));
    let fetcher = HttpCrlFetcher::new(config.crl_fetch_timeout())?;
    let verifier = SignatureVerifier::new(&config, Arc::new(fetcher));

    tracing::info!(
        issuers = config.trusted_issuers().len(),
        allow_unknown,
        "++ Starting EPS REST on {}",
        rest_addr
    );

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app(AppState { verifier })).await?;

    Ok(())
}

fn bad_request(error: CoreError) -> ApiError {
    match error {
        CoreError::InvalidInput(_)
        | CoreError::MissingField(_)
        | CoreError::InvalidTimestamp(_)
        | CoreError::UnsupportedAlgorithm(_)
        | CoreError::UnsupportedAlgorithmPairing { .. }
        | CoreError::Xml(_) => (StatusCode::BAD_REQUEST, error.to_string()),
        other => {
            tracing::error!("Signing payload error: {:?}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into())
        }
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
async fn health() -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "EPS is alive".into(),
    })
}

#[utoipa::path(
    post,
    path = "/signing-payload",
    params(SigningPayloadQuery),
    request_body(content = String, content_type = "application/xml"),
    responses(
        (status = 200, description = "Signing payload", body = SigningPayloadRes),
        (status = 400, description = "Unreadable prescription or unsupported algorithm")
    )
)]
/// Build the payload an external signer signs for a prescription
///
/// # Parameters
/// * `algorithm` - Signing algorithm, RS1 when omitted
/// * body - ParentPrescription XML
async fn signing_payload(
    Query(query): Query<SigningPayloadQuery>,
    body: String,
) -> Result<Json<SigningPayloadRes>, ApiError> {
    let algorithm = match query.algorithm {
        Some(code) => code.parse::<SigningAlgorithm>().map_err(bad_request)?,
        None => SigningAlgorithm::default(),
    };
    let document = PrescriptionDocument::parse(&body).map_err(bad_request)?;
    let payload = prepare_signing_payload(&document, algorithm).map_err(bad_request)?;

    Ok(Json(SigningPayloadRes {
        digest: payload.digest,
        timestamp: payload.timestamp,
        algorithm: payload.algorithm.code().to_owned(),
    }))
}

#[utoipa::path(
    post,
    path = "/verify-signature",
    request_body(content = String, content_type = "application/xml"),
    responses(
        (status = 200, description = "Verification outcome", body = VerifySignatureRes),
        (status = 400, description = "Unparsable prescription XML")
    )
)]
/// Verify the signature embedded in a prescription
///
/// A rejected signature is still a 200 response; `errors` lists every failed check.
async fn verify_signature(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<VerifySignatureRes>, ApiError> {
    let document = PrescriptionDocument::parse(&body).map_err(bad_request)?;
    let report = state.verifier.verify(&document).await;

    Ok(Json(VerifySignatureRes {
        valid: report.is_valid(),
        errors: report.into_failures(),
    }))
}
