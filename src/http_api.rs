use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::{to_bytes, Body},
    extract::{Path, Query, State},
    http::{Method, Request, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Extension, Json, Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use time::OffsetDateTime;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::clinic::{
    BankSettings, Clinic, ClinicError, PaymentQr, PaymentRequest, Session, SessionFilter,
    TransactionFilter, TreatmentProgress,
};
use crate::config::AppConfig;
use crate::mapping::Record;

const MAX_BODY_BYTES: usize = 1_048_576;

fn now_iso_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/* ================== Context ================== */

#[derive(Clone)]
pub struct ApiCtx {
    pub api_key: String,
    pub hmac_secret: String,
    pub clinic: Clinic,
}

#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl From<String> for ApiError {
    fn from(e: String) -> Self {
        ApiError { error: e }
    }
}

#[derive(Serialize)]
struct OkMsg {
    ok: bool,
}

fn fail(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ApiError::from(msg.into()))).into_response()
}

fn created<T>(body: T) -> (StatusCode, Json<T>) {
    (StatusCode::CREATED, Json(body))
}

fn clinic_err(e: ClinicError) -> Response {
    let status = match &e {
        ClinicError::NotFound(_) => StatusCode::NOT_FOUND,
        ClinicError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ClinicError::Forbidden(_) => StatusCode::FORBIDDEN,
        ClinicError::Internal(_) | ClinicError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(target: "http", "-> {status}: {e}");
    }
    fail(status, e.to_string())
}

/* ================== Utilities ================== */

/// Request bodies are loose JSON objects; every value lands in a sheet cell
/// as text.
fn record_from(body: Map<String, Value>) -> Record {
    body.into_iter()
        .filter_map(|(k, v)| {
            let text = match v {
                Value::Null => return None,
                Value::String(s) => s,
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                other => other.to_string(),
            };
            Some((k, text))
        })
        .collect()
}

/* ================== Middleware ================== */

async fn auth_mw(
    State(ctx): State<Arc<ApiCtx>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    tracing::info!(target: "http", "HTTP {} {}", req.method(), req.uri().path());

    if req.method() == Method::OPTIONS {
        return Ok(next.run(req).await);
    }

    let api_key = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if api_key != ctx.api_key {
        tracing::warn!(target: "http", "-> Unauthorized (bad API key)");
        return Err(fail(StatusCode::UNAUTHORIZED, "Unauthorized (API key)"));
    }

    let sig_opt = req
        .headers()
        .get("x-signature")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    if let Some(sig) = sig_opt {
        let owned: Body = std::mem::take(req.body_mut());
        let bytes = to_bytes(owned, MAX_BODY_BYTES)
            .await
            .map_err(|_| StatusCode::BAD_REQUEST.into_response())?;

        let mut mac = Hmac::<Sha256>::new_from_slice(ctx.hmac_secret.as_bytes())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())?;
        mac.update(&bytes);
        let expected = hex::encode(mac.finalize().into_bytes());

        if !expected.eq_ignore_ascii_case(&sig) {
            tracing::warn!(target: "http", "-> Invalid signature ({:.8}…)", sig);
            return Err(fail(StatusCode::UNAUTHORIZED, "Invalid signature"));
        }

        let (parts, _) = req.into_parts();
        req = Request::from_parts(parts, Body::from(bytes));
    }

    Ok(next.run(req).await)
}

/// Resolves `x-staff-email` to the acting staff member.
async fn session_mw(
    State(ctx): State<Arc<ApiCtx>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    if req.method() == Method::OPTIONS {
        return Ok(next.run(req).await);
    }

    let email = req
        .headers()
        .get("x-staff-email")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let session = ctx
        .clinic
        .resolve_session(&email)
        .await
        .map_err(clinic_err)?
        .ok_or_else(|| fail(StatusCode::UNAUTHORIZED, "Unauthorized"))?;

    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

/* ================== Routes: public ================== */

async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "ok": true,
        "service": "clinic-backoffice",
        "ts": now_iso_rfc3339()
    }))
}

async fn me(Extension(session): Extension<Session>) -> Json<Session> {
    Json(session)
}

/* ================== Customers ================== */

async fn customers_list(State(ctx): State<Arc<ApiCtx>>) -> Result<Json<Vec<Record>>, Response> {
    ctx.clinic.list_customers().await.map(Json).map_err(clinic_err)
}

async fn customer_get(
    State(ctx): State<Arc<ApiCtx>>,
    Path(id): Path<String>,
) -> Result<Json<Record>, Response> {
    ctx.clinic.get_customer(&id).await.map(Json).map_err(clinic_err)
}

async fn customer_add(
    State(ctx): State<Arc<ApiCtx>>,
    Json(body): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<Record>), Response> {
    ctx.clinic
        .create_customer(record_from(body))
        .await
        .map(created)
        .map_err(clinic_err)
}

async fn customer_update(
    State(ctx): State<Arc<ApiCtx>>,
    Path(id): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Record>, Response> {
    ctx.clinic
        .update_customer(&id, record_from(body))
        .await
        .map(Json)
        .map_err(clinic_err)
}

async fn customer_delete(
    State(ctx): State<Arc<ApiCtx>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<Json<OkMsg>, Response> {
    ctx.clinic
        .delete_customer(&session, &id)
        .await
        .map_err(clinic_err)?;
    Ok(Json(OkMsg { ok: true }))
}

/* ================== Products & services ================== */

async fn products_list(State(ctx): State<Arc<ApiCtx>>) -> Result<Json<Vec<Record>>, Response> {
    ctx.clinic.list_products().await.map(Json).map_err(clinic_err)
}

async fn product_add(
    State(ctx): State<Arc<ApiCtx>>,
    Extension(session): Extension<Session>,
    Json(body): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<Record>), Response> {
    ctx.clinic
        .create_product(&session, record_from(body))
        .await
        .map(created)
        .map_err(clinic_err)
}

async fn product_update(
    State(ctx): State<Arc<ApiCtx>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Record>, Response> {
    ctx.clinic
        .update_product(&session, &id, record_from(body))
        .await
        .map(Json)
        .map_err(clinic_err)
}

async fn product_delete(
    State(ctx): State<Arc<ApiCtx>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<Json<OkMsg>, Response> {
    ctx.clinic
        .delete_product(&session, &id)
        .await
        .map_err(clinic_err)?;
    Ok(Json(OkMsg { ok: true }))
}

async fn services_list(State(ctx): State<Arc<ApiCtx>>) -> Result<Json<Vec<Record>>, Response> {
    ctx.clinic.list_services().await.map(Json).map_err(clinic_err)
}

async fn service_add(
    State(ctx): State<Arc<ApiCtx>>,
    Extension(session): Extension<Session>,
    Json(body): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<Record>), Response> {
    ctx.clinic
        .create_service(&session, record_from(body))
        .await
        .map(created)
        .map_err(clinic_err)
}

async fn service_update(
    State(ctx): State<Arc<ApiCtx>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Record>, Response> {
    ctx.clinic
        .update_service(&session, &id, record_from(body))
        .await
        .map(Json)
        .map_err(clinic_err)
}

async fn service_delete(
    State(ctx): State<Arc<ApiCtx>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<Json<OkMsg>, Response> {
    ctx.clinic
        .delete_service(&session, &id)
        .await
        .map_err(clinic_err)?;
    Ok(Json(OkMsg { ok: true }))
}

/* ================== Orders ================== */

async fn orders_list(State(ctx): State<Arc<ApiCtx>>) -> Result<Json<Vec<Record>>, Response> {
    ctx.clinic.list_orders().await.map(Json).map_err(clinic_err)
}

async fn order_add(
    State(ctx): State<Arc<ApiCtx>>,
    Extension(session): Extension<Session>,
    Json(body): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<Record>), Response> {
    ctx.clinic
        .create_order(&session, record_from(body))
        .await
        .map(created)
        .map_err(clinic_err)
}

async fn order_update(
    State(ctx): State<Arc<ApiCtx>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Record>, Response> {
    ctx.clinic
        .update_order(&session, &id, record_from(body))
        .await
        .map(Json)
        .map_err(clinic_err)
}

/* ================== Treatment plans & sessions ================== */

async fn plans_list(State(ctx): State<Arc<ApiCtx>>) -> Result<Json<Vec<Record>>, Response> {
    ctx.clinic
        .list_treatment_plans()
        .await
        .map(Json)
        .map_err(clinic_err)
}

async fn plan_add(
    State(ctx): State<Arc<ApiCtx>>,
    Extension(session): Extension<Session>,
    Json(body): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<Record>), Response> {
    ctx.clinic
        .create_treatment_plan(&session, record_from(body))
        .await
        .map(created)
        .map_err(clinic_err)
}

async fn plan_update(
    State(ctx): State<Arc<ApiCtx>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Record>, Response> {
    ctx.clinic
        .update_treatment_plan(&session, &id, record_from(body))
        .await
        .map(Json)
        .map_err(clinic_err)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionCreated {
    #[serde(flatten)]
    session: Record,
    #[serde(skip_serializing_if = "Option::is_none")]
    treatment_progress: Option<TreatmentProgress>,
}

async fn sessions_list(
    State(ctx): State<Arc<ApiCtx>>,
    Query(q): Query<SessionFilter>,
) -> Result<Json<Vec<Record>>, Response> {
    ctx.clinic.list_sessions(&q).await.map(Json).map_err(clinic_err)
}

async fn session_get(
    State(ctx): State<Arc<ApiCtx>>,
    Path(id): Path<String>,
) -> Result<Json<Record>, Response> {
    ctx.clinic.get_session(&id).await.map(Json).map_err(clinic_err)
}

async fn session_add(
    State(ctx): State<Arc<ApiCtx>>,
    Extension(session): Extension<Session>,
    Json(body): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<SessionCreated>), Response> {
    let (row, progress) = ctx
        .clinic
        .create_session(&session, record_from(body))
        .await
        .map_err(clinic_err)?;
    Ok(created(SessionCreated {
        session: row,
        treatment_progress: progress,
    }))
}

async fn session_update(
    State(ctx): State<Arc<ApiCtx>>,
    Path(id): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Record>, Response> {
    ctx.clinic
        .update_session(&id, record_from(body))
        .await
        .map(Json)
        .map_err(clinic_err)
}

async fn session_cancel(
    State(ctx): State<Arc<ApiCtx>>,
    Path(id): Path<String>,
) -> Result<Json<OkMsg>, Response> {
    ctx.clinic.cancel_session(&id).await.map_err(clinic_err)?;
    Ok(Json(OkMsg { ok: true }))
}

/* ================== Staff ================== */

async fn staff_list(
    State(ctx): State<Arc<ApiCtx>>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<Record>>, Response> {
    ctx.clinic
        .list_staff(&session)
        .await
        .map(Json)
        .map_err(clinic_err)
}

async fn staff_add(
    State(ctx): State<Arc<ApiCtx>>,
    Extension(session): Extension<Session>,
    Json(body): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<Record>), Response> {
    ctx.clinic
        .create_staff(&session, record_from(body))
        .await
        .map(created)
        .map_err(clinic_err)
}

async fn staff_update(
    State(ctx): State<Arc<ApiCtx>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Record>, Response> {
    ctx.clinic
        .update_staff(&session, &id, record_from(body))
        .await
        .map(Json)
        .map_err(clinic_err)
}

async fn staff_delete(
    State(ctx): State<Arc<ApiCtx>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<Json<OkMsg>, Response> {
    ctx.clinic
        .delete_staff(&session, &id)
        .await
        .map_err(clinic_err)?;
    Ok(Json(OkMsg { ok: true }))
}

/* ================== Transactions ================== */

async fn transactions_list(
    State(ctx): State<Arc<ApiCtx>>,
    Query(q): Query<TransactionFilter>,
) -> Result<Json<Vec<Record>>, Response> {
    ctx.clinic
        .list_transactions(&q)
        .await
        .map(Json)
        .map_err(clinic_err)
}

async fn transaction_add(
    State(ctx): State<Arc<ApiCtx>>,
    Extension(session): Extension<Session>,
    Json(body): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<Record>), Response> {
    ctx.clinic
        .create_transaction(&session, record_from(body))
        .await
        .map(created)
        .map_err(clinic_err)
}

/* ================== Bank & payment QR ================== */

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BankSettingsReq {
    #[serde(default)]
    ten_ngan_hang: String,
    #[serde(default)]
    so_tai_khoan: String,
}

async fn bank_settings_get(State(ctx): State<Arc<ApiCtx>>) -> Json<BankSettings> {
    Json(ctx.clinic.bank_settings().await)
}

async fn bank_settings_update(
    State(ctx): State<Arc<ApiCtx>>,
    Extension(session): Extension<Session>,
    Json(req): Json<BankSettingsReq>,
) -> Result<Json<BankSettings>, Response> {
    ctx.clinic
        .update_bank_settings(&session, &req.ten_ngan_hang, &req.so_tai_khoan)
        .await
        .map(Json)
        .map_err(clinic_err)
}

async fn payment_qr(
    State(ctx): State<Arc<ApiCtx>>,
    Json(req): Json<PaymentRequest>,
) -> Result<Json<PaymentQr>, Response> {
    ctx.clinic.payment_qr(&req).await.map(Json).map_err(clinic_err)
}

/* ================== Runner ================== */

pub fn router(ctx: Arc<ApiCtx>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = Router::new().route("/api/health", get(health));

    let protected = Router::new()
        .route("/api/me", get(me))
        // customers
        .route("/api/customers", get(customers_list).post(customer_add))
        .route(
            "/api/customers/:id",
            get(customer_get).put(customer_update).delete(customer_delete),
        )
        // catalog
        .route("/api/products", get(products_list).post(product_add))
        .route("/api/products/:id", put(product_update).delete(product_delete))
        .route("/api/services", get(services_list).post(service_add))
        .route("/api/services/:id", put(service_update).delete(service_delete))
        // orders
        .route("/api/orders", get(orders_list).post(order_add))
        .route("/api/orders/:id", put(order_update))
        // treatments
        .route("/api/treatment-plans", get(plans_list).post(plan_add))
        .route("/api/treatment-plans/:id", put(plan_update))
        .route("/api/sessions", get(sessions_list).post(session_add))
        .route(
            "/api/sessions/:id",
            get(session_get).put(session_update).delete(session_cancel),
        )
        // staff
        .route("/api/staff", get(staff_list).post(staff_add))
        .route("/api/staff/:id", put(staff_update).delete(staff_delete))
        // ledger
        .route("/api/transactions", get(transactions_list).post(transaction_add))
        // payments
        .route(
            "/api/bank-settings",
            get(bank_settings_get).put(bank_settings_update),
        )
        .route("/api/payment-qr", post(payment_qr))
        .layer(from_fn_with_state(ctx.clone(), session_mw))
        .layer(from_fn_with_state(ctx.clone(), auth_mw));

    public
        .merge(protected)
        .with_state(ctx)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_http_server(cfg: &AppConfig, clinic: Clinic) -> anyhow::Result<()> {
    let ctx = Arc::new(ApiCtx {
        api_key: cfg.api_key.clone(),
        hmac_secret: cfg.hmac_secret.clone(),
        clinic,
    });

    let app = router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(target: "http", "[http] listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
