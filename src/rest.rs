//! REST API layer using Axum.
//!
//! Public endpoints: login, health. Everything else sits behind the bearer
//! token middleware, and every gated handler re-resolves its principal from
//! storage before touching data (stale tokens never keep revoked access
//! alive). Report endpoints go through the access module for the project
//! check; user management additionally requires the admin role.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;
use uuid::Uuid;

use crate::access::{can_access, resolve_principal};
use crate::auth::{create_jwt, hash_password, validate_jwt, verify_password};
use crate::models::{
    Claims, Principal, Report, ReportStatus, Role, SectionKey, StatusView, User,
};
use crate::pipeline::Pipeline;
use crate::storage::{Storage, StorageError};

/// Shared app state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    storage: Arc<Storage>,
    pipeline: Pipeline,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn err(code: StatusCode, message: impl Into<String>) -> ApiError {
    (
        code,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

fn storage_err(e: StorageError) -> ApiError {
    match e {
        StorageError::EmailTaken(email) => {
            err(StatusCode::BAD_REQUEST, format!("email already registered: {email}"))
        }
        StorageError::NotFound => err(StatusCode::NOT_FOUND, "record not found"),
        other => {
            error!(error = %other, "storage failure");
            err(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

async fn auth_middleware(
    State(_state): State<Arc<AppState>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !auth_header.starts_with("Bearer ") {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let token = &auth_header[7..];
    let claims = validate_jwt(token).map_err(|_| StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Fresh principal for a request, from storage where possible. A token for
/// a since-deleted user resolves to nothing and is rejected.
fn request_principal(state: &AppState, claims: &Claims) -> Result<Principal, ApiError> {
    resolve_principal(&state.storage, claims)
        .ok_or_else(|| err(StatusCode::UNAUTHORIZED, "unknown principal"))
}

fn require_admin(principal: &Principal) -> Result<(), ApiError> {
    if principal.role != Role::Admin {
        return Err(err(StatusCode::FORBIDDEN, "admin role required"));
    }
    Ok(())
}

/// Build the application router.
pub fn create_router(storage: Arc<Storage>, pipeline: Pipeline) -> Router {
    let state = Arc::new(AppState { storage, pipeline });

    let gated_routes = Router::new()
        .route("/reports", post(create_report_handler).get(list_reports_handler))
        .route(
            "/reports/:report_id",
            get(get_report_handler)
                .put(update_report_handler)
                .delete(delete_report_handler),
        )
        .route("/reports/:report_id/status", get(report_status_handler))
        .route("/reports/:report_id/regenerate", post(regenerate_handler))
        .route("/users", post(create_user_handler).get(list_users_handler))
        .route(
            "/users/:user_id",
            axum::routing::put(update_user_handler).delete(delete_user_handler),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/login", post(login_handler))
        .route("/health", get(health_handler))
        .merge(gated_routes)
        .with_state(state)
}

// --- Auth ---

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .storage
        .get_user_by_email(&payload.email)
        .map_err(storage_err)?
        .ok_or_else(|| err(StatusCode::UNAUTHORIZED, "invalid credentials"))?;

    if !verify_password(&payload.password, &user.password_hash).unwrap_or(false) {
        return Err(err(StatusCode::UNAUTHORIZED, "invalid credentials"));
    }

    let token = create_jwt(&user)
        .map_err(|_| err(StatusCode::INTERNAL_SERVER_ERROR, "token issue failed"))?;
    Ok(Json(LoginResponse { token }))
}

async fn health_handler() -> Json<Value> {
    Json(serde_json::json!({"status": "ok"}))
}

// --- Reports ---

#[derive(Deserialize)]
pub struct CreateReportRequest {
    #[serde(default)]
    pub project: Option<String>,
    pub lead: Value,
    #[serde(default)]
    pub enabled_sections: Option<Vec<SectionKey>>,
}

#[derive(Serialize, Deserialize)]
pub struct ReportCreated {
    pub id: Uuid,
    pub status: ReportStatus,
}

/// Lightweight row for report listings; full content stays behind the
/// completed gate on the single-report endpoint.
#[derive(Serialize, Deserialize)]
pub struct ReportSummary {
    pub id: Uuid,
    pub project: String,
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Report> for ReportSummary {
    fn from(r: &Report) -> Self {
        ReportSummary {
            id: r.id,
            project: r.project.clone(),
            status: r.status,
            error: r.error.clone(),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

async fn create_report_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateReportRequest>,
) -> Result<Json<ReportCreated>, ApiError> {
    let principal = request_principal(&state, &claims)?;

    if !payload.lead.is_object() {
        return Err(err(StatusCode::BAD_REQUEST, "lead must be a JSON object"));
    }

    let project = match payload.project {
        Some(p) if !p.trim().is_empty() => p,
        _ => "Unassigned".to_string(),
    };
    if !can_access(&principal, &project) {
        return Err(err(StatusCode::FORBIDDEN, "project not accessible"));
    }

    let sections = payload
        .enabled_sections
        .unwrap_or_else(|| SectionKey::ALL.to_vec());

    let report = Report::new(project, payload.lead, sections);
    state.storage.create_report(&report).map_err(storage_err)?;
    state.pipeline.spawn_run(report.id);

    Ok(Json(ReportCreated {
        id: report.id,
        status: report.status,
    }))
}

async fn list_reports_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ReportSummary>>, ApiError> {
    let principal = request_principal(&state, &claims)?;
    let reports = state.storage.list_reports().map_err(storage_err)?;

    let visible = reports
        .iter()
        .filter(|r| can_access(&principal, &r.project))
        .map(ReportSummary::from)
        .collect();
    Ok(Json(visible))
}

/// Loads a report and applies the project access check. 404 before 403 is
/// deliberate for unknown ids; an inaccessible-but-existing report is 403.
fn load_accessible_report(
    state: &AppState,
    principal: &Principal,
    report_id: &Uuid,
) -> Result<Report, ApiError> {
    let report = state
        .storage
        .get_report(report_id)
        .map_err(storage_err)?
        .ok_or_else(|| err(StatusCode::NOT_FOUND, "report not found"))?;

    if !can_access(principal, &report.project) {
        return Err(err(StatusCode::FORBIDDEN, "project not accessible"));
    }
    Ok(report)
}

async fn report_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(report_id): Path<Uuid>,
) -> Result<Json<StatusView>, ApiError> {
    let principal = request_principal(&state, &claims)?;
    let report = load_accessible_report(&state, &principal, &report_id)?;
    Ok(Json(StatusView {
        status: report.status,
        error: report.error,
    }))
}

async fn get_report_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(report_id): Path<Uuid>,
) -> Result<Json<Report>, ApiError> {
    let principal = request_principal(&state, &claims)?;
    let report = load_accessible_report(&state, &principal, &report_id)?;

    // Full content is only served for completed runs; pollers read the
    // status endpoint until then.
    if report.status != ReportStatus::Completed {
        return Err(err(StatusCode::CONFLICT, "report not completed"));
    }
    Ok(Json(report))
}

#[derive(Deserialize)]
pub struct UpdateReportRequest {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub lead: Option<Value>,
    #[serde(default)]
    pub section_content: Option<BTreeMap<SectionKey, Value>>,
}

async fn update_report_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(report_id): Path<Uuid>,
    Json(payload): Json<UpdateReportRequest>,
) -> Result<Json<ReportSummary>, ApiError> {
    let principal = request_principal(&state, &claims)?;
    let mut report = load_accessible_report(&state, &principal, &report_id)?;

    if let Some(project) = payload.project {
        if project.trim().is_empty() {
            return Err(err(StatusCode::BAD_REQUEST, "project must not be empty"));
        }
        // Moving a report requires access to the destination too
        if !can_access(&principal, &project) {
            return Err(err(StatusCode::FORBIDDEN, "target project not accessible"));
        }
        report.project = project;
    }
    if let Some(lead) = payload.lead {
        if !lead.is_object() {
            return Err(err(StatusCode::BAD_REQUEST, "lead must be a JSON object"));
        }
        report.lead = lead;
    }
    if let Some(content) = payload.section_content {
        report.section_content = content;
    }

    let saved = state.storage.update_report(report).map_err(storage_err)?;
    Ok(Json(ReportSummary::from(&saved)))
}

async fn regenerate_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(report_id): Path<Uuid>,
) -> Result<Json<ReportCreated>, ApiError> {
    let principal = request_principal(&state, &claims)?;
    let mut report = load_accessible_report(&state, &principal, &report_id)?;

    // A run already in flight keeps its status; regeneration only restarts
    // finished runs.
    if !report.status.is_terminal() {
        return Err(err(StatusCode::CONFLICT, "generation already in progress"));
    }

    report.status = ReportStatus::Processing;
    report.error = None;
    report.enrichment = None;
    report.section_content.clear();
    let saved = state.storage.update_report(report).map_err(storage_err)?;
    state.pipeline.spawn_run(saved.id);

    Ok(Json(ReportCreated {
        id: saved.id,
        status: saved.status,
    }))
}

async fn delete_report_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(report_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let principal = request_principal(&state, &claims)?;
    let report = load_accessible_report(&state, &principal, &report_id)?;
    state.storage.delete_report(&report.id).map_err(storage_err)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- User management (admin only) ---

/// User row without the password hash.
#[derive(Serialize, Deserialize)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub assigned_projects: BTreeSet<String>,
}

impl From<&User> for UserView {
    fn from(u: &User) -> Self {
        UserView {
            id: u.id,
            email: u.email.clone(),
            role: u.role,
            assigned_projects: u.assigned_projects.clone(),
        }
    }
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub assigned_projects: BTreeSet<String>,
}

/// The management surface only issues admin and project_user accounts;
/// a project_user needs at least one non-empty project.
fn validate_managed_role(role: Role, projects: &BTreeSet<String>) -> Result<(), ApiError> {
    match role {
        Role::Admin => Ok(()),
        Role::ProjectUser => {
            if projects.is_empty() || projects.iter().any(|p| p.trim().is_empty()) {
                return Err(err(
                    StatusCode::BAD_REQUEST,
                    "project_user requires at least one non-empty project",
                ));
            }
            Ok(())
        }
        Role::Client => Err(err(
            StatusCode::BAD_REQUEST,
            "role must be admin or project_user",
        )),
    }
}

async fn create_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<UserView>, ApiError> {
    let principal = request_principal(&state, &claims)?;
    require_admin(&principal)?;

    if payload.email.trim().is_empty() || !payload.email.contains('@') {
        return Err(err(StatusCode::BAD_REQUEST, "invalid email"));
    }
    if payload.password.is_empty() {
        return Err(err(StatusCode::BAD_REQUEST, "password required"));
    }
    validate_managed_role(payload.role, &payload.assigned_projects)?;

    let user = User {
        id: Uuid::new_v4(),
        email: payload.email,
        password_hash: hash_password(&payload.password)
            .map_err(|_| err(StatusCode::INTERNAL_SERVER_ERROR, "hashing failed"))?,
        role: payload.role,
        assigned_projects: payload.assigned_projects,
    };
    state.storage.create_user(user.clone()).map_err(storage_err)?;
    Ok(Json(UserView::from(&user)))
}

async fn list_users_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<UserView>>, ApiError> {
    let principal = request_principal(&state, &claims)?;
    require_admin(&principal)?;

    let users = state.storage.list_users().map_err(storage_err)?;
    Ok(Json(users.iter().map(UserView::from).collect()))
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub assigned_projects: Option<BTreeSet<String>>,
}

async fn update_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserView>, ApiError> {
    let principal = request_principal(&state, &claims)?;
    require_admin(&principal)?;

    let mut user = state
        .storage
        .get_user(&user_id)
        .map_err(storage_err)?
        .ok_or_else(|| err(StatusCode::NOT_FOUND, "user not found"))?;

    if let Some(email) = payload.email {
        if email.trim().is_empty() || !email.contains('@') {
            return Err(err(StatusCode::BAD_REQUEST, "invalid email"));
        }
        user.email = email;
    }
    if let Some(password) = payload.password {
        if password.is_empty() {
            return Err(err(StatusCode::BAD_REQUEST, "password required"));
        }
        user.password_hash = hash_password(&password)
            .map_err(|_| err(StatusCode::INTERNAL_SERVER_ERROR, "hashing failed"))?;
    }
    if let Some(role) = payload.role {
        user.role = role;
    }
    if let Some(projects) = payload.assigned_projects {
        user.assigned_projects = projects;
    }
    validate_managed_role(user.role, &user.assigned_projects)?;

    state.storage.update_user(user.clone()).map_err(storage_err)?;
    Ok(Json(UserView::from(&user)))
}

async fn delete_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let principal = request_principal(&state, &claims)?;
    require_admin(&principal)?;

    // A principal may never delete itself
    if user_id == principal.user_id {
        return Err(err(StatusCode::BAD_REQUEST, "cannot delete own account"));
    }

    state.storage.delete_user(&user_id).map_err(storage_err)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::{SectionError, SectionGenerator};
    use crate::pipeline::{EnrichmentError, EnrichmentSource};
    use async_trait::async_trait;
    use axum::body::Body;
    use serde_json::json;
    use std::fs;
    use tower::ServiceExt; // for .oneshot() testing

    struct InstantGenerator;

    #[async_trait]
    impl SectionGenerator for InstantGenerator {
        async fn generate_section(
            &self,
            key: SectionKey,
            _lead: &Value,
            _enrichment: &Value,
        ) -> Result<Value, SectionError> {
            Ok(json!({"text": format!("{} content", key.as_str())}))
        }
    }

    struct InstantEnrichment;

    #[async_trait]
    impl EnrichmentSource for InstantEnrichment {
        async fn fetch(&self, _lead: &Value) -> Result<Value, EnrichmentError> {
            Ok(json!({"articles": []}))
        }
    }

    struct TestApp {
        router: Router,
        storage: Arc<Storage>,
        dir: std::path::PathBuf,
    }

    fn seed_user(storage: &Storage, email: &str, role: Role, projects: &[&str]) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: hash_password("pw").unwrap(),
            role,
            assigned_projects: projects.iter().map(|s| s.to_string()).collect(),
        };
        storage.create_user(user.clone()).unwrap();
        user
    }

    fn test_app(name: &str) -> TestApp {
        let dir = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir);
        let storage = Arc::new(Storage::open(dir.to_str().unwrap()).unwrap());
        let pipeline = Pipeline::new(
            storage.clone(),
            Arc::new(InstantGenerator),
            Arc::new(InstantEnrichment),
        );
        let router = create_router(storage.clone(), pipeline);
        TestApp {
            router,
            storage,
            dir,
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn login(app: &TestApp, email: &str) -> String {
        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/login")
                    .method("POST")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({"email": email, "password": "pw"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await["token"].as_str().unwrap().to_string()
    }

    fn get(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method("GET")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(uri: &str, token: &str, body: Value) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method("POST")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_open_reports_gated() {
        let app = test_app("leadgen_test_rest_gate");

        let response = app
            .router
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .router
            .clone()
            .oneshot(Request::builder().uri("/reports").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let _ = fs::remove_dir_all(app.dir);
    }

    #[tokio::test]
    async fn test_login_rejects_bad_password() {
        let app = test_app("leadgen_test_rest_login");
        seed_user(&app.storage, "admin@example.com", Role::Admin, &[]);

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/login")
                    .method("POST")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({"email": "admin@example.com", "password": "nope"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let _ = fs::remove_dir_all(app.dir);
    }

    #[tokio::test]
    async fn test_report_visibility_round_trip() {
        let app = test_app("leadgen_test_rest_visibility");
        seed_user(&app.storage, "admin@example.com", Role::Admin, &[]);
        seed_user(&app.storage, "acme@example.com", Role::ProjectUser, &["Acme"]);
        seed_user(&app.storage, "other@example.com", Role::ProjectUser, &["Other"]);

        let admin_token = login(&app, "admin@example.com").await;
        let acme_token = login(&app, "acme@example.com").await;
        let other_token = login(&app, "other@example.com").await;

        // Admin creates a report in Acme
        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/reports",
                &admin_token,
                json!({"project": "Acme", "lead": {"name": "Jane Doe"}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let created = body_json(response).await;
        let report_id = created["id"].as_str().unwrap().to_string();

        // Assigned user sees it in the list and may poll its status
        let response = app
            .router
            .clone()
            .oneshot(get("/reports", &acme_token))
            .await
            .unwrap();
        let listed = body_json(response).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let response = app
            .router
            .clone()
            .oneshot(get(&format!("/reports/{report_id}/status"), &acme_token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Unassigned user sees an empty list and 403 on direct access
        let response = app
            .router
            .clone()
            .oneshot(get("/reports", &other_token))
            .await
            .unwrap();
        let listed = body_json(response).await;
        assert!(listed.as_array().unwrap().is_empty());

        let response = app
            .router
            .clone()
            .oneshot(get(&format!("/reports/{report_id}/status"), &other_token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let _ = fs::remove_dir_all(app.dir);
    }

    #[tokio::test]
    async fn test_status_endpoint_id_handling() {
        let app = test_app("leadgen_test_rest_ids");
        seed_user(&app.storage, "admin@example.com", Role::Admin, &[]);
        let token = login(&app, "admin@example.com").await;

        // Malformed id
        let response = app
            .router
            .clone()
            .oneshot(get("/reports/not-a-uuid/status", &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Unknown id
        let response = app
            .router
            .clone()
            .oneshot(get(&format!("/reports/{}/status", Uuid::new_v4()), &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let _ = fs::remove_dir_all(app.dir);
    }

    #[tokio::test]
    async fn test_full_record_gated_until_completed() {
        let app = test_app("leadgen_test_rest_completed_gate");
        seed_user(&app.storage, "admin@example.com", Role::Admin, &[]);
        let token = login(&app, "admin@example.com").await;

        // Insert directly so no pipeline runs against this record
        let report = Report::new(
            "Acme".to_string(),
            json!({"name": "Jane"}),
            vec![SectionKey::Overview],
        );
        app.storage.create_report(&report).unwrap();

        let response = app
            .router
            .clone()
            .oneshot(get(&format!("/reports/{}", report.id), &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // Regenerate is also refused while the run is non-terminal
        let response = app
            .router
            .clone()
            .oneshot(post_json(
                &format!("/reports/{}/regenerate", report.id),
                &token,
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // Completed record is served in full
        let mut done = report.clone();
        done.status = ReportStatus::Completed;
        app.storage.update_report(done).unwrap();

        let response = app
            .router
            .clone()
            .oneshot(get(&format!("/reports/{}", report.id), &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let full = body_json(response).await;
        assert_eq!(full["project"], "Acme");

        let _ = fs::remove_dir_all(app.dir);
    }

    #[tokio::test]
    async fn test_user_management_is_admin_only() {
        let app = test_app("leadgen_test_rest_users");
        let admin = seed_user(&app.storage, "admin@example.com", Role::Admin, &[]);
        seed_user(&app.storage, "acme@example.com", Role::ProjectUser, &["Acme"]);

        let admin_token = login(&app, "admin@example.com").await;
        let user_token = login(&app, "acme@example.com").await;

        // Non-admin denied
        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/users",
                &user_token,
                json!({"email": "x@example.com", "password": "pw", "role": "project_user", "assigned_projects": ["Acme"]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // project_user without a project is invalid
        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/users",
                &admin_token,
                json!({"email": "x@example.com", "password": "pw", "role": "project_user"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Valid create, then delete
        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/users",
                &admin_token,
                json!({"email": "x@example.com", "password": "pw", "role": "project_user", "assigned_projects": ["Globex"]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let created = body_json(response).await;
        let new_id = created["id"].as_str().unwrap().to_string();

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/users/{new_id}"))
                    .method("DELETE")
                    .header("authorization", format!("Bearer {admin_token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        // Admin cannot delete itself
        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/users/{}", admin.id))
                    .method("DELETE")
                    .header("authorization", format!("Bearer {admin_token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let _ = fs::remove_dir_all(app.dir);
    }

    #[tokio::test]
    async fn test_stale_token_loses_access_after_reassignment() {
        let app = test_app("leadgen_test_rest_stale");
        let user = seed_user(&app.storage, "acme@example.com", Role::ProjectUser, &["Acme"]);
        seed_user(&app.storage, "admin@example.com", Role::Admin, &[]);
        let admin_token = login(&app, "admin@example.com").await;
        let user_token = login(&app, "acme@example.com").await;

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/reports",
                &admin_token,
                json!({"project": "Acme", "lead": {"name": "Jane"}}),
            ))
            .await
            .unwrap();
        let report_id = body_json(response).await["id"].as_str().unwrap().to_string();

        // Token was minted with Acme access...
        let response = app
            .router
            .clone()
            .oneshot(get(&format!("/reports/{report_id}/status"), &user_token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // ...but the stored record is authoritative after reassignment
        let mut updated = user.clone();
        updated.assigned_projects = ["Other".to_string()].into_iter().collect();
        app.storage.update_user(updated).unwrap();

        let response = app
            .router
            .clone()
            .oneshot(get(&format!("/reports/{report_id}/status"), &user_token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let _ = fs::remove_dir_all(app.dir);
    }

    #[tokio::test]
    async fn test_create_report_requires_project_access() {
        let app = test_app("leadgen_test_rest_create_access");
        seed_user(&app.storage, "acme@example.com", Role::ProjectUser, &["Acme"]);
        let token = login(&app, "acme@example.com").await;

        // Own project is fine
        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/reports",
                &token,
                json!({"project": "Acme", "lead": {"name": "Jane"}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Foreign project is forbidden; omitted project lands in
        // "Unassigned", which a project_user cannot touch either
        for body in [
            json!({"project": "Globex", "lead": {"name": "Jane"}}),
            json!({"lead": {"name": "Jane"}}),
        ] {
            let response = app
                .router
                .clone()
                .oneshot(post_json("/reports", &token, body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }

        // Non-object lead is rejected before any record exists
        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/reports",
                &token,
                json!({"project": "Acme", "lead": "just a string"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let _ = fs::remove_dir_all(app.dir);
    }
}
