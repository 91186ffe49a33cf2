//! HTTP handlers for the paste API

use crate::app_state::AppState;
use crate::error::PasteError;
use crate::service::models::{CreatePaste, EditPaste};
use crate::service::user_metadata::UserMetadata;
use actix_web::http::header;
use actix_web::{error, web, HttpRequest, HttpResponse};
use log::{debug, info, warn};
use serde_json::json;
use uuid::Uuid;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Register every paste route. The legacy route goes first so `legacy` is
/// never parsed as a paste id.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_handler))
        .route("/pastes", web::post().to(create_paste_handler))
        .route("/pastes/legacy/{name}", web::get().to(get_legacy_paste_handler))
        .route("/pastes/{id}/raw", web::get().to(get_raw_paste_handler))
        .route("/pastes/{id}", web::get().to(get_paste_handler))
        .route("/pastes/{id}", web::put().to(edit_paste_handler))
        .route("/pastes/{id}", web::delete().to(delete_paste_handler));
}

/// JSON extractor settings: body size limit and malformed bodies as 400 JSON errors.
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err, _req| {
            debug!("Rejected request body: {}", err);
            error::InternalError::from_response(
                err.to_string(),
                HttpResponse::BadRequest().json(json!({ "error": format!("invalid request body: {}", err) })),
            )
            .into()
        })
}

fn parse_paste_id(raw: &str) -> Result<Uuid, PasteError> {
    // a malformed id can never name a paste
    Uuid::parse_str(raw).map_err(|_| PasteError::NotFound)
}

/// Credential from the `Authorization` header, with an optional `Bearer ` prefix.
fn credential(req: &HttpRequest) -> String {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim())
        .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).trim())
        .unwrap_or_default()
        .to_string()
}

fn user_metadata(req: &HttpRequest) -> UserMetadata {
    let forwarded_for = req
        .headers()
        .get(X_FORWARDED_FOR)
        .and_then(|value| value.to_str().ok());
    let connection = req.connection_info();
    let ip = UserMetadata::client_ip(forwarded_for, connection.peer_addr());
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    UserMetadata::new(ip, user_agent)
}

/// POST /pastes
pub async fn create_paste_handler(
    body: web::Json<CreatePaste>,
    req: HttpRequest,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, PasteError> {
    let user = user_metadata(&req);
    debug!("Create paste request from {:?}", user.ip);
    let created = app_state.paste_service.create(body.into_inner(), user).await?;
    log_mdc::insert("paste_id", created.paste.id.to_string());
    info!("Paste created");
    Ok(HttpResponse::Ok().json(created))
}

/// GET /pastes/{id}
pub async fn get_paste_handler(
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, PasteError> {
    let id = parse_paste_id(&path.into_inner())?;
    log_mdc::insert("paste_id", id.to_string());
    match app_state.paste_service.get(id).await? {
        Some(view) => Ok(HttpResponse::Ok().json(view)),
        None => Err(PasteError::NotFound),
    }
}

/// GET /pastes/{id}/raw
pub async fn get_raw_paste_handler(
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, PasteError> {
    let id = parse_paste_id(&path.into_inner())?;
    log_mdc::insert("paste_id", id.to_string());
    match app_state.paste_service.get_raw(id).await? {
        Some(content) => Ok(HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .body(content)),
        None => Err(PasteError::NotFound),
    }
}

/// GET /pastes/legacy/{name}
pub async fn get_legacy_paste_handler(
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, PasteError> {
    let name = path.into_inner();
    match app_state.paste_service.get_legacy(&name).await? {
        Some(content) => Ok(HttpResponse::Ok().json(json!({ "content": content }))),
        None => Err(PasteError::NotFound),
    }
}

/// PUT /pastes/{id}, authorised by the edit token
pub async fn edit_paste_handler(
    path: web::Path<String>,
    body: web::Json<EditPaste>,
    req: HttpRequest,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, PasteError> {
    let id = parse_paste_id(&path.into_inner())?;
    log_mdc::insert("paste_id", id.to_string());
    let view = app_state
        .paste_service
        .edit(id, body.into_inner(), &credential(&req))
        .await?;
    Ok(HttpResponse::Ok().json(view))
}

/// DELETE /pastes/{id}, authorised by the delete token
pub async fn delete_paste_handler(
    path: web::Path<String>,
    req: HttpRequest,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, PasteError> {
    let id = parse_paste_id(&path.into_inner())?;
    log_mdc::insert("paste_id", id.to_string());
    app_state.paste_service.delete(id, &credential(&req)).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Paste deleted successfully" })))
}

/// GET /health
pub async fn health_handler(app_state: web::Data<AppState>) -> HttpResponse {
    let database = match app_state.repository.ping().await {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            warn!("Health check database ping failed: {}", e);
            format!("error: {}", e)
        }
    };
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "dependencies": { "database": database },
        "active_pastes": app_state.active_pastes.get(),
    }))
}
