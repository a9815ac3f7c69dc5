use actix_web::{HttpResponse, get, web};
use serde_json::json;
use uppe_service::monitoring::{PushIngress, PushRequest};

use crate::error::ApiError;

/// Push endpoint for push monitors, `status`, `msg` and `ping` come from the query
#[get("/api/push/{token}")]
pub async fn push_route(
    ingress: web::Data<PushIngress>,
    token: web::Path<String>,
    request: web::Query<PushRequest>,
) -> Result<HttpResponse, ApiError> {
    ingress.submit(&token, request.into_inner())?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}
