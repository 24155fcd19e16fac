/// Uniform response envelope
///
/// Every JSON endpoint replies `{code: 0, data}` on success and
/// `{code: -1, message}` on failure (the failure half lives in the
/// `ApiError` IntoResponse impl).
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

/// Success envelope around a data payload
pub fn ok<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({ "code": 0, "data": data }))
}

/// Success envelope with no payload
pub fn ok_empty() -> Json<Value> {
    Json(json!({ "code": 0 }))
}

/// Paged success envelope
pub fn ok_page<T: Serialize>(items: T, total: i64, page: i64, page_size: i64) -> Json<Value> {
    Json(json!({
        "code": 0,
        "data": {
            "items": items,
            "total": total,
            "page": page,
            "pageSize": page_size,
        }
    }))
}
