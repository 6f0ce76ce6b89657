use actix_web::web::{get, scope};
use actix_web::{HttpResponse, Scope};

pub fn configure_routes() -> Scope {
    scope("/health").route("", get().to(process))
}

async fn process() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}
