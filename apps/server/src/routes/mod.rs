use actix_web::web;

mod health;
mod push;

pub use health::health_route;
pub use push::push_route;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health_route).service(push_route);
}
