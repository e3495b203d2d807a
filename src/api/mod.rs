pub mod relay_routes;
pub mod relay_websocket;

pub use relay_routes::routes;
pub use relay_websocket::JoinRequest;
