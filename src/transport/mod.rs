mod http_transport;
mod upstream;

pub use http_transport::build_reqwest_client;
pub use upstream::{build_turn_form, UpstreamClient};
