mod http_transport;
pub mod upstream;

pub use http_transport::{upstream_error, HttpTransport, UpstreamReply};
pub use upstream::UpstreamEndpoints;
