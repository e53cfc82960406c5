//! HTTP adapters for the collaborator ports.

pub mod ai_engine;
pub mod datasphere;
pub mod otc;

use std::time::Duration;

use arbot_core::errors::IntegrationError;

pub use ai_engine::AiEngineClient;
pub use datasphere::DatasphereAnalytics;
pub use otc::{OtcDocuments, OtcInvoiceSearch};

pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(timeout).build()
}

pub(crate) fn request_error(service: &str, timeout: Duration, error: reqwest::Error) -> IntegrationError {
    if error.is_timeout() {
        IntegrationError::timeout(service, timeout)
    } else if let Some(status) = error.status() {
        IntegrationError::Status { service: service.to_owned(), status: status.as_u16() }
    } else {
        IntegrationError::transport(service, error.to_string())
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
