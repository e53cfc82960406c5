use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
    #[error("unknown category `{0}`")]
    UnknownCategory(String),
}

/// Failure talking to a collaborator service.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IntegrationError {
    #[error("{service} did not answer within {timeout_ms}ms")]
    Timeout { service: String, timeout_ms: u64 },
    #[error("{service} transport failure: {message}")]
    Transport { service: String, message: String },
    #[error("{service} returned an unreadable payload: {message}")]
    Decode { service: String, message: String },
    #[error("{service} responded with HTTP {status}")]
    Status { service: String, status: u16 },
}

impl IntegrationError {
    pub fn timeout(service: impl Into<String>, timeout: std::time::Duration) -> Self {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        Self::Timeout { service: service.into(), timeout_ms }
    }

    pub fn transport(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport { service: service.into(), message: message.into() }
    }

    pub fn decode(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode { service: service.into(), message: message.into() }
    }

    pub fn service(&self) -> &str {
        match self {
            Self::Timeout { service, .. }
            | Self::Transport { service, .. }
            | Self::Decode { service, .. }
            | Self::Status { service, .. } => service,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Integration(#[from] IntegrationError),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            ApplicationError::Integration(error) => {
                Self::ServiceUnavailable { message: error.to_string(), correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::errors::{ApplicationError, DomainError, IntegrationError, InterfaceError};

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::InvariantViolation(
            "intent lock without active intent".to_owned(),
        ))
        .into_interface("msg-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref correlation_id, .. } if correlation_id == "msg-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn integration_error_maps_to_service_unavailable() {
        let interface =
            ApplicationError::from(IntegrationError::timeout("ai-engine", Duration::from_secs(30)))
                .into_interface("msg-2");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.correlation_id(), "msg-2");
        assert!(interface.to_string().contains("30000ms"));
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface = ApplicationError::Configuration("missing ai_engine.base_url".to_owned())
            .into_interface("msg-3");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn integration_errors_name_their_service() {
        let error = IntegrationError::Status { service: "otc".to_owned(), status: 502 };
        assert_eq!(error.service(), "otc");
        assert_eq!(error.to_string(), "otc responded with HTTP 502");
        assert_eq!(IntegrationError::decode("analytics", "bad json").service(), "analytics");
    }
}
