use thiserror::Error;

/// Failure raised by an external collaborator (team directory, worklog source,
/// project directory).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("{source_name} is unavailable: {message}")]
    Unavailable { source_name: &'static str, message: String },
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{source_name} rejected the request: {message}")]
    Rejected { source_name: &'static str, message: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Collaborator(#[from] SourceError),
    #[error("model gateway failure: {0}")]
    ModelGateway(String),
    #[error("could not parse input for tool `{tool}`: {message}")]
    Parse { tool: String, message: String },
    #[error("agent loop aborted after {rounds} rounds: {reason}")]
    ResourceExhaustion { rounds: u32, reason: String },
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
                "The assistant is temporarily unavailable. Please retry shortly."
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
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Validation(message) => {
                Self::BadRequest { message, correlation_id: unassigned() }
            }
            ApplicationError::Parse { tool, message } => Self::BadRequest {
                message: format!("{tool}: {message}"),
                correlation_id: unassigned(),
            },
            ApplicationError::Collaborator(source) => {
                Self::ServiceUnavailable { message: source.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::ModelGateway(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            error @ ApplicationError::ResourceExhaustion { .. } => {
                Self::Internal { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, InterfaceError, SourceError};

    #[test]
    fn validation_error_maps_to_bad_request_interface_error() {
        let interface =
            ApplicationError::Validation("query must not be empty".to_owned()).into_interface("c-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "c-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn collaborator_error_maps_to_service_unavailable() {
        let interface = ApplicationError::from(SourceError::Unavailable {
            source_name: "worklog source",
            message: "connection reset".to_owned(),
        })
        .into_interface("c-2");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert!(interface.to_string().contains("connection reset"));
    }

    #[test]
    fn gateway_error_maps_to_service_unavailable() {
        let interface =
            ApplicationError::ModelGateway("HTTP 529".to_owned()).into_interface("c-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.correlation_id(), "c-3");
    }

    #[test]
    fn exhausted_loop_maps_to_internal() {
        let interface = ApplicationError::ResourceExhaustion {
            rounds: 10,
            reason: "round limit reached".to_owned(),
        }
        .into_interface("c-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
