use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use taleforge_core::error::CoreError;
use taleforge_core::store::StoreError;
use taleforge_pipeline::{JobError, LicensingError, RegistrationError, TransactionError};

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain and pipeline errors and implements [`IntoResponse`] to
/// produce consistent `{"error", "code"}` JSON bodies. Some codes carry an
/// extra field (`package_id`, `asset_id`) the client needs to act on.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Licensing(#[from] LicensingError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

/// Status, machine-readable code, message and an optional extra field.
struct Classified {
    status: StatusCode,
    code: &'static str,
    message: String,
    extra: Option<(&'static str, Value)>,
}

impl Classified {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            extra: None,
        }
    }

    fn with(mut self, key: &'static str, value: impl Into<Value>) -> Self {
        self.extra = Some((key, value.into()));
        self
    }

    fn internal(detail: &dyn std::fmt::Display) -> Self {
        tracing::error!(error = %detail, "Internal error");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "An internal error occurred",
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let classified = match &self {
            AppError::Core(err) => classify_core(err),
            AppError::Store(err) => classify_store(err),
            AppError::Job(err) => classify_job(err),
            AppError::Registration(err) => classify_registration(err),
            AppError::Licensing(err) => classify_licensing(err),
            AppError::BadRequest(msg) => {
                Classified::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone())
            }
            AppError::InternalError(msg) => Classified::internal(msg),
        };

        let mut body = json!({
            "error": classified.message,
            "code": classified.code,
        });
        if let (Some((key, value)), Some(map)) = (classified.extra, body.as_object_mut()) {
            map.insert(key.to_string(), value);
        }

        (classified.status, axum::Json(body)).into_response()
    }
}

fn classify_core(err: &CoreError) -> Classified {
    match err {
        CoreError::NotFound { entity, id } => Classified::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => {
            Classified::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
        }
        CoreError::Conflict(msg) => Classified::new(StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Unauthorized(msg) => {
            Classified::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
        }
        CoreError::Forbidden(msg) => Classified::new(StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
        CoreError::Internal(msg) => Classified::internal(msg),
    }
}

fn classify_store(err: &StoreError) -> Classified {
    match err {
        StoreError::DuplicateContent { existing } => {
            Classified::new(StatusCode::CONFLICT, "DUPLICATE_CONTENT", err.to_string())
                .with("package_id", existing.to_string())
        }
        StoreError::NotFound(_) => Classified::new(StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
        StoreError::Conflict(msg) => Classified::new(StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        StoreError::Backend(msg) => Classified::internal(msg),
    }
}

fn classify_job(err: &JobError) -> Classified {
    match err {
        JobError::Validation(msg) => {
            Classified::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
        }
        JobError::Duplicate { existing_id } => {
            Classified::new(StatusCode::CONFLICT, "DUPLICATE_CONTENT", err.to_string())
                .with("package_id", existing_id.to_string())
        }
        JobError::NotFound(_) => Classified::new(StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
        JobError::Store(inner) => classify_store(inner),
    }
}

fn classify_transaction(err: &TransactionError) -> Classified {
    let message = err.to_string();
    match err {
        TransactionError::SignerRejected => {
            Classified::new(StatusCode::BAD_REQUEST, "SIGNER_REJECTED", message)
        }
        TransactionError::InsufficientFunds => {
            Classified::new(StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_FUNDS", message)
        }
        TransactionError::MintingConfigurationFault(_) => {
            tracing::error!(error = %err, "Minting configuration fault");
            Classified::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "MINTING_CONFIGURATION_FAULT",
                message,
            )
        }
        TransactionError::ChainFault(_) => {
            Classified::new(StatusCode::BAD_GATEWAY, "CHAIN_ERROR", message)
        }
    }
}

fn classify_registration(err: &RegistrationError) -> Classified {
    let message = err.to_string();
    match err {
        RegistrationError::SignerNotConnected => {
            Classified::new(StatusCode::BAD_REQUEST, "SIGNER_NOT_CONNECTED", message)
        }
        RegistrationError::PackageNotFound(_) => {
            Classified::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
        }
        RegistrationError::PackageNotCompleted { .. } => {
            Classified::new(StatusCode::CONFLICT, "PACKAGE_NOT_COMPLETED", message)
        }
        RegistrationError::MissingCreator => {
            Classified::new(StatusCode::UNPROCESSABLE_ENTITY, "MISSING_CREATOR", message)
        }
        RegistrationError::CreatorMismatch => {
            Classified::new(StatusCode::FORBIDDEN, "CREATOR_MISMATCH", message)
        }
        RegistrationError::AlreadyRegisteredByAnother { asset_id } => {
            Classified::new(StatusCode::CONFLICT, "ALREADY_REGISTERED", message)
                .with("asset_id", asset_id.clone())
        }
        RegistrationError::NetworkSwitchFailed => {
            Classified::new(StatusCode::PRECONDITION_FAILED, "NETWORK_SWITCH_FAILED", message)
        }
        RegistrationError::RegistrationInProgress => {
            Classified::new(StatusCode::CONFLICT, "REGISTRATION_IN_PROGRESS", message)
        }
        RegistrationError::InvalidLicense(_) => {
            Classified::new(StatusCode::BAD_REQUEST, "INVALID_LICENSE", message)
        }
        RegistrationError::MetadataPublishFailed(_) => {
            Classified::new(StatusCode::BAD_GATEWAY, "METADATA_PUBLISH_FAILED", message)
        }
        RegistrationError::Transaction(inner) => classify_transaction(inner),
        RegistrationError::Store(inner) => classify_store(inner),
    }
}

fn classify_licensing(err: &LicensingError) -> Classified {
    let message = err.to_string();
    match err {
        LicensingError::SignerNotConnected => {
            Classified::new(StatusCode::BAD_REQUEST, "SIGNER_NOT_CONNECTED", message)
        }
        LicensingError::MissingAssetId => {
            Classified::new(StatusCode::BAD_REQUEST, "MISSING_ASSET_ID", message)
        }
        LicensingError::AssetNotFound(_) => {
            Classified::new(StatusCode::NOT_FOUND, "ASSET_NOT_FOUND", message)
        }
        LicensingError::NotAssetOwner => {
            Classified::new(StatusCode::FORBIDDEN, "NOT_ASSET_OWNER", message)
        }
        LicensingError::InvalidLicense(_) => {
            Classified::new(StatusCode::BAD_REQUEST, "INVALID_LICENSE", message)
        }
        LicensingError::InvalidAmount(_) => {
            Classified::new(StatusCode::BAD_REQUEST, "INVALID_AMOUNT", message)
        }
        LicensingError::InvalidReceiver(_) => {
            Classified::new(StatusCode::BAD_REQUEST, "INVALID_RECEIVER", message)
        }
        LicensingError::MissingSnapshots => {
            Classified::new(StatusCode::BAD_REQUEST, "MISSING_SNAPSHOTS", message)
        }
        LicensingError::Transaction(inner) => classify_transaction(inner),
    }
}
