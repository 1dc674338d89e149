pub mod admin;
pub mod audit;
pub mod auth;
pub mod metrics;
pub mod post;
pub mod report;
pub mod user;

use service_core::error::AppError;
use validator::Validate;

use crate::services::ServiceError;

/// Run `validator` rules; failures become 400s.
pub(crate) fn validate_request<T: Validate>(req: &T) -> Result<(), AppError> {
    req.validate()
        .map_err(|e| AppError::from(ServiceError::Validation(e.to_string())))
}
