use serde::Serialize;
use utoipa::ToSchema;

/// Pagination block carried by list responses; all fields empty for
/// single-object responses.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct Meta {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub total: Option<i64>,
}

impl Meta {
    pub fn new(page: i64, per_page: i64, total: i64) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
            total: Some(total),
        }
    }

    pub fn empty() -> Self {
        Self {
            page: None,
            per_page: None,
            total: None,
        }
    }
}

/// Error payload; `error` mirrors the envelope message so clients can read
/// either field.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorData {
    pub error: String,
}

/// Envelope wrapping every JSON response, success or failure.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub message: String,
    pub data: Option<T>,
    pub meta: Option<Meta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T, meta: Option<Meta>) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
            meta,
        }
    }
}

impl ApiResponse<ErrorData> {
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            data: Some(ErrorData {
                error: message.clone(),
            }),
            message,
            meta: Some(Meta::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_mirrors_message_into_error_data() {
        let body = ApiResponse::failure("Bad Request quantity must be greater than 0");
        assert_eq!(body.message, "Bad Request quantity must be greater than 0");
        assert_eq!(
            body.data.unwrap().error,
            "Bad Request quantity must be greater than 0"
        );
        assert!(body.meta.unwrap().page.is_none());
    }

    #[test]
    fn meta_carries_pagination() {
        let meta = Meta::new(2, 20, 41);
        assert_eq!(meta.page, Some(2));
        assert_eq!(meta.per_page, Some(20));
        assert_eq!(meta.total, Some(41));
    }
}
