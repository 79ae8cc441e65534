use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub message: String,
}

impl ApiResponse {
    pub fn error(error: String, message: String) -> Self {
        Self {
            success: false,
            error: Some(error),
            message,
        }
    }
}
