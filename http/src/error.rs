use axum::{
    http::StatusCode,
    response::{
        IntoResponse,
        Response,
    },
};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Encoding the metrics failed: {0}")]
    Encoding(#[from] prometheus::Error),
    #[error("The metrics are not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("{self}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}
