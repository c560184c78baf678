//! Request and response bodies for the REST endpoints

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope returned by every NDVI endpoint response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
  /// Machine-readable outcome code, e.g. `SUCCESS`
  pub code: String,

  /// `"<English> | <Arabic>"`
  pub message: String,

  /// Summary on success, error text on failure
  #[serde(skip_serializing_if = "Option::is_none", default)]
  pub details: Option<Value>,
}

impl ApiResponse {
  pub fn new(code: ResponseCode) -> Self {
    Self { code: code.as_str().to_string(), message: code.message(), details: None }
  }

  pub fn with_details(mut self, details: Value) -> Self {
    self.details = Some(details);
    self
  }

  pub fn with_error(self, error: impl ToString) -> Self {
    self.with_details(Value::String(error.to_string()))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
  Unauthenticated,
  InvalidJson,
  InvalidField,
  InvalidDate,
  FieldsError,
  NoFields,
  Success,
  UpdateFailed,
}

impl ResponseCode {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResponseCode::Unauthenticated => "UNAUTHENTICATED",
      ResponseCode::InvalidJson => "INVALID_JSON",
      ResponseCode::InvalidField => "INVALID_FIELD",
      ResponseCode::InvalidDate => "INVALID_DATE",
      ResponseCode::FieldsError => "FIELDS_ERROR",
      ResponseCode::NoFields => "NO_FIELDS",
      ResponseCode::Success => "SUCCESS",
      ResponseCode::UpdateFailed => "NDVI_UPDATE_FAILED",
    }
  }

  pub fn message(&self) -> String {
    let (english, arabic) = match self {
      ResponseCode::Unauthenticated => ("Authentication required", "يتطلب تسجيل الدخول"),
      ResponseCode::InvalidJson => ("Invalid JSON payload", "تنسيق JSON غير صالح"),
      ResponseCode::InvalidField => ("Invalid field identifier", "معرف الحقل غير صالح"),
      ResponseCode::InvalidDate => ("Invalid date", "تاريخ غير صالح"),
      ResponseCode::FieldsError => ("Unable to load fields", "تعذر تحميل الحقول"),
      ResponseCode::NoFields => ("No fields available for NDVI update", "لا توجد حقول لتحديث مؤشر NDVI"),
      ResponseCode::Success => ("NDVI update completed", "تم تحديث مؤشرات NDVI"),
      ResponseCode::UpdateFailed => ("NDVI update failed", "فشل تحديث مؤشرات NDVI"),
    };
    format!("{english} | {arabic}")
  }
}

/// Optional JSON body for `POST /api/ndvi/update`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateRequest {
  #[serde(default)]
  pub field_id: Option<String>,

  /// RFC 3339 target date
  #[serde(default)]
  pub date: Option<String>,
}

/// `field_id` accepted from the query string as well
#[derive(Debug, Default, Deserialize)]
pub struct UpdateQuery {
  pub field_id: Option<String>,
}

/// Response for `GET /status`
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
  pub status: String,
  pub version: String,
  /// Provider name of the default scene fetcher
  pub provider: String,
}
