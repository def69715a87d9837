pub mod error;
pub mod string_ext;

pub use error::{ApiError, ApiResult, ErrorKind};
pub use string_ext::StringExt;
