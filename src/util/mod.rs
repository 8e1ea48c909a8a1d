pub mod result;

pub use result::{ok_result, ApiError, ApiResult, CommonResult};
