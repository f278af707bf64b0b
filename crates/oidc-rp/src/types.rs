mod request;
mod response;

pub use self::request::*;
pub use self::response::*;
