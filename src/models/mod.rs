mod content_access;
mod purchase;
mod user;

pub use content_access::*;
pub use purchase::*;
pub use user::*;
