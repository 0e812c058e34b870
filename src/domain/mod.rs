pub mod user;
pub mod donation;
pub mod subscription;

pub use user::*;
pub use donation::*;
pub use subscription::*;
