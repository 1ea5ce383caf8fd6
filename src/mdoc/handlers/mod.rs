pub mod health;
pub use self::health::{check, health};

pub mod user;
pub use self::user::{user_add, user_pwd_reset};
