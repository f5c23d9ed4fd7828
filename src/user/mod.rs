mod models;
mod store;

pub use models::{NewUser, User, UserStatus};
pub use store::UserStore;
