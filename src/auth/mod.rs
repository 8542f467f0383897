//! Credentials: where tokens live and the account operations that produce them.

mod session;
mod store;

pub use session::{
    LOGIN_ENDPOINT, PROFILE_ENDPOINT, ProfileUpdate, REGISTER_ENDPOINT, RegisterData, Role,
    Session, UPDATE_PROFILE_ENDPOINT, User,
};
pub use store::{
    ACCESS_TOKEN_KEY, FileTokenStore, MemoryTokenStore, REFRESH_TOKEN_KEY, TokenStore, Tokens,
    default_token_path,
};

#[cfg(test)]
pub use store::MockTokenStore;
