pub mod auth;
pub mod contacts;
pub mod users;

pub use auth::{
    LoginRequest, MessageResponse, PasswordResetConfirm, PasswordResetRequest, RegisterRequest,
    TokenResponse,
};
pub use contacts::{BirthdaysQuery, ContactPayload, ListQuery, SearchQuery};
pub use users::{ChangeRoleRequest, UserResponse};
