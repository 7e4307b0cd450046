pub mod auth;
pub mod avatar;
pub mod cache;
pub mod contacts;
pub mod database;
pub mod email;
pub mod jwt;

pub use auth::{AuthService, ConfirmOutcome};
pub use avatar::{AvatarStore, CloudinaryStore, MockAvatarStore};
pub use cache::{IdentityCache, MemoryCache, RedisCache};
pub use contacts::ContactService;
pub use database::{
    ContactStore, MemoryContactStore, MemoryDirectory, PgContactStore, PgUserDirectory,
    UserDirectory,
};
pub use email::{EmailProvider, MockEmailService, SmtpEmailService};
pub use jwt::JwtService;
