//! Database entities and the cached identity projection.

mod contact;
mod user;

pub use contact::{birthday_in_window, Contact, NewContact};
pub use user::{CurrentUser, NewUser, Role, User};
