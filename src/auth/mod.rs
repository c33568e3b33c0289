//! OAuth credential lifecycle.

pub mod callback;
pub mod credentials;
pub mod oauth;

pub use callback::CallbackServer;
pub use credentials::{CredentialStore, Credentials};
pub use oauth::{Endpoints, TokenAuthority};
