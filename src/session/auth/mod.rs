//! OAuth authorization-code login against the identity provider.

mod authorizer;

pub use authorizer::{AuthParams, Discovery, OAuthAuthorizer, SESSION_COOKIE};
