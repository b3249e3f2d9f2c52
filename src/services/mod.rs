pub mod auth_service;
pub mod auth_service_impl;
pub mod notifier;
pub mod token;

pub use auth_service::{
    AuthError, AuthService, AuthenticatedUser, DesignationInfo, LoginChallenge, UserProfile,
};
pub use auth_service_impl::SeaOrmAuthService;
pub use notifier::{LogNotifier, Notifier};
pub use token::{Claims, OpaqueTokenIssuer, TokenIssuer, TokenPair};
