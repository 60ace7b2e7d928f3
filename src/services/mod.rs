pub mod auth_service;
pub mod auth_service_impl;
pub mod mailer;
pub mod onboarding;
pub mod password_hasher;
pub mod password_policy;

pub use auth_service::{AuthError, AuthOutcome, AuthService, ChangeReason};
pub use auth_service_impl::SeaOrmAuthService;
pub use mailer::{LogMailer, Mailer, RetryPolicy, SmtpMailer};
pub use onboarding::{OnboardingReport, OnboardingService};
pub use password_hasher::PasswordHasher;
pub use password_policy::{PasswordPolicy, PolicyError};
