//! Account provisioning for new hires.
//!
//! The job body is a plain async function over the store, the policy, the
//! hasher, and a mailer, so the scheduler and the CLI can both drive it.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate, Utc};
use tracing::{debug, error, info, warn};

use crate::db::{Employee, Store};
use crate::services::mailer::{Mailer, RetryPolicy, send_credentials_with_retry};
use crate::services::password_hasher::PasswordHasher;
use crate::services::password_policy::PasswordPolicy;

/// The username base keeps one slot for the (possibly transliterated)
/// first-name initial and at most six surname characters.
const USERNAME_BASE_MAX: usize = 7;

/// Temporary passwords expire five days after provisioning; the credentials
/// email announces the same window.
const TEMP_PASSWORD_VALIDITY_DAYS: u64 = 5;

#[derive(Debug, Default, Clone, Copy)]
pub struct OnboardingReport {
    pub accounts_created: usize,
    pub emails_sent: usize,
    pub emails_failed: usize,
}

pub struct OnboardingService {
    store: Store,
    policy: Arc<PasswordPolicy>,
    hasher: PasswordHasher,
    mailer: Arc<dyn Mailer>,
    retry: RetryPolicy,
}

impl OnboardingService {
    #[must_use]
    pub fn new(
        store: Store,
        policy: Arc<PasswordPolicy>,
        hasher: PasswordHasher,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            store,
            policy,
            hasher,
            mailer,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Provisions an account for every employee starting today and mails the
    /// credentials. Individual failures are recorded and never roll back or
    /// block the remaining employees.
    pub async fn run(&self) -> Result<OnboardingReport> {
        info!("Executing onboarding job...");

        let today = Utc::now().date_naive();
        let new_hires = self.store.employees_starting_on(today).await?;

        if new_hires.is_empty() {
            info!("Onboarding job finished; no new accounts were created");
            return Ok(OnboardingReport::default());
        }

        let mut report = OnboardingReport::default();

        for employee in new_hires {
            // Re-runs on the same day must not re-provision earlier hires.
            if self.store.employee_has_account(employee.id).await? {
                debug!("Employee {} already has an account, skipping", employee.id);
                continue;
            }

            match self.provision(&employee, today).await {
                Ok((username, password)) => {
                    report.accounts_created += 1;

                    match send_credentials_with_retry(
                        self.mailer.as_ref(),
                        self.retry,
                        &employee.email,
                        &username,
                        &password,
                    )
                    .await
                    {
                        Ok(()) => report.emails_sent += 1,
                        Err(err) => {
                            warn!(
                                "Failed to send credentials email to {}: {err:#}",
                                employee.email
                            );
                            report.emails_failed += 1;
                        }
                    }
                }
                Err(err) => {
                    error!(
                        "Failed to provision account for employee {}: {err:#}",
                        employee.id
                    );
                }
            }
        }

        if report.emails_failed > 0 {
            warn!(
                "Onboarding job finished with errors; {} accounts created, {} emails failed",
                report.accounts_created, report.emails_failed
            );
        } else {
            info!(
                "Onboarding job finished; {} accounts created",
                report.accounts_created
            );
        }

        Ok(report)
    }

    async fn provision(&self, employee: &Employee, today: NaiveDate) -> Result<(String, String)> {
        let username = self
            .next_free_username(&employee.first_name, &employee.last_name)
            .await?;
        let password = self.policy.generate();
        let password_hash = self.hasher.hash_async(password.clone()).await?;

        let expiry = today
            .checked_add_days(Days::new(TEMP_PASSWORD_VALIDITY_DAYS))
            .context("Password expiry date out of range")?;

        self.store
            .create_user_account(&username, &password_hash, employee.id, expiry, None)
            .await?;

        info!(
            "Created account {username} for employee {} {}",
            employee.first_name, employee.last_name
        );

        Ok((username, password))
    }

    /// Probes the user store with increasing numeric suffixes until the
    /// handle is free.
    async fn next_free_username(&self, first_name: &str, last_name: &str) -> Result<String> {
        let base = username_base(first_name, last_name);

        let mut candidate = base.clone();
        let mut counter = 1;
        while self.store.username_exists(&candidate).await? {
            candidate = format!("{base}{counter}");
            counter += 1;
        }

        Ok(candidate)
    }
}

/// Lower-cases, strips spaces and hyphens, and transliterates the common
/// German umlauts.
fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .replace([' ', '-'], "")
        .replace('ä', "ae")
        .replace('ö', "oe")
        .replace('ü', "ue")
}

/// First-name initial (transliterated, so it may be two characters) plus up
/// to six surname characters.
fn username_base(first_name: &str, last_name: &str) -> String {
    let initial: String = normalize_name(&first_name.chars().take(1).collect::<String>());
    let surname = normalize_name(last_name);

    let mut base = initial;
    base.extend(surname.chars().take(USERNAME_BASE_MAX - 1));
    base
}
