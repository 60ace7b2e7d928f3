use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{Days, Utc};
use kadro::config::SecurityConfig;
use kadro::db::{NewEmployee, Store};
use kadro::entities::employees::EmploymentType;
use kadro::services::{
    AuthOutcome, AuthService, Mailer, OnboardingService, PasswordHasher, PasswordPolicy,
    RetryPolicy, SeaOrmAuthService,
};

/// Captures every delivery instead of sending it.
#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingMailer {
    fn deliveries(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_credentials(&self, to: &str, username: &str, password: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), username.to_string(), password.to_string()));
        Ok(())
    }
}

/// Fails a configurable number of times, then succeeds.
struct FlakyMailer {
    failures_left: Mutex<u32>,
    attempts: Mutex<u32>,
}

impl FlakyMailer {
    fn failing(times: u32) -> Self {
        Self {
            failures_left: Mutex::new(times),
            attempts: Mutex::new(0),
        }
    }

    fn attempts(&self) -> u32 {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl Mailer for FlakyMailer {
    async fn send_credentials(&self, _to: &str, _username: &str, _password: &str) -> anyhow::Result<()> {
        *self.attempts.lock().unwrap() += 1;
        let mut failures = self.failures_left.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(anyhow!("smtp relay unavailable"));
        }
        Ok(())
    }
}

struct Harness {
    store: Store,
    policy: Arc<PasswordPolicy>,
    hasher: PasswordHasher,
}

impl Harness {
    async fn new() -> Self {
        // A single connection keeps every query on the same in-memory
        // database.
        let store = Store::with_pool_options("sqlite::memory:", 1, 1)
            .await
            .expect("store");
        let settings = store.load_password_settings().await.expect("settings");
        let policy = Arc::new(PasswordPolicy::from_settings(&settings).expect("policy"));
        let hasher = PasswordHasher::new(&SecurityConfig::default()).expect("hasher");

        Self {
            store,
            policy,
            hasher,
        }
    }

    fn onboarding(&self, mailer: Arc<dyn Mailer>) -> OnboardingService {
        OnboardingService::new(
            self.store.clone(),
            self.policy.clone(),
            self.hasher.clone(),
            mailer,
        )
        .with_retry_policy(RetryPolicy {
            max_attempts: 3,
            delay: Duration::ZERO,
        })
    }

    async fn add_hire(&self, first_name: &str, last_name: &str, email: &str) -> i32 {
        let today = Utc::now().date_naive();
        self.store
            .create_employee(
                NewEmployee {
                    first_name: first_name.to_string(),
                    last_name: last_name.to_string(),
                    email: email.to_string(),
                    manager_id: None,
                    job_title: None,
                    department: None,
                    employment_type: EmploymentType::FullTime,
                    hire_date: Some(today),
                    start_date: Some(today),
                },
                None,
            )
            .await
            .expect("employee")
            .id
    }
}

#[tokio::test]
async fn provisions_accounts_with_transliterated_usernames() {
    let harness = Harness::new().await;
    harness
        .add_hire("Änne", "Müller", "aenne.mueller@example.com")
        .await;
    harness
        .add_hire("Anton", "Mayer", "anton.mayer@example.com")
        .await;

    let mailer = Arc::new(RecordingMailer::default());
    let report = harness.onboarding(mailer.clone()).run().await.unwrap();

    assert_eq!(report.accounts_created, 2);
    assert_eq!(report.emails_sent, 2);
    assert_eq!(report.emails_failed, 0);

    let aenne = harness
        .store
        .get_user_by_name("aemuelle")
        .await
        .unwrap()
        .expect("umlaut-transliterated username");
    let anton = harness
        .store
        .get_user_by_name("amayer")
        .await
        .unwrap()
        .expect("plain username");

    // Accounts start first-login flagged with a five-day temporary password.
    let expected_expiry = Utc::now()
        .date_naive()
        .checked_add_days(Days::new(5))
        .unwrap();
    for user in [&aenne, &anton] {
        assert!(user.is_first_login);
        assert_eq!(user.password_expiry_date, Some(expected_expiry));
    }

    // Both are linked to their employee records.
    assert!(
        harness
            .store
            .employee_for_user(aenne.id)
            .await
            .unwrap()
            .is_some()
    );

    // Each mailed password is policy compliant and authenticates into the
    // first-login flow.
    let auth = SeaOrmAuthService::new(
        harness.store.clone(),
        harness.hasher.clone(),
        harness.policy.clone(),
    );
    for (to, username, password) in mailer.deliveries() {
        assert!(to.ends_with("@example.com"));
        assert!(harness.policy.is_valid(&password), "password: {password}");

        let outcome = auth.authenticate(&username, &password).await.unwrap();
        assert!(matches!(outcome, AuthOutcome::FirstLoginRequired { .. }));
    }
}

#[tokio::test]
async fn username_collisions_get_numeric_suffixes() {
    let harness = Harness::new().await;
    harness
        .add_hire("Anton", "Mayer", "anton.mayer@example.com")
        .await;

    let mailer = Arc::new(RecordingMailer::default());
    harness.onboarding(mailer.clone()).run().await.unwrap();
    assert!(harness.store.username_exists("amayer").await.unwrap());

    // A later batch with a colliding handle probes upwards.
    harness
        .add_hire("Anna", "Mayer", "anna.mayer@example.com")
        .await;
    harness
        .add_hire("Arno", "Mayer", "arno.mayer@example.com")
        .await;
    harness.onboarding(mailer.clone()).run().await.unwrap();

    assert!(harness.store.username_exists("amayer1").await.unwrap());
    assert!(harness.store.username_exists("amayer2").await.unwrap());

    // All generated usernames are pairwise distinct.
    let mut usernames: Vec<String> = mailer
        .deliveries()
        .into_iter()
        .map(|(_, username, _)| username)
        .collect();
    let total = usernames.len();
    usernames.sort();
    usernames.dedup();
    assert_eq!(usernames.len(), total);
}

#[tokio::test]
async fn reruns_skip_already_provisioned_hires() {
    let harness = Harness::new().await;
    harness
        .add_hire("Anton", "Mayer", "anton.mayer@example.com")
        .await;

    let mailer = Arc::new(RecordingMailer::default());
    harness.onboarding(mailer.clone()).run().await.unwrap();

    // A second run on the same day leaves the provisioned hire alone.
    let report = harness.onboarding(mailer.clone()).run().await.unwrap();
    assert_eq!(report.accounts_created, 0);
    assert_eq!(mailer.deliveries().len(), 1);

    // A new same-day hire with a colliding handle gets the first suffix.
    harness
        .add_hire("Anna", "Mayer", "anna.mayer@example.com")
        .await;
    let report = harness.onboarding(mailer.clone()).run().await.unwrap();
    assert_eq!(report.accounts_created, 1);
    assert!(harness.store.username_exists("amayer1").await.unwrap());
    assert!(!harness.store.username_exists("amayer2").await.unwrap());
}

#[tokio::test]
async fn transient_email_failures_are_retried() {
    let harness = Harness::new().await;
    harness
        .add_hire("Anton", "Mayer", "anton.mayer@example.com")
        .await;

    // Two failures, then success: within the three-attempt budget.
    let mailer = Arc::new(FlakyMailer::failing(2));
    let report = harness.onboarding(mailer.clone()).run().await.unwrap();

    assert_eq!(mailer.attempts(), 3);
    assert_eq!(report.accounts_created, 1);
    assert_eq!(report.emails_sent, 1);
    assert_eq!(report.emails_failed, 0);
}

#[tokio::test]
async fn exhausted_email_retries_do_not_block_the_batch() {
    let harness = Harness::new().await;
    harness
        .add_hire("Anton", "Mayer", "anton.mayer@example.com")
        .await;
    harness
        .add_hire("Clara", "Schmidt", "clara.schmidt@example.com")
        .await;

    // Never succeeds: three attempts per recipient, then give up.
    let mailer = Arc::new(FlakyMailer::failing(u32::MAX));
    let report = harness.onboarding(mailer.clone()).run().await.unwrap();

    assert_eq!(mailer.attempts(), 6);
    assert_eq!(report.accounts_created, 2);
    assert_eq!(report.emails_sent, 0);
    assert_eq!(report.emails_failed, 2);

    // The accounts exist even though no email went out.
    assert!(harness.store.username_exists("amayer").await.unwrap());
    assert!(harness.store.username_exists("cschmid").await.unwrap());
}
