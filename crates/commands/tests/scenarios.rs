//! Command scenarios against the in-memory store and the read models.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use commands::{
    AddHuman, AddMachine, AuthRequestUpdater, CommandContext, Commands, CommandsConfig, OrgAdmin,
    OrgSetup, OrgSetupAdmin, RetryPolicy, SecretGenerator, StaticSecondFactorVerifier,
};
use common::AggregateId;
use domain::auth_request::NewAuthRequest;
use domain::metadata::{GRANTED_ORGS, LOGIN_AS};
use domain::user::Profile;
use domain::{Aggregate, AuthRequestStep, DomainError, ErrorKind, KeyUsage, User, UserState};
use event_store::{EventStore, InMemoryEventStore};
use projections::{ProcessorConfig, ProjectionProcessor, Queries, ReadModels};

const CODE: &str = "CODE1234";
const PASSWORD: &str = "Password1!";

struct FixedSecret;

impl SecretGenerator for FixedSecret {
    fn generate(&self) -> String {
        CODE.to_string()
    }
}

struct Harness {
    store: Arc<InMemoryEventStore>,
    commands: Commands<InMemoryEventStore>,
    processor: Arc<ProjectionProcessor<InMemoryEventStore>>,
    ctx: CommandContext,
}

fn config() -> CommandsConfig {
    CommandsConfig {
        instance_domain: "tld".into(),
        default_org_id: "default".into(),
        retry: RetryPolicy {
            backoff: Duration::ZERO,
            ..RetryPolicy::default()
        },
        ..CommandsConfig::default()
    }
}

impl Harness {
    fn new() -> Self {
        Self::with_config(config())
    }

    fn with_config(config: CommandsConfig) -> Self {
        let store = Arc::new(InMemoryEventStore::new());
        let models = ReadModels::new();
        let processor = ProjectionProcessor::new(Arc::clone(&store), ProcessorConfig::default())
            .with_projections(models.projections());
        let commands = Commands::new(Arc::clone(&store), Queries::new(models), config)
            .with_secret_generator(Arc::new(FixedSecret));
        Self {
            store,
            commands,
            processor: Arc::new(processor),
            ctx: CommandContext::new("admin"),
        }
    }

    async fn sync(&self) {
        self.processor.run_catch_up().await.unwrap();
    }

    async fn org(&self, id: &str, name: &str) {
        self.commands
            .add_org_with_id(&self.ctx, id, name, "admin", "default")
            .await
            .unwrap();
    }

    async fn human(&self, org: &str, username: &str) -> String {
        self.commands
            .add_human(&self.ctx, org, &human(username, Some(PASSWORD)))
            .await
            .unwrap()
            .resource_id
            .to_string()
    }

    async fn user(&self, id: &str) -> User {
        self.commands
            .handler()
            .load(&AggregateId::from(id))
            .await
            .unwrap()
    }

    async fn claimed(&self, namespace: &str, key: &str) -> bool {
        self.store.is_claimed(namespace, key).await.unwrap()
    }
}

fn human(username: &str, password: Option<&str>) -> AddHuman {
    AddHuman {
        username: username.into(),
        profile: Profile::new("Given", "Family"),
        email: format!("{username}@example.com"),
        email_verified: true,
        password: password.map(str::to_string),
        password_change_required: false,
    }
}

fn kind<T: std::fmt::Debug>(result: Result<T, DomainError>) -> ErrorKind {
    result.unwrap_err().kind()
}

mod orgs {
    use super::*;

    #[tokio::test]
    async fn add_org_emits_domain_and_owner_membership() {
        let h = Harness::new();
        let details = h
            .commands
            .add_org_with_id(&h.ctx, "org2", "Org", "user1", "org1")
            .await
            .unwrap();

        assert_eq!(details.resource_owner.as_str(), "org2");
        assert_eq!(details.sequence.as_i64(), 5);

        let events = h
            .store
            .events_for_aggregate("org", &AggregateId::from("org2"))
            .await
            .unwrap();
        let types: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            types,
            vec![
                "org.added",
                "org.domain.added",
                "org.domain.verified",
                "org.domain.primary.set",
                "org.member.added",
            ]
        );
        assert!(events.iter().all(|e| e.editor == "admin"));

        assert!(h.claimed("org-name", "Org").await);
        assert!(h.claimed("org-domain", "org.tld").await);
        assert!(h.claimed("member", "org2/user1").await);
    }

    #[tokio::test]
    async fn concurrent_adds_with_one_name_admit_one() {
        let h = Harness::new();
        let (first, second) = tokio::join!(
            h.commands.add_org(&h.ctx, "Org", "user1", "org1"),
            h.commands.add_org(&h.ctx, "Org", "user2", "org1"),
        );

        let errors: Vec<_> = [first, second].into_iter().filter_map(Result::err).collect();
        assert_eq!(errors.len(), 1);
        match &errors[0] {
            DomainError::AlreadyExists { constraint, .. } => {
                assert_eq!(constraint, "org-name:Org")
            }
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
        assert_eq!(h.store.event_count().await, 5);
    }

    #[tokio::test]
    async fn add_org_validates_before_io() {
        let h = Harness::new();
        let err = h
            .commands
            .add_org(&h.ctx, "  ", "user1", "org1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.id(), "ORG-mruNY");
        assert_eq!(
            kind(h.commands.add_org(&h.ctx, "Org", " ", "org1").await),
            ErrorKind::InvalidArgument
        );
        assert_eq!(h.store.event_count().await, 0);
    }

    #[tokio::test]
    async fn stored_owner_must_belong_to_its_resource_owner() {
        let h = Harness::new();
        h.org("org1", "Acme").await;
        let alice = h.human("org1", "alice").await;

        let err = h
            .commands
            .add_org(&h.ctx, "Other", &alice, "org9")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        h.commands
            .add_org(&h.ctx, "Other", &alice, "org1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn removed_owner_is_rejected() {
        let h = Harness::new();
        h.org("org1", "Acme").await;
        let alice = h.human("org1", "alice").await;
        h.sync().await;
        h.commands.remove_user(&h.ctx, &alice).await.unwrap();
        let before = h.store.event_count().await;

        let err = h
            .commands
            .add_org(&h.ctx, "Other", &alice, "org1")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(h.store.event_count().await, before);
        assert!(!h.claimed("org-name", "Other").await);
    }

    #[tokio::test]
    async fn rename_to_same_trimmed_name_is_rejected() {
        let h = Harness::new();
        h.org("org1", "org").await;
        let before = h.store.event_count().await;

        let err = h
            .commands
            .change_org(&h.ctx, "org1", " org ")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(err.message_key(), "Errors.Org.NotChanged");
        assert_eq!(h.store.event_count().await, before);
    }

    #[tokio::test]
    async fn rename_moves_name_and_domain_claims() {
        let h = Harness::new();
        h.org("org1", "Org").await;

        h.commands
            .change_org(&h.ctx, "org1", "Acme Corp")
            .await
            .unwrap();

        assert!(h.claimed("org-name", "Acme Corp").await);
        assert!(!h.claimed("org-name", "Org").await);
        assert!(h.claimed("org-domain", "acme-corp.tld").await);
        assert!(!h.claimed("org-domain", "org.tld").await);

        h.commands
            .add_org(&h.ctx, "Org", "user2", "org1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn deactivate_twice_is_rejected() {
        let h = Harness::new();
        h.org("org1", "Org").await;

        h.commands.deactivate_org(&h.ctx, "org1").await.unwrap();
        assert_eq!(
            kind(h.commands.deactivate_org(&h.ctx, "org1").await),
            ErrorKind::PreconditionFailed
        );

        h.commands.reactivate_org(&h.ctx, "org1").await.unwrap();
        assert_eq!(
            kind(h.commands.reactivate_org(&h.ctx, "org1").await),
            ErrorKind::PreconditionFailed
        );
        assert_eq!(
            kind(h.commands.deactivate_org(&h.ctx, "missing").await),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn default_org_cannot_be_removed() {
        let h = Harness::new();
        h.org("default", "Default").await;
        h.sync().await;

        let err = h
            .commands
            .remove_org(&h.ctx, "default")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(err.id(), "COMMA-wG9p1");
    }

    #[tokio::test]
    async fn remove_org_releases_its_claims() {
        let h = Harness::new();
        h.org("org1", "Org").await;
        let alice = h.human("org1", "alice").await;
        h.commands
            .add_idp_link(&h.ctx, &alice, "google", "g-1", "Alice")
            .await
            .unwrap();
        h.sync().await;

        h.commands.remove_org(&h.ctx, "org1").await.unwrap();

        assert!(!h.claimed("org-name", "Org").await);
        assert!(!h.claimed("org-domain", "org.tld").await);
        assert!(!h.claimed("username", "alice").await);
        assert!(!h.claimed("user-idp-link", "google/g-1").await);
        assert_eq!(
            kind(h.commands.remove_org(&h.ctx, "org1").await),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn remove_org_releases_users_the_read_model_has_not_seen() {
        let h = Harness::new();
        h.org("org1", "Org").await;
        h.sync().await;
        let alice = h
            .commands
            .add_human(&h.ctx, "org1", &human("alice", Some(PASSWORD)))
            .await
            .unwrap()
            .resource_id;
        h.commands
            .add_idp_link(&h.ctx, alice.as_str(), "google", "g-1", "Alice")
            .await
            .unwrap();
        assert!(h.commands.queries().user_by_id(alice.as_str()).await.is_none());

        h.commands.remove_org(&h.ctx, "org1").await.unwrap();

        assert!(!h.claimed("username", "alice").await);
        assert!(!h.claimed("user-idp-link", "google/g-1").await);
        h.org("org2", "Other").await;
        h.human("org2", "alice").await;
    }

    #[tokio::test]
    async fn remove_org_skips_removed_users() {
        let h = Harness::new();
        h.org("org1", "Org").await;
        let alice = h.human("org1", "alice").await;
        h.commands.remove_user(&h.ctx, &alice).await.unwrap();
        h.org("org2", "Other").await;
        h.human("org2", "alice").await;

        h.commands.remove_org(&h.ctx, "org1").await.unwrap();

        assert!(h.claimed("username", "alice").await);
    }

    #[tokio::test]
    async fn set_up_org_creates_admins_in_one_push() {
        let h = Harness::new();
        h.org("org0", "Zero").await;
        let bob = h.human("org0", "bob").await;

        let created = h
            .commands
            .set_up_org(
                &h.ctx,
                &OrgSetup {
                    name: "Org".into(),
                    admins: vec![
                        OrgSetupAdmin {
                            admin: OrgAdmin::Human(human("alice", None)),
                            roles: Vec::new(),
                        },
                        OrgSetupAdmin {
                            admin: OrgAdmin::Existing { user_id: bob.clone() },
                            roles: vec!["ORG_USER_MANAGER".into()],
                        },
                        OrgSetupAdmin {
                            admin: OrgAdmin::Machine(AddMachine {
                                username: "robot".into(),
                                name: "Robot".into(),
                                description: String::new(),
                            }),
                            roles: Vec::new(),
                        },
                    ],
                },
            )
            .await
            .unwrap();

        let org_id = created.details.resource_owner.to_string();
        assert_eq!(created.created_admins.len(), 2);
        assert_eq!(created.details.sequence.as_i64(), 7);
        for admin in &created.created_admins {
            assert!(h.claimed("member", &format!("{org_id}/{admin}")).await);
        }
        assert!(h.claimed("member", &format!("{org_id}/{bob}")).await);

        let alice = h.user(created.created_admins[0].as_str()).await;
        assert_eq!(alice.state(), UserState::Initial);
        assert_eq!(alice.init_code().map(|c| c.code.as_str()), Some(CODE));

        h.sync().await;
        assert_eq!(
            h.commands.queries().user_roles(&bob).await,
            vec!["ORG_USER_MANAGER"]
        );
    }

    #[tokio::test]
    async fn set_up_org_commits_nothing_on_failure() {
        let h = Harness::new();
        h.org("org0", "Zero").await;
        h.human("org0", "taken").await;
        let before = h.store.event_count().await;

        let missing = OrgSetup {
            name: "Org".into(),
            admins: vec![OrgSetupAdmin {
                admin: OrgAdmin::Existing {
                    user_id: "missing".into(),
                },
                roles: Vec::new(),
            }],
        };
        assert_eq!(
            kind(h.commands.set_up_org(&h.ctx, &missing).await),
            ErrorKind::PreconditionFailed
        );

        let taken = OrgSetup {
            name: "Org".into(),
            admins: vec![OrgSetupAdmin {
                admin: OrgAdmin::Human(human("taken", Some(PASSWORD))),
                roles: Vec::new(),
            }],
        };
        assert_eq!(
            kind(h.commands.set_up_org(&h.ctx, &taken).await),
            ErrorKind::AlreadyExists
        );

        assert_eq!(h.store.event_count().await, before);
        assert!(!h.claimed("org-name", "Org").await);
    }

    #[tokio::test]
    async fn members_need_known_roles_and_stored_users() {
        let h = Harness::new();
        h.org("org1", "Org").await;
        let alice = h.human("org1", "alice").await;
        let roles = vec!["ORG_USER_MANAGER".to_string()];

        assert_eq!(
            kind(
                h.commands
                    .add_org_member(&h.ctx, "org1", &alice, &["GOD".to_string()])
                    .await
            ),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            kind(h.commands.add_org_member(&h.ctx, "org1", "ghost", &roles).await),
            ErrorKind::PreconditionFailed
        );

        h.commands
            .add_org_member(&h.ctx, "org1", &alice, &roles)
            .await
            .unwrap();
        assert_eq!(
            kind(h.commands.add_org_member(&h.ctx, "org1", &alice, &roles).await),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            kind(h.commands.change_org_member(&h.ctx, "org1", &alice, &roles).await),
            ErrorKind::PreconditionFailed
        );

        h.commands
            .remove_org_member(&h.ctx, "org1", &alice)
            .await
            .unwrap();
        assert!(!h.claimed("member", &format!("org1/{alice}")).await);
    }

    #[tokio::test]
    async fn primary_domain_is_kept_until_replaced() {
        let h = Harness::new();
        h.org("org1", "Org").await;

        assert_eq!(
            kind(h.commands.remove_org_domain(&h.ctx, "org1", "org.tld").await),
            ErrorKind::PreconditionFailed
        );

        h.commands
            .add_org_domain(&h.ctx, "org1", "custom.com")
            .await
            .unwrap();
        assert_eq!(
            kind(
                h.commands
                    .set_primary_org_domain(&h.ctx, "org1", "custom.com")
                    .await
            ),
            ErrorKind::PreconditionFailed
        );
        h.commands
            .verify_org_domain(&h.ctx, "org1", "custom.com")
            .await
            .unwrap();
        h.commands
            .set_primary_org_domain(&h.ctx, "org1", "custom.com")
            .await
            .unwrap();
        h.commands
            .remove_org_domain(&h.ctx, "org1", "org.tld")
            .await
            .unwrap();

        assert!(h.claimed("org-domain", "custom.com").await);
        assert!(!h.claimed("org-domain", "org.tld").await);
    }

    #[tokio::test]
    async fn metadata_is_set_and_removed() {
        let h = Harness::new();
        h.org("org1", "Org").await;

        h.commands
            .set_org_metadata(&h.ctx, "org1", GRANTED_ORGS, "org2")
            .await
            .unwrap();
        assert_eq!(
            kind(
                h.commands
                    .set_org_metadata(&h.ctx, "org1", GRANTED_ORGS, "org2")
                    .await
            ),
            ErrorKind::PreconditionFailed
        );
        h.sync().await;
        assert_eq!(
            h.commands.queries().org_granted_org_ids("org1").await,
            vec!["org2"]
        );

        h.commands
            .remove_org_metadata(&h.ctx, "org1", GRANTED_ORGS)
            .await
            .unwrap();
        h.sync().await;
        assert!(h.commands.queries().org_granted_org_ids("org1").await.is_empty());
    }
}

mod users {
    use super::*;

    #[tokio::test]
    async fn human_without_password_is_initialized_by_code() {
        let h = Harness::new();
        h.org("org1", "Org").await;
        let details = h
            .commands
            .add_human(&h.ctx, "org1", &human("alice", None))
            .await
            .unwrap();
        let alice = details.resource_id.to_string();
        assert_eq!(details.resource_owner.as_str(), "org1");
        assert_eq!(h.user(&alice).await.state(), UserState::Initial);

        let err = h
            .commands
            .verify_init_code(&h.ctx, &alice, "WRONG", None)
            .await
            .unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.Code.Invalid");
        assert_eq!(h.user(&alice).await.init_check_failures(), 1);

        assert_eq!(
            kind(
                h.commands
                    .verify_init_code(&h.ctx, &alice, CODE, Some("short"))
                    .await
            ),
            ErrorKind::InvalidArgument
        );

        h.commands
            .verify_init_code(&h.ctx, &alice, CODE, Some(PASSWORD))
            .await
            .unwrap();
        let user = h.user(&alice).await;
        assert_eq!(user.state(), UserState::Active);
        assert!(user.password().is_some());
    }

    #[tokio::test]
    async fn resend_initial_mail_changes_address_and_code() {
        let h = Harness::new();
        h.org("org1", "Org").await;
        let alice = h
            .commands
            .add_human(&h.ctx, "org1", &human("alice", None))
            .await
            .unwrap()
            .resource_id
            .to_string();

        h.commands
            .resend_initial_mail(&h.ctx, &alice, Some("new@example.com"))
            .await
            .unwrap();
        h.commands.init_code_sent(&h.ctx, &alice).await.unwrap();

        let user = h.user(&alice).await;
        assert_eq!(user.email().map(|e| e.address.as_str()), Some("new@example.com"));

        let active = h.human("org1", "bob").await;
        assert_eq!(
            kind(h.commands.resend_initial_mail(&h.ctx, &active, None).await),
            ErrorKind::PreconditionFailed
        );
    }

    #[tokio::test]
    async fn users_need_an_existing_org() {
        let h = Harness::new();
        assert_eq!(
            kind(
                h.commands
                    .add_human(&h.ctx, "missing", &human("alice", Some(PASSWORD)))
                    .await
            ),
            ErrorKind::PreconditionFailed
        );
        assert_eq!(
            kind(
                h.commands
                    .add_human(&h.ctx, "", &human("alice", Some(PASSWORD)))
                    .await
            ),
            ErrorKind::InvalidArgument
        );
        assert_eq!(h.store.event_count().await, 0);
    }

    #[tokio::test]
    async fn usernames_are_unique_and_released_on_removal() {
        let h = Harness::new();
        h.org("org1", "Org").await;
        h.org("org2", "Other").await;
        let alice = h.human("org1", "alice").await;

        assert_eq!(
            kind(
                h.commands
                    .add_human(&h.ctx, "org2", &human("alice", Some(PASSWORD)))
                    .await
            ),
            ErrorKind::AlreadyExists
        );

        h.commands.remove_user(&h.ctx, &alice).await.unwrap();
        h.human("org2", "alice").await;
    }

    #[tokio::test]
    async fn scoped_usernames_only_clash_within_an_org() {
        let h = Harness::with_config(CommandsConfig {
            user_login_must_be_domain: true,
            ..config()
        });
        h.org("org1", "Org").await;
        h.org("org2", "Other").await;

        h.human("org1", "alice").await;
        h.human("org2", "alice").await;
        assert!(h.claimed("username", "org1/alice").await);
        assert!(h.claimed("username", "org2/alice").await);
    }

    #[tokio::test]
    async fn passwords_follow_the_length_policy() {
        let h = Harness::new();
        h.org("org1", "Org").await;
        assert_eq!(
            kind(
                h.commands
                    .add_human(&h.ctx, "org1", &human("alice", Some("short")))
                    .await
            ),
            ErrorKind::InvalidArgument
        );

        let alice = h.human("org1", "alice").await;
        h.commands
            .change_password(&h.ctx, &alice, "An0ther-Secret", true)
            .await
            .unwrap();
        assert!(h.user(&alice).await.password().unwrap().change_required);
    }

    #[tokio::test]
    async fn lifecycle_transitions_are_checked() {
        let h = Harness::new();
        h.org("org1", "Org").await;
        let alice = h.human("org1", "alice").await;
        let initial = h
            .commands
            .add_human(&h.ctx, "org1", &human("bob", None))
            .await
            .unwrap()
            .resource_id
            .to_string();

        assert_eq!(
            kind(h.commands.deactivate_user(&h.ctx, &initial).await),
            ErrorKind::PreconditionFailed
        );

        h.commands.lock_user(&h.ctx, &alice).await.unwrap();
        assert_eq!(
            kind(h.commands.lock_user(&h.ctx, &alice).await),
            ErrorKind::PreconditionFailed
        );
        h.commands.unlock_user(&h.ctx, &alice).await.unwrap();
        h.commands.deactivate_user(&h.ctx, &alice).await.unwrap();
        h.commands.reactivate_user(&h.ctx, &alice).await.unwrap();
        assert_eq!(h.user(&alice).await.state(), UserState::Active);

        h.commands
            .change_username(&h.ctx, &alice, "alice2")
            .await
            .unwrap();
        assert!(h.claimed("username", "alice2").await);
        assert!(!h.claimed("username", "alice").await);
    }

    #[tokio::test]
    async fn email_and_idp_links() {
        let h = Harness::new();
        h.org("org1", "Org").await;
        let alice = h.human("org1", "alice").await;

        assert_eq!(
            kind(h.commands.change_email(&h.ctx, &alice, "not-an-email").await),
            ErrorKind::InvalidArgument
        );
        h.commands
            .change_email(&h.ctx, &alice, "alice@corp.com")
            .await
            .unwrap();
        h.commands.verify_email(&h.ctx, &alice).await.unwrap();
        assert_eq!(
            kind(h.commands.verify_email(&h.ctx, &alice).await),
            ErrorKind::PreconditionFailed
        );

        h.commands
            .add_idp_link(&h.ctx, &alice, "google", "g-1", "Alice")
            .await
            .unwrap();
        assert!(h.claimed("user-idp-link", "google/g-1").await);
        h.commands
            .remove_idp_link(&h.ctx, &alice, "google", "g-1")
            .await
            .unwrap();
        assert!(!h.claimed("user-idp-link", "google/g-1").await);
    }

    #[tokio::test]
    async fn machines_are_added_with_a_name() {
        let h = Harness::new();
        h.org("org1", "Org").await;
        let machine = AddMachine {
            username: "robot".into(),
            name: String::new(),
            description: String::new(),
        };
        assert_eq!(
            kind(h.commands.add_machine(&h.ctx, "org1", &machine).await),
            ErrorKind::InvalidArgument
        );

        let details = h
            .commands
            .add_machine(
                &h.ctx,
                "org1",
                &AddMachine {
                    name: "Robot".into(),
                    ..machine
                },
            )
            .await
            .unwrap();
        assert_eq!(details.sequence.as_i64(), 1);
        h.commands
            .set_user_metadata(&h.ctx, details.resource_id.as_str(), LOGIN_AS, "ON")
            .await
            .unwrap();
        h.commands
            .remove_user_metadata(&h.ctx, details.resource_id.as_str(), LOGIN_AS)
            .await
            .unwrap();
    }
}

mod login {
    use super::*;

    fn request() -> NewAuthRequest {
        NewAuthRequest {
            client_id: "console".into(),
            redirect_uri: "https://console.tld/callback".into(),
            scopes: vec!["openid".into()],
            ..NewAuthRequest::default()
        }
    }

    async fn with_alice() -> (Harness, String) {
        let h = Harness::new();
        h.org("org1", "Org").await;
        let alice = h.human("org1", "alice").await;
        h.sync().await;
        (h, alice)
    }

    #[tokio::test]
    async fn password_flow_completes_and_issues_code() {
        let (h, alice) = with_alice().await;
        let started = h
            .commands
            .add_auth_request(
                &h.ctx,
                NewAuthRequest {
                    requires_consent: true,
                    ..request()
                },
            )
            .await
            .unwrap();
        let id = started.id().unwrap().to_string();
        assert_eq!(started.step(), AuthRequestStep::Started);
        assert_eq!(started.root().resource_owner.as_ref().unwrap().as_str(), "instance");

        let named = h
            .commands
            .check_login_name(&h.ctx, &id, "ALICE")
            .await
            .unwrap();
        assert_eq!(named.user_id(), Some(alice.as_str()));
        assert_eq!(named.step(), AuthRequestStep::AwaitingCredential);

        let err = h
            .commands
            .check_password(&h.ctx, &id, "wrong-password")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let checked = h
            .commands
            .check_password(&h.ctx, &id, PASSWORD)
            .await
            .unwrap();
        assert_eq!(checked.password_failures(), 1);
        assert_eq!(checked.step(), AuthRequestStep::AwaitingConsent);

        let consented = h.commands.give_consent(&h.ctx, &id).await.unwrap();
        assert_eq!(consented.step(), AuthRequestStep::Completed);

        let issued = h.commands.issue_code(&h.ctx, &id).await.unwrap();
        assert_eq!(issued.code(), Some(CODE));
        assert_eq!(
            kind(h.commands.issue_code(&h.ctx, &id).await),
            ErrorKind::PreconditionFailed
        );

        h.sync().await;
        let projected = h.commands.queries().auth_request_by_id(&id).await.unwrap();
        assert_eq!(projected.code(), Some(CODE));
    }

    #[tokio::test]
    async fn password_attempts_are_bounded() {
        let (h, _) = with_alice().await;
        let id = h
            .commands
            .add_auth_request(&h.ctx, request())
            .await
            .unwrap()
            .id()
            .unwrap()
            .to_string();
        h.commands
            .check_login_name(&h.ctx, &id, "alice")
            .await
            .unwrap();

        for _ in 0..config().max_password_attempts {
            h.commands
                .check_password(&h.ctx, &id, "wrong-password")
                .await
                .unwrap_err();
        }

        let request = h
            .commands
            .handler()
            .load::<domain::AuthRequest>(&AggregateId::from(id.as_str()))
            .await
            .unwrap();
        assert_eq!(request.step(), AuthRequestStep::Failed);
        assert_eq!(
            kind(h.commands.check_password(&h.ctx, &id, PASSWORD).await),
            ErrorKind::PreconditionFailed
        );
    }

    #[tokio::test]
    async fn locked_users_cannot_check_passwords() {
        let (h, alice) = with_alice().await;
        let id = h
            .commands
            .add_auth_request(&h.ctx, request())
            .await
            .unwrap()
            .id()
            .unwrap()
            .to_string();
        h.commands.select_user(&h.ctx, &id, &alice).await.unwrap();
        h.commands.lock_user(&h.ctx, &alice).await.unwrap();

        let err = h
            .commands
            .check_password(&h.ctx, &id, PASSWORD)
            .await
            .unwrap_err();
        assert_eq!(err.message_key(), "Errors.User.Locked");
    }

    #[tokio::test]
    async fn second_factor_is_verified() {
        let (h, alice) = with_alice().await;
        let commands = h.commands.clone().with_second_factor_verifier(Arc::new(
            StaticSecondFactorVerifier::new().with_code(alice.clone(), "123456"),
        ));
        let id = commands
            .add_auth_request(
                &h.ctx,
                NewAuthRequest {
                    requires_second_factor: true,
                    ..request()
                },
            )
            .await
            .unwrap()
            .id()
            .unwrap()
            .to_string();
        commands.check_login_name(&h.ctx, &id, "alice").await.unwrap();
        let awaiting = commands.check_password(&h.ctx, &id, PASSWORD).await.unwrap();
        assert_eq!(awaiting.step(), AuthRequestStep::AwaitingSecondFactor);

        assert_eq!(
            kind(commands.check_second_factor(&h.ctx, &id, "000000").await),
            ErrorKind::InvalidArgument
        );
        let done = commands
            .check_second_factor(&h.ctx, &id, "123456")
            .await
            .unwrap();
        assert_eq!(done.step(), AuthRequestStep::Completed);
    }

    #[tokio::test]
    async fn selection_can_be_cleared() {
        let (h, alice) = with_alice().await;
        let id = h
            .commands
            .add_auth_request(&h.ctx, request())
            .await
            .unwrap()
            .id()
            .unwrap()
            .to_string();

        let selected = h.commands.select_user(&h.ctx, &id, &alice).await.unwrap();
        assert_eq!(selected.login_name(), Some("alice"));
        assert_eq!(selected.step(), AuthRequestStep::AwaitingCredential);

        let cleared = h.commands.select_user(&h.ctx, &id, "0").await.unwrap();
        assert_eq!(cleared.user_id(), None);
        assert_eq!(cleared.step(), AuthRequestStep::AwaitingUsername);

        assert_eq!(
            kind(h.commands.select_user(&h.ctx, &id, "ghost").await),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn requested_org_limits_the_users() {
        let (h, _) = with_alice().await;
        let id = h
            .commands
            .add_auth_request(
                &h.ctx,
                NewAuthRequest {
                    requested_org_id: Some("org2".into()),
                    ..request()
                },
            )
            .await
            .unwrap()
            .id()
            .unwrap()
            .to_string();

        assert_eq!(
            kind(h.commands.check_login_name(&h.ctx, &id, "alice").await),
            ErrorKind::PreconditionFailed
        );
    }

    #[tokio::test]
    async fn failed_request_stays_failed() {
        let (h, _) = with_alice().await;
        let id = h
            .commands
            .add_auth_request(&h.ctx, request())
            .await
            .unwrap()
            .id()
            .unwrap()
            .to_string();

        let failed = h
            .commands
            .fail_auth_request(&h.ctx, &id, "user aborted")
            .await
            .unwrap();
        assert_eq!(failed.failure_reason(), Some("user aborted"));
        assert_eq!(
            kind(h.commands.check_login_name(&h.ctx, &id, "alice").await),
            ErrorKind::PreconditionFailed
        );
        assert_eq!(
            kind(h.commands.give_consent(&h.ctx, "unknown").await),
            ErrorKind::NotFound
        );
    }
}

mod login_as {
    use super::*;

    struct World {
        h: Harness,
        support: String,
        frank: String,
        alice: String,
        bob: String,
        carol: String,
        dave: String,
        erin: String,
    }

    async fn world() -> World {
        let h = Harness::new();
        h.org("default", "Default").await;
        h.org("org1", "Org").await;
        h.org("org2", "Partner").await;
        h.org("org3", "Other").await;
        let support = h.human("default", "support").await;
        let frank = h.human("org1", "frank").await;
        let alice = h.human("org1", "alice").await;
        let bob = h.human("org1", "bob").await;
        let carol = h.human("org1", "carol").await;
        let dave = h.human("org2", "dave").await;
        let erin = h.human("org3", "erin").await;
        h.commands
            .add_org_member(&h.ctx, "org1", &bob, &["ORG_USER_MANAGER".to_string()])
            .await
            .unwrap();
        h.commands
            .set_user_metadata(&h.ctx, &carol, LOGIN_AS, "on")
            .await
            .unwrap();
        h.commands
            .set_org_metadata(&h.ctx, "default", GRANTED_ORGS, "org2")
            .await
            .unwrap();
        h.sync().await;
        World {
            h,
            support,
            frank,
            alice,
            bob,
            carol,
            dave,
            erin,
        }
    }

    impl World {
        async fn request_as(&self, orig: &str, requested_org: Option<&str>) -> String {
            let id = self
                .h
                .commands
                .add_auth_request(
                    &self.h.ctx,
                    NewAuthRequest {
                        client_id: "console".into(),
                        redirect_uri: "https://console.tld/callback".into(),
                        requested_org_id: requested_org.map(str::to_string),
                        ..NewAuthRequest::default()
                    },
                )
                .await
                .unwrap()
                .id()
                .unwrap()
                .to_string();
            self.h
                .commands
                .select_user(&self.h.ctx, &id, orig)
                .await
                .unwrap();
            id
        }

        async fn login_as(
            &self,
            orig: &str,
            target: &str,
        ) -> Result<domain::AuthRequest, DomainError> {
            let id = self.request_as(orig, None).await;
            self.h.commands.check_login_as(&self.h.ctx, &id, target).await
        }
    }

    #[tokio::test]
    async fn unprivileged_user_of_the_same_org() {
        let w = world().await;
        let request = w.login_as(&w.frank, &w.alice).await.unwrap();

        assert_eq!(request.user_id(), Some(w.alice.as_str()));
        assert_eq!(request.orig_user_id(), Some(w.frank.as_str()));
        assert_eq!(request.step(), AuthRequestStep::Completed);
    }

    #[tokio::test]
    async fn privileged_targets_are_refused_and_recorded() {
        let w = world().await;

        let id = w.request_as(&w.frank, None).await;
        let err = w
            .h
            .commands
            .check_login_as(&w.h.ctx, &id, &w.bob)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        let request = w
            .h
            .commands
            .handler()
            .load::<domain::AuthRequest>(&AggregateId::from(id.as_str()))
            .await
            .unwrap();
        assert_eq!(request.step(), AuthRequestStep::Failed);

        assert_eq!(
            kind(w.login_as(&w.frank, &w.carol).await),
            ErrorKind::PermissionDenied
        );
    }

    #[tokio::test]
    async fn other_orgs_need_the_default_org() {
        let w = world().await;
        assert_eq!(
            kind(w.login_as(&w.frank, &w.dave).await),
            ErrorKind::PermissionDenied
        );
        w.login_as(&w.support, &w.dave).await.unwrap();
    }

    #[tokio::test]
    async fn requested_org_grants_other_orgs() {
        let w = world().await;

        let id = w.request_as(&w.support, Some("default")).await;
        w.h.commands
            .check_login_as(&w.h.ctx, &id, &w.dave)
            .await
            .unwrap();

        let id = w.request_as(&w.support, Some("default")).await;
        let err = w
            .h
            .commands
            .check_login_as(&w.h.ctx, &id, &w.erin)
            .await
            .unwrap_err();
        assert_eq!(err.message_key(), "Errors.AuthRequest.OrgNotGranted");
    }

    #[tokio::test]
    async fn lagging_read_model_is_retried() {
        let w = world().await;
        let late = w.h.human("org1", "late").await;
        let id = w.request_as(&w.frank, None).await;

        let err = w
            .h
            .commands
            .check_login_as(&w.h.ctx, &id, &late)
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let processor = Arc::clone(&w.h.processor);
        let catch_up = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            processor.run_catch_up().await.unwrap();
        });
        let slow_retry = CommandsConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                backoff: Duration::from_millis(50),
                timeout: Some(Duration::from_secs(5)),
            },
            ..config()
        };
        let patient = Commands::new(
            Arc::clone(&w.h.store),
            w.h.commands.queries().clone(),
            slow_retry,
        );
        let request = patient
            .check_login_as(&w.h.ctx, &id, &late)
            .await
            .unwrap();
        catch_up.await.unwrap();

        assert_eq!(request.user_id(), Some(late.as_str()));
    }
}

mod keys {
    use super::*;

    #[tokio::test]
    async fn published_keys_reach_the_keys_view() {
        let h = Harness::new();
        let details = h
            .commands
            .add_key_pair(
                &h.ctx,
                "RS256",
                KeyUsage::Signing,
                "-----BEGIN PUBLIC KEY-----",
                Utc::now() + chrono::Duration::hours(6),
            )
            .await
            .unwrap();
        assert_eq!(details.resource_owner.as_str(), "instance");
        h.sync().await;

        let key = h
            .commands
            .queries()
            .public_key_by_id(details.resource_id.as_str())
            .await
            .unwrap();
        assert_eq!(key.algorithm, "RS256");

        assert_eq!(
            kind(
                h.commands
                    .add_key_pair(
                        &h.ctx,
                        "RS256",
                        KeyUsage::Signing,
                        "key",
                        Utc::now() - chrono::Duration::hours(1),
                    )
                    .await
            ),
            ErrorKind::InvalidArgument
        );
    }
}
