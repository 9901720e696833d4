//! Authentication request aggregate implementation.

use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, AggregateRoot, CheckOutcome, SnapshotCapable};
use crate::error::DomainError;

use super::events::{
    AuthRequestAddedData, AuthRequestFailedData, CodeAddedData, LoginAsCheckedData,
    PrivilegeCheckFailedData, SelectedUserData,
};
use super::{AuthRequestEvent, AuthRequestStep, LoginAsCheck};

/// Value passed to `select_user` to go back to the username prompt.
pub const CLEAR_SELECTION: &str = "0";

/// Parameters of a new authentication request.
#[derive(Debug, Clone, Default)]
pub struct NewAuthRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub requested_org_id: Option<String>,
    pub login_hint: Option<String>,
    pub requires_second_factor: bool,
    pub requires_consent: bool,
    pub max_password_attempts: u32,
}

/// A user resolved by the caller for a selection or login name check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedUser {
    pub user_id: String,
    pub resource_owner: String,
    pub login_name: String,
}

/// Authentication request aggregate root.
///
/// The current step is derived by folding events; the flags recorded when
/// the request was added decide what follows the credential check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthRequest {
    root: AggregateRoot,
    step: AuthRequestStep,
    client_id: String,
    redirect_uri: String,
    scopes: Vec<String>,
    requested_org_id: Option<String>,
    login_hint: Option<String>,
    requires_second_factor: bool,
    requires_consent: bool,
    max_password_attempts: u32,
    user_id: Option<String>,
    user_resource_owner: Option<String>,
    login_name: Option<String>,
    orig_user_id: Option<String>,
    password_failures: u32,
    code: Option<String>,
    failure_reason: Option<String>,
}

impl Aggregate for AuthRequest {
    type Event = AuthRequestEvent;

    fn aggregate_type() -> &'static str {
        "auth_request"
    }

    fn root(&self) -> &AggregateRoot {
        &self.root
    }

    fn root_mut(&mut self) -> &mut AggregateRoot {
        &mut self.root
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            AuthRequestEvent::AuthRequestAdded(data) => self.apply_added(data),
            AuthRequestEvent::UserSelectionCleared => {
                self.user_id = None;
                self.user_resource_owner = None;
                self.login_name = None;
                self.orig_user_id = None;
                self.password_failures = 0;
                self.step = AuthRequestStep::AwaitingUsername;
            }
            AuthRequestEvent::UserSelected(data) | AuthRequestEvent::LoginNameChecked(data) => {
                self.user_id = Some(data.user_id);
                self.user_resource_owner = Some(data.user_resource_owner);
                self.login_name = Some(data.login_name);
                self.orig_user_id = None;
                self.password_failures = 0;
                self.step = AuthRequestStep::AwaitingCredential;
            }
            AuthRequestEvent::LoginAsChecked(data) => {
                self.user_id = Some(data.user_id);
                self.user_resource_owner = Some(data.user_resource_owner);
                self.login_name = Some(data.login_name);
                self.orig_user_id = Some(data.orig_user_id);
                self.step = self.step_after_credential();
            }
            AuthRequestEvent::PrivilegeCheckFailed(data) => {
                self.failure_reason = Some(data.reason);
                self.step = AuthRequestStep::Failed;
            }
            AuthRequestEvent::PasswordChecked => self.step = self.step_after_credential(),
            AuthRequestEvent::PasswordCheckFailed => {
                self.password_failures += 1;
                if self.max_password_attempts > 0
                    && self.password_failures >= self.max_password_attempts
                {
                    self.failure_reason = Some("password attempts exhausted".to_string());
                    self.step = AuthRequestStep::Failed;
                }
            }
            AuthRequestEvent::SecondFactorChecked => self.step = self.step_after_second_factor(),
            AuthRequestEvent::SecondFactorCheckFailed => {}
            AuthRequestEvent::ConsentGiven => self.step = AuthRequestStep::Completed,
            AuthRequestEvent::CodeAdded(data) => self.code = Some(data.code),
            AuthRequestEvent::AuthRequestFailed(data) => {
                self.failure_reason = Some(data.reason);
                self.step = AuthRequestStep::Failed;
            }
        }
    }

    fn exists(&self) -> bool {
        self.step.exists()
    }
}

impl SnapshotCapable for AuthRequest {}

// Query methods
impl AuthRequest {
    pub fn step(&self) -> AuthRequestStep {
        self.step
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn requested_org_id(&self) -> Option<&str> {
        self.requested_org_id.as_deref()
    }

    pub fn login_hint(&self) -> Option<&str> {
        self.login_hint.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn user_resource_owner(&self) -> Option<&str> {
        self.user_resource_owner.as_deref()
    }

    pub fn login_name(&self) -> Option<&str> {
        self.login_name.as_deref()
    }

    pub fn orig_user_id(&self) -> Option<&str> {
        self.orig_user_id.as_deref()
    }

    pub fn password_failures(&self) -> u32 {
        self.password_failures
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }
}

// Command methods
impl AuthRequest {
    pub fn add(&self, request: NewAuthRequest) -> Result<Vec<AuthRequestEvent>, DomainError> {
        if request.client_id.trim().is_empty() || request.redirect_uri.trim().is_empty() {
            return Err(DomainError::invalid_argument(
                "AUTH-3Kvz9",
                "Errors.AuthRequest.Invalid",
            ));
        }
        if self.exists() {
            return Err(DomainError::already_exists(
                "AUTH-9Nd3s",
                "Errors.AuthRequest.AlreadyExists",
            ));
        }
        Ok(vec![AuthRequestEvent::AuthRequestAdded(AuthRequestAddedData {
            client_id: request.client_id,
            redirect_uri: request.redirect_uri,
            scopes: request.scopes,
            requested_org_id: request.requested_org_id.filter(|id| !id.is_empty()),
            login_hint: request.login_hint.filter(|hint| !hint.is_empty()),
            requires_second_factor: request.requires_second_factor,
            requires_consent: request.requires_consent,
            max_password_attempts: request.max_password_attempts,
        })])
    }

    /// Clears the selection when `user` is None.
    pub fn select_user(
        &self,
        user: Option<SelectedUser>,
    ) -> Result<Vec<AuthRequestEvent>, DomainError> {
        self.ensure_step(self.step.can_select_user())?;
        match user {
            None => Ok(vec![AuthRequestEvent::UserSelectionCleared]),
            Some(user) => {
                self.ensure_requested_org(&user.resource_owner)?;
                Ok(vec![AuthRequestEvent::UserSelected(selected(user))])
            }
        }
    }

    pub fn check_login_name(
        &self,
        user: SelectedUser,
    ) -> Result<Vec<AuthRequestEvent>, DomainError> {
        self.ensure_step(self.step.can_check_login_name())?;
        self.ensure_requested_org(&user.resource_owner)?;
        Ok(vec![AuthRequestEvent::LoginNameChecked(selected(user))])
    }

    /// Switches the request to the target user on behalf of the selected
    /// user, whose authenticated session stands in for the credential.
    pub fn check_login_as(
        &self,
        check: &LoginAsCheck,
    ) -> Result<CheckOutcome<AuthRequestEvent>, DomainError> {
        self.ensure_step(self.step.can_check_credential())?;
        if self.user_id.as_deref() != Some(check.orig_user_id.as_str()) {
            return Err(DomainError::permission_denied(
                "AUTH-0rIgU",
                "Errors.AuthRequest.UserNotSelected",
            ));
        }

        if let Some(error) = check.violation() {
            return Ok(CheckOutcome::Failed {
                events: vec![AuthRequestEvent::PrivilegeCheckFailed(
                    PrivilegeCheckFailedData {
                        user_id: check.target_user_id.clone(),
                        reason: error.message_key().to_string(),
                    },
                )],
                error,
            });
        }

        Ok(CheckOutcome::Passed(vec![AuthRequestEvent::LoginAsChecked(
            LoginAsCheckedData {
                user_id: check.target_user_id.clone(),
                user_resource_owner: check.target_resource_owner.clone(),
                login_name: check.target_login_name.clone(),
                orig_user_id: check.orig_user_id.clone(),
            },
        )]))
    }

    /// Records the result of a password verification done by the caller.
    pub fn check_password(
        &self,
        passed: bool,
    ) -> Result<CheckOutcome<AuthRequestEvent>, DomainError> {
        self.ensure_step(self.step.can_check_credential())?;
        if passed {
            Ok(CheckOutcome::Passed(vec![AuthRequestEvent::PasswordChecked]))
        } else {
            Ok(CheckOutcome::Failed {
                events: vec![AuthRequestEvent::PasswordCheckFailed],
                error: DomainError::invalid_argument(
                    "COMMAND-3M0fs",
                    "Errors.User.Password.Invalid",
                ),
            })
        }
    }

    pub fn check_second_factor(
        &self,
        passed: bool,
    ) -> Result<CheckOutcome<AuthRequestEvent>, DomainError> {
        self.ensure_step(self.step.can_check_second_factor())?;
        if passed {
            Ok(CheckOutcome::Passed(vec![
                AuthRequestEvent::SecondFactorChecked,
            ]))
        } else {
            Ok(CheckOutcome::Failed {
                events: vec![AuthRequestEvent::SecondFactorCheckFailed],
                error: DomainError::invalid_argument("AUTH-2fAcK", "Errors.User.Mfa.Invalid"),
            })
        }
    }

    pub fn give_consent(&self) -> Result<Vec<AuthRequestEvent>, DomainError> {
        self.ensure_step(self.step.can_give_consent())?;
        Ok(vec![AuthRequestEvent::ConsentGiven])
    }

    /// Issues the authorization code of a completed request, once.
    pub fn issue_code(&self, code: &str) -> Result<Vec<AuthRequestEvent>, DomainError> {
        if code.is_empty() {
            return Err(DomainError::invalid_argument(
                "AUTH-c0dEe",
                "Errors.AuthRequest.Code.Invalid",
            ));
        }
        self.ensure_step(self.step == AuthRequestStep::Completed)?;
        if self.code.is_some() {
            return Err(DomainError::precondition_failed(
                "AUTH-c0dE2",
                "Errors.AuthRequest.Code.AlreadyIssued",
            ));
        }
        Ok(vec![AuthRequestEvent::CodeAdded(CodeAddedData {
            code: code.to_string(),
        })])
    }

    pub fn fail(&self, reason: &str) -> Result<Vec<AuthRequestEvent>, DomainError> {
        self.ensure_step(!self.step.is_terminal())?;
        Ok(vec![AuthRequestEvent::AuthRequestFailed(
            AuthRequestFailedData {
                reason: reason.to_string(),
            },
        )])
    }

    fn ensure_step(&self, allowed: bool) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found(
                "AUTH-s7jf3",
                "Errors.AuthRequest.NotFound",
            ));
        }
        if !allowed {
            return Err(DomainError::precondition_failed(
                "AUTH-7Mssd",
                "Errors.AuthRequest.InvalidStep",
            ));
        }
        Ok(())
    }

    fn ensure_requested_org(&self, resource_owner: &str) -> Result<(), DomainError> {
        match self.requested_org_id.as_deref() {
            Some(requested) if requested != resource_owner => Err(
                DomainError::precondition_failed("AUTH-r3qOr", "Errors.User.NotAllowedOrg"),
            ),
            _ => Ok(()),
        }
    }
}

// Apply event helpers
impl AuthRequest {
    fn apply_added(&mut self, data: AuthRequestAddedData) {
        self.client_id = data.client_id;
        self.redirect_uri = data.redirect_uri;
        self.scopes = data.scopes;
        self.requested_org_id = data.requested_org_id;
        self.login_hint = data.login_hint;
        self.requires_second_factor = data.requires_second_factor;
        self.requires_consent = data.requires_consent;
        self.max_password_attempts = data.max_password_attempts;
        self.step = AuthRequestStep::Started;
    }

    fn step_after_credential(&self) -> AuthRequestStep {
        if self.requires_second_factor {
            AuthRequestStep::AwaitingSecondFactor
        } else {
            self.step_after_second_factor()
        }
    }

    fn step_after_second_factor(&self) -> AuthRequestStep {
        if self.requires_consent {
            AuthRequestStep::AwaitingConsent
        } else {
            AuthRequestStep::Completed
        }
    }
}

fn selected(user: SelectedUser) -> SelectedUserData {
    SelectedUserData {
        user_id: user.user_id,
        user_resource_owner: user.resource_owner,
        login_name: user.login_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn started(second_factor: bool, consent: bool) -> AuthRequest {
        let mut request = AuthRequest::default();
        let events = request
            .add(NewAuthRequest {
                client_id: "client".into(),
                redirect_uri: "https://app/cb".into(),
                requires_second_factor: second_factor,
                requires_consent: consent,
                max_password_attempts: 2,
                ..Default::default()
            })
            .unwrap();
        request.apply_events(events);
        request
    }

    fn alice() -> SelectedUser {
        SelectedUser {
            user_id: "alice".into(),
            resource_owner: "org1".into(),
            login_name: "alice@org1.tld".into(),
        }
    }

    fn passed(outcome: CheckOutcome<AuthRequestEvent>) -> Vec<AuthRequestEvent> {
        match outcome {
            CheckOutcome::Passed(events) => events,
            CheckOutcome::Failed { error, .. } => panic!("check failed: {error}"),
        }
    }

    #[test]
    fn full_flow_visits_every_step() {
        let mut request = started(true, true);
        assert_eq!(request.step(), AuthRequestStep::Started);

        request.apply_events(request.select_user(None).unwrap());
        assert_eq!(request.step(), AuthRequestStep::AwaitingUsername);

        request.apply_events(request.check_login_name(alice()).unwrap());
        assert_eq!(request.step(), AuthRequestStep::AwaitingCredential);

        request.apply_events(passed(request.check_password(true).unwrap()));
        assert_eq!(request.step(), AuthRequestStep::AwaitingSecondFactor);

        request.apply_events(passed(request.check_second_factor(true).unwrap()));
        assert_eq!(request.step(), AuthRequestStep::AwaitingConsent);

        request.apply_events(request.give_consent().unwrap());
        assert_eq!(request.step(), AuthRequestStep::Completed);

        request.apply_events(request.issue_code("code-1").unwrap());
        assert_eq!(request.code(), Some("code-1"));
        assert_eq!(
            request.issue_code("code-2").unwrap_err().kind(),
            ErrorKind::PreconditionFailed
        );
    }

    #[test]
    fn steps_cannot_be_skipped() {
        let request = started(false, true);
        assert_eq!(
            request.give_consent().unwrap_err().kind(),
            ErrorKind::PreconditionFailed
        );
        assert_eq!(
            request.check_password(true).unwrap_err().kind(),
            ErrorKind::PreconditionFailed
        );
        assert_eq!(
            request.issue_code("c").unwrap_err().kind(),
            ErrorKind::PreconditionFailed
        );
    }

    #[test]
    fn password_without_extra_steps_completes() {
        let mut request = started(false, false);
        request.apply_events(request.select_user(Some(alice())).unwrap());
        request.apply_events(passed(request.check_password(true).unwrap()));
        assert_eq!(request.step(), AuthRequestStep::Completed);
    }

    #[test]
    fn exhausted_password_attempts_fail_the_request() {
        let mut request = started(false, false);
        request.apply_events(request.check_login_name(alice()).unwrap());

        for _ in 0..2 {
            match request.check_password(false).unwrap() {
                CheckOutcome::Failed { events, error } => {
                    assert_eq!(error.kind(), ErrorKind::InvalidArgument);
                    request.apply_events(events);
                }
                CheckOutcome::Passed(_) => panic!("wrong password passed"),
            }
        }

        assert_eq!(request.step(), AuthRequestStep::Failed);
        assert_eq!(
            request.check_password(true).unwrap_err().kind(),
            ErrorKind::PreconditionFailed
        );
    }

    #[test]
    fn requested_org_restricts_users() {
        let mut request = AuthRequest::default();
        request.apply_events(
            request
                .add(NewAuthRequest {
                    client_id: "client".into(),
                    redirect_uri: "https://app/cb".into(),
                    requested_org_id: Some("org2".into()),
                    ..Default::default()
                })
                .unwrap(),
        );
        assert_eq!(
            request.check_login_name(alice()).unwrap_err().kind(),
            ErrorKind::PreconditionFailed
        );
    }

    #[test]
    fn login_as_replaces_user_and_advances() {
        let mut request = started(false, false);
        request.apply_events(request.select_user(Some(alice())).unwrap());

        let check = LoginAsCheck {
            orig_user_id: "alice".into(),
            orig_resource_owner: "org1".into(),
            target_user_id: "bob".into(),
            target_resource_owner: "org1".into(),
            target_login_name: "bob@org1.tld".into(),
            default_org_id: "default".into(),
            ..Default::default()
        };
        request.apply_events(passed(request.check_login_as(&check).unwrap()));

        assert_eq!(request.user_id(), Some("bob"));
        assert_eq!(request.orig_user_id(), Some("alice"));
        assert_eq!(request.step(), AuthRequestStep::Completed);
    }

    #[test]
    fn privileged_target_fails_the_request() {
        let mut request = started(false, false);
        request.apply_events(request.select_user(Some(alice())).unwrap());

        let check = LoginAsCheck {
            orig_user_id: "alice".into(),
            orig_resource_owner: "org1".into(),
            target_user_id: "admin".into(),
            target_resource_owner: "org1".into(),
            target_roles: vec!["ORG_OWNER".into()],
            default_org_id: "default".into(),
            ..Default::default()
        };
        match request.check_login_as(&check).unwrap() {
            CheckOutcome::Failed { events, error } => {
                assert_eq!(error.kind(), ErrorKind::PermissionDenied);
                request.apply_events(events);
            }
            CheckOutcome::Passed(_) => panic!("privileged target accepted"),
        }
        assert_eq!(request.step(), AuthRequestStep::Failed);
        assert_eq!(request.failure_reason(), Some("Selected user has privileges"));
    }

    #[test]
    fn missing_request_is_not_found() {
        let err = AuthRequest::default().give_consent().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
