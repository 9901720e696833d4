//! User aggregate implementation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, AggregateRoot, CheckOutcome, SnapshotCapable};
use crate::error::DomainError;
use crate::metadata::{self, MetadataRemovedData, MetadataSetData};

use super::events::{
    EmailChangedData, HumanAddedData, IdpLinkAddedData, InitialCodeAddedData, MachineAddedData,
    PasswordChangedData, UserRemovedData, UsernameChangedData,
};
use super::{
    Email, IdpLink, InitCode, MachineProfile, NewHuman, Password, Profile, UserEvent,
    UserState, UserType, validate_email,
};

/// User aggregate root.
///
/// A user is either a human, with profile, email, password and the
/// initialization flow, or a machine. Both share username, lifecycle,
/// IdP links and metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    root: AggregateRoot,
    user_type: Option<UserType>,
    username: String,
    state: UserState,
    /// Scope of the username claim, fixed when the user was added.
    user_login_must_be_domain: bool,
    profile: Option<Profile>,
    email: Option<Email>,
    machine: Option<MachineProfile>,
    init_code: Option<InitCode>,
    password: Option<Password>,
    /// Failed initialization checks since the last code was issued.
    init_check_failures: u32,
    idp_links: Vec<IdpLink>,
    metadata: BTreeMap<String, String>,
}

impl Aggregate for User {
    type Event = UserEvent;

    fn aggregate_type() -> &'static str {
        "user"
    }

    fn root(&self) -> &AggregateRoot {
        &self.root
    }

    fn root_mut(&mut self) -> &mut AggregateRoot {
        &mut self.root
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            UserEvent::HumanAdded(data) => self.apply_human_added(data),
            UserEvent::MachineAdded(data) => self.apply_machine_added(data),
            UserEvent::UsernameChanged(data) => self.username = data.username,
            UserEvent::HumanEmailChanged(data) => {
                self.email = Some(Email {
                    address: data.email,
                    verified: false,
                });
            }
            UserEvent::HumanEmailVerified => {
                if let Some(email) = self.email.as_mut() {
                    email.verified = true;
                }
            }
            UserEvent::HumanInitialCodeAdded(data) => {
                self.init_code = Some(InitCode::new(data.code, data.created_at, data.expiry_secs));
                self.init_check_failures = 0;
                self.state = UserState::Initial;
            }
            UserEvent::HumanInitialCodeSent => {}
            UserEvent::HumanInitializedCheckSucceeded => {
                self.init_code = None;
                self.init_check_failures = 0;
                self.state = UserState::Active;
            }
            UserEvent::HumanInitializedCheckFailed => self.init_check_failures += 1,
            UserEvent::HumanPasswordChanged(data) => {
                self.password = Some(Password {
                    hash: data.password_hash,
                    change_required: data.change_required,
                });
            }
            UserEvent::UserDeactivated => self.state = UserState::Inactive,
            UserEvent::UserReactivated | UserEvent::UserUnlocked => self.state = UserState::Active,
            UserEvent::UserLocked => self.state = UserState::Locked,
            UserEvent::UserRemoved(_) => self.state = UserState::Removed,
            UserEvent::IdpLinkAdded(data) => self.idp_links.push(IdpLink {
                idp_id: data.idp_id,
                external_user_id: data.external_user_id,
                display_name: data.display_name,
            }),
            UserEvent::IdpLinkRemoved(link) => self.idp_links.retain(|l| {
                l.idp_id != link.idp_id || l.external_user_id != link.external_user_id
            }),
            UserEvent::MetadataSet(data) => {
                self.metadata.insert(data.key, data.value);
            }
            UserEvent::MetadataRemoved(data) => {
                self.metadata.remove(&data.key);
            }
        }
    }

    fn exists(&self) -> bool {
        self.state.exists()
    }
}

impl SnapshotCapable for User {
    fn snapshot_interval() -> usize {
        50
    }
}

// Query methods
impl User {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn state(&self) -> UserState {
        self.state
    }

    pub fn user_type(&self) -> Option<UserType> {
        self.user_type
    }

    pub fn user_login_must_be_domain(&self) -> bool {
        self.user_login_must_be_domain
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn email(&self) -> Option<&Email> {
        self.email.as_ref()
    }

    pub fn machine(&self) -> Option<&MachineProfile> {
        self.machine.as_ref()
    }

    pub fn init_code(&self) -> Option<&InitCode> {
        self.init_code.as_ref()
    }

    pub fn init_check_failures(&self) -> u32 {
        self.init_check_failures
    }

    pub fn password(&self) -> Option<&Password> {
        self.password.as_ref()
    }

    pub fn idp_links(&self) -> &[IdpLink] {
        &self.idp_links
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

// Command methods
impl User {
    /// Adds a human user with every event its creation implies: the optional
    /// email verification, the initial password and the initialization code.
    pub fn add_human(
        &self,
        new: NewHuman,
        user_login_must_be_domain: bool,
    ) -> Result<Vec<UserEvent>, DomainError> {
        let username = validate_username(&new.username)?;
        let profile = new.profile.normalized()?;
        let email = validate_email(&new.email)?;
        self.ensure_new()?;

        let mut events = vec![UserEvent::HumanAdded(HumanAddedData {
            username,
            first_name: profile.first_name,
            last_name: profile.last_name,
            display_name: profile.display_name,
            preferred_language: profile.preferred_language,
            email,
            user_login_must_be_domain,
        })];
        if new.email_verified {
            events.push(UserEvent::HumanEmailVerified);
        }
        if let Some(password) = new.password {
            events.push(password_changed(password)?);
        }
        if let Some(code) = new.init_code {
            events.push(code_added(code));
        }
        Ok(events)
    }

    pub fn add_machine(
        &self,
        username: &str,
        profile: MachineProfile,
        user_login_must_be_domain: bool,
    ) -> Result<Vec<UserEvent>, DomainError> {
        let username = validate_username(username)?;
        if profile.name.trim().is_empty() {
            return Err(DomainError::invalid_argument(
                "COMMAND-bm9Ds",
                "Errors.User.Invalid",
            ));
        }
        self.ensure_new()?;
        Ok(vec![UserEvent::MachineAdded(MachineAddedData {
            username,
            name: profile.name.trim().to_string(),
            description: profile.description,
            user_login_must_be_domain,
        })])
    }

    pub fn change_username(&self, username: &str) -> Result<Vec<UserEvent>, DomainError> {
        let username = validate_username(username)?;
        self.ensure_exists()?;
        if self.username == username {
            return Err(DomainError::precondition_failed(
                "COMMAND-6m9gs",
                "Errors.User.UsernameNotChanged",
            ));
        }
        Ok(vec![UserEvent::UsernameChanged(UsernameChangedData {
            old_username: self.username.clone(),
            username,
            user_login_must_be_domain: self.user_login_must_be_domain,
        })])
    }

    pub fn change_email(&self, email: &str) -> Result<Vec<UserEvent>, DomainError> {
        let email = validate_email(email)?;
        self.ensure_human()?;
        if self.email.as_ref().is_some_and(|e| e.address == email) {
            return Err(DomainError::precondition_failed(
                "COMMAND-A8dd3",
                "Errors.User.Email.NotChanged",
            ));
        }
        Ok(vec![UserEvent::HumanEmailChanged(EmailChangedData { email })])
    }

    pub fn verify_email(&self) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_human()?;
        if self.email.as_ref().is_some_and(|e| e.verified) {
            return Err(DomainError::precondition_failed(
                "COMMAND-3M9ds",
                "Errors.User.Email.AlreadyVerified",
            ));
        }
        Ok(vec![UserEvent::HumanEmailVerified])
    }

    /// Issues a fresh initialization code, optionally to a new address.
    pub fn resend_initial_mail(
        &self,
        email: Option<&str>,
        code: InitCode,
    ) -> Result<Vec<UserEvent>, DomainError> {
        let email = email
            .filter(|e| !e.trim().is_empty())
            .map(validate_email)
            .transpose()?;
        if !self.exists() {
            return Err(DomainError::not_found("COMMAND-2M9df", "Errors.User.NotFound"));
        }
        self.ensure_human()?;
        if self.state != UserState::Initial {
            return Err(DomainError::precondition_failed(
                "COMMAND-2M9sd",
                "Errors.User.AlreadyInitialised",
            ));
        }

        let mut events = Vec::new();
        if let Some(email) = email
            && self.email.as_ref().is_none_or(|e| e.address != email)
        {
            events.push(UserEvent::HumanEmailChanged(EmailChangedData { email }));
        }
        events.push(code_added(code));
        Ok(events)
    }

    /// Records that the initialization code was delivered.
    pub fn initial_code_sent(&self) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists()?;
        if self.init_code.is_none() {
            return Err(DomainError::not_found(
                "COMMAND-9jeFF",
                "Errors.User.Code.NotFound",
            ));
        }
        Ok(vec![UserEvent::HumanInitialCodeSent])
    }

    /// Checks an initialization code.
    ///
    /// A wrong or expired code records a failed check. A valid one
    /// activates the user, verifies the email if needed and optionally sets
    /// the first password.
    pub fn verify_init_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
        password: Option<Password>,
    ) -> Result<CheckOutcome<UserEvent>, DomainError> {
        if code.trim().is_empty() {
            return Err(DomainError::invalid_argument(
                "COMMAND-mkM9f",
                "Errors.User.Code.Empty",
            ));
        }
        self.ensure_human()?;
        let Some(init_code) = &self.init_code else {
            return Err(DomainError::not_found(
                "COMMAND-spo0W",
                "Errors.User.Code.NotFound",
            ));
        };

        let failure = if init_code.is_expired(now) {
            Some(DomainError::invalid_argument("CODE-QvUQ4P", "Errors.User.Code.Expired"))
        } else if init_code.code != code.trim() {
            Some(DomainError::invalid_argument("CODE-woT0xc", "Errors.User.Code.Invalid"))
        } else {
            None
        };
        if let Some(error) = failure {
            return Ok(CheckOutcome::Failed {
                events: vec![UserEvent::HumanInitializedCheckFailed],
                error,
            });
        }

        let mut events = vec![UserEvent::HumanInitializedCheckSucceeded];
        if !self.email.as_ref().is_some_and(|e| e.verified) {
            events.push(UserEvent::HumanEmailVerified);
        }
        if let Some(password) = password {
            events.push(password_changed(password)?);
        }
        Ok(CheckOutcome::Passed(events))
    }

    pub fn change_password(&self, password: Password) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_human()?;
        Ok(vec![password_changed(password)?])
    }

    pub fn deactivate(&self) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists()?;
        if self.state == UserState::Initial {
            return Err(DomainError::precondition_failed(
                "COMMAND-gvx4kct9r2",
                "Errors.User.CantDeactivateInitial",
            ));
        }
        if !self.state.can_deactivate() {
            return Err(DomainError::precondition_failed(
                "COMMAND-5M0sf",
                "Errors.User.AlreadyInactive",
            ));
        }
        Ok(vec![UserEvent::UserDeactivated])
    }

    pub fn reactivate(&self) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists()?;
        if !self.state.can_reactivate() {
            return Err(DomainError::precondition_failed(
                "COMMAND-6M0sf",
                "Errors.User.NotInactive",
            ));
        }
        Ok(vec![UserEvent::UserReactivated])
    }

    pub fn lock(&self) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists()?;
        if !self.state.can_lock() {
            return Err(DomainError::precondition_failed(
                "COMMAND-3NN8v",
                "Errors.User.ShouldBeActiveOrInitial",
            ));
        }
        Ok(vec![UserEvent::UserLocked])
    }

    pub fn unlock(&self) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists()?;
        if !self.state.can_unlock() {
            return Err(DomainError::precondition_failed(
                "COMMAND-4M0ds",
                "Errors.User.NotLocked",
            ));
        }
        Ok(vec![UserEvent::UserUnlocked])
    }

    /// Removes the user and releases its username and IdP link claims.
    pub fn remove(&self) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists()?;
        Ok(vec![UserEvent::UserRemoved(UserRemovedData {
            username: self.username.clone(),
            user_login_must_be_domain: self.user_login_must_be_domain,
            idp_links: self.idp_links.iter().map(IdpLink::to_ref).collect(),
        })])
    }

    pub fn add_idp_link(
        &self,
        idp_id: &str,
        external_user_id: &str,
        display_name: &str,
    ) -> Result<Vec<UserEvent>, DomainError> {
        if idp_id.trim().is_empty() || external_user_id.trim().is_empty() {
            return Err(DomainError::invalid_argument(
                "COMMAND-4M9ds",
                "Errors.User.ExternalIDP.Invalid",
            ));
        }
        self.ensure_exists()?;
        if self.find_idp_link(idp_id, external_user_id).is_some() {
            return Err(DomainError::already_exists(
                "COMMAND-6m9Kd",
                "Errors.User.ExternalIDP.AlreadyExists",
            ));
        }
        Ok(vec![UserEvent::IdpLinkAdded(IdpLinkAddedData {
            idp_id: idp_id.to_string(),
            external_user_id: external_user_id.to_string(),
            display_name: display_name.to_string(),
        })])
    }

    pub fn remove_idp_link(
        &self,
        idp_id: &str,
        external_user_id: &str,
    ) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists()?;
        let link = self
            .find_idp_link(idp_id, external_user_id)
            .ok_or_else(|| {
                DomainError::not_found("COMMAND-1M9xR", "Errors.User.ExternalIDP.NotFound")
            })?;
        Ok(vec![UserEvent::IdpLinkRemoved(link.to_ref())])
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<Vec<UserEvent>, DomainError> {
        metadata::check_set(&self.metadata, key, value)?;
        self.ensure_exists()?;
        Ok(vec![UserEvent::MetadataSet(MetadataSetData {
            key: key.to_string(),
            value: value.to_string(),
        })])
    }

    pub fn remove_metadata(&self, key: &str) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists()?;
        metadata::check_remove(&self.metadata, key)?;
        Ok(vec![UserEvent::MetadataRemoved(MetadataRemovedData {
            key: key.to_string(),
        })])
    }

    fn ensure_new(&self) -> Result<(), DomainError> {
        if self.state == UserState::Unspecified {
            Ok(())
        } else {
            Err(DomainError::already_exists(
                "COMMAND-k2unb",
                "Errors.User.AlreadyExisting",
            ))
        }
    }

    fn ensure_exists(&self) -> Result<(), DomainError> {
        if self.state.exists() {
            Ok(())
        } else {
            Err(DomainError::not_found("COMMAND-uv2Hs", "Errors.User.NotFound"))
        }
    }

    fn ensure_human(&self) -> Result<(), DomainError> {
        self.ensure_exists()?;
        if self.user_type == Some(UserType::Human) {
            Ok(())
        } else {
            Err(DomainError::precondition_failed(
                "COMMAND-6M9sf",
                "Errors.User.NotHuman",
            ))
        }
    }

    fn find_idp_link(&self, idp_id: &str, external_user_id: &str) -> Option<&IdpLink> {
        self.idp_links
            .iter()
            .find(|l| l.idp_id == idp_id && l.external_user_id == external_user_id)
    }
}

// Apply event helpers
impl User {
    fn apply_human_added(&mut self, data: HumanAddedData) {
        self.user_type = Some(UserType::Human);
        self.username = data.username;
        self.user_login_must_be_domain = data.user_login_must_be_domain;
        self.profile = Some(Profile {
            first_name: data.first_name,
            last_name: data.last_name,
            display_name: data.display_name,
            preferred_language: data.preferred_language,
        });
        self.email = Some(Email {
            address: data.email,
            verified: false,
        });
        self.state = UserState::Active;
    }

    fn apply_machine_added(&mut self, data: MachineAddedData) {
        self.user_type = Some(UserType::Machine);
        self.username = data.username;
        self.user_login_must_be_domain = data.user_login_must_be_domain;
        self.machine = Some(MachineProfile {
            name: data.name,
            description: data.description,
        });
        self.state = UserState::Active;
    }
}

fn validate_username(username: &str) -> Result<String, DomainError> {
    let username = username.trim();
    if username.is_empty() || username.contains(char::is_whitespace) {
        return Err(DomainError::invalid_argument(
            "COMMAND-4M0sc",
            "Errors.User.Username.Invalid",
        ));
    }
    Ok(username.to_string())
}

fn password_changed(password: Password) -> Result<UserEvent, DomainError> {
    if password.hash.is_empty() {
        return Err(DomainError::invalid_argument(
            "COMMAND-3M0fs",
            "Errors.User.Password.Empty",
        ));
    }
    Ok(UserEvent::HumanPasswordChanged(PasswordChangedData {
        password_hash: password.hash,
        change_required: password.change_required,
    }))
}

fn code_added(code: InitCode) -> UserEvent {
    UserEvent::HumanInitialCodeAdded(InitialCodeAddedData {
        code: code.code,
        expiry_secs: code.expiry_secs,
        created_at: code.created_at,
    })
}
