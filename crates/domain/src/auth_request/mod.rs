//! Authentication request aggregate and the login-as rules.

mod aggregate;
mod events;
mod login_as;
mod state;

pub use aggregate::{AuthRequest, CLEAR_SELECTION, NewAuthRequest, SelectedUser};
pub use events::{
    AuthRequestAddedData, AuthRequestEvent, AuthRequestFailedData, CodeAddedData,
    LoginAsCheckedData, PrivilegeCheckFailedData, SelectedUserData,
};
pub use login_as::LoginAsCheck;
pub use state::AuthRequestStep;
