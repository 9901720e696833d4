//! User aggregate and related types.

mod aggregate;
mod events;
mod state;
mod value_objects;

pub use aggregate::User;
pub use events::{
    EmailChangedData, HumanAddedData, IdpLinkAddedData, InitialCodeAddedData, MachineAddedData,
    PasswordChangedData, UserEvent, UserRemovedData, UsernameChangedData,
};
pub use state::UserState;
pub use value_objects::{
    Email, IdpLink, IdpLinkRef, InitCode, MachineProfile, NewHuman, Password, Profile, UserType,
    validate_email,
};
