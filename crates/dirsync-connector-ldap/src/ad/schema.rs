//! Active Directory schema constants
//!
//! Object classes, attribute names and flag values used when creating and
//! reading computers, organizational units and groups.

/// Object class names.
pub mod object_class {
    pub const TOP: &str = "top";
    pub const COMPUTER: &str = "computer";
    pub const GROUP: &str = "group";
    pub const USER: &str = "user";
    pub const ORGANIZATIONAL_UNIT: &str = "organizationalUnit";

    /// Classes for a new computer account.
    pub const COMPUTER_CLASSES: &[&str] = &[COMPUTER];
    /// Classes for a new security group.
    pub const GROUP_CLASSES: &[&str] = &[GROUP, TOP];
    /// Classes for a new organizational unit.
    pub const ORGANIZATIONAL_UNIT_CLASSES: &[&str] = &[ORGANIZATIONAL_UNIT, TOP];
    /// Classes whose entries can be group members.
    pub const MEMBER_CLASSES: &[&str] = &[USER, GROUP];
}

/// Attribute names.
pub mod attr {
    pub const CN: &str = "cn";
    pub const OU: &str = "ou";
    pub const NAME: &str = "name";
    pub const DESCRIPTION: &str = "description";
    pub const SAM_ACCOUNT_NAME: &str = "sAMAccountName";
    pub const USER_ACCOUNT_CONTROL: &str = "userAccountControl";
    pub const GROUP_TYPE: &str = "groupType";
    pub const MEMBER: &str = "member";
    pub const MEMBER_OF: &str = "memberOf";
}

/// userAccountControl flags.
pub mod user_account_control {
    /// WORKSTATION_TRUST_ACCOUNT: a domain member computer.
    pub const WORKSTATION_TRUST_ACCOUNT: u32 = 0x1000;
}

/// groupType bit flags.
pub mod group_type {
    pub const GLOBAL: i32 = 0x0000_0002;
    pub const SECURITY_ENABLED: i32 = i32::MIN;

    /// Global security group, the type new groups are created with.
    pub const GLOBAL_SECURITY: i32 = SECURITY_ENABLED | GLOBAL;
}

/// The computer's account name: its name plus a trailing `$`.
#[must_use]
pub fn computer_account_name(name: &str) -> String {
    format!("{name}$")
}
