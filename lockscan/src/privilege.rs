use nix::unistd::{geteuid, Uid};

use crate::error::PrivilegeError;

/// Refuse to run unless the effective uid is root.
///
/// Checked up front so that an unprivileged run fails with a clear message
/// instead of silently missing every process it is not allowed to inspect.
pub fn require_root() -> Result<(), PrivilegeError> {
    check_euid(geteuid())
}

pub fn check_euid(euid: Uid) -> Result<(), PrivilegeError> {
    if euid.is_root() {
        Ok(())
    } else {
        Err(PrivilegeError {
            euid: euid.as_raw(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_passes() {
        assert!(check_euid(Uid::from_raw(0)).is_ok());
    }

    #[test]
    fn unprivileged_user_is_rejected_with_uid() {
        let err = check_euid(Uid::from_raw(1000)).unwrap_err();
        assert_eq!(err.euid, 1000);
        assert!(err.to_string().contains("root privileges"));
    }
}
