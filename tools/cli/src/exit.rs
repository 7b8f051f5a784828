//! Process exit codes (sysexits.h values).

use drivetool_common::ErrorKind;

pub const SUCCESS: u8 = 0;
pub const FAILURE: u8 = 1;

/// Exit code for a classified failure.
pub fn for_kind(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::InvalidArgument => 65,
        ErrorKind::NotFound => 66,
        ErrorKind::TransientNetwork => 69,
        ErrorKind::Io => 74,
        ErrorKind::Auth => 77,
        ErrorKind::Configuration => 78,
    }
}

/// Exit code for an error that escaped a command.
pub fn for_error(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<drivetool_common::Error>()
        .map(|e| for_kind(e.kind()))
        .unwrap_or(FAILURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use drivetool_common::Error;

    #[test]
    fn test_codes_are_distinct() {
        let kinds = [
            ErrorKind::Configuration,
            ErrorKind::Auth,
            ErrorKind::NotFound,
            ErrorKind::TransientNetwork,
            ErrorKind::Io,
            ErrorKind::InvalidArgument,
        ];
        let mut codes: Vec<u8> = kinds.iter().map(|k| for_kind(*k)).collect();
        codes.sort_unstable();
        codes.dedup();

        assert_eq!(codes.len(), kinds.len());
        assert!(!codes.contains(&SUCCESS));
        assert!(!codes.contains(&FAILURE));
    }

    #[test]
    fn test_error_through_context() {
        let err = Err::<(), _>(Error::Configuration("no secrets".to_string()))
            .context("Failed to load settings")
            .unwrap_err();

        assert_eq!(for_error(&err), 78);
        assert_eq!(for_error(&anyhow::anyhow!("other")), FAILURE);
    }
}
