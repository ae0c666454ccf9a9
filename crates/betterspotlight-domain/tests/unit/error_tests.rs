//! Error taxonomy mapping.

use betterspotlight_domain::error::{Error, IpcErrorCode};
use rstest::rstest;

#[rstest]
#[case(Error::invalid_params("x"), IpcErrorCode::InvalidParams, "INVALID_PARAMS", 1)]
#[case(Error::timeout("x"), IpcErrorCode::Timeout, "TIMEOUT", 2)]
#[case(Error::not_found("x"), IpcErrorCode::NotFound, "NOT_FOUND", 4)]
#[case(Error::already_running("x"), IpcErrorCode::AlreadyRunning, "ALREADY_RUNNING", 5)]
#[case(Error::internal("x"), IpcErrorCode::InternalError, "INTERNAL_ERROR", 6)]
#[case(Error::unsupported("x"), IpcErrorCode::Unsupported, "UNSUPPORTED", 7)]
#[case(Error::service_unavailable("x"), IpcErrorCode::ServiceUnavailable, "SERVICE_UNAVAILABLE", 9)]
fn canonical_mapping(
    #[case] error: Error,
    #[case] code: IpcErrorCode,
    #[case] code_string: &str,
    #[case] numeric: i64,
) {
    assert_eq!(error.ipc_code(), code);
    assert_eq!(code.as_str(), code_string);
    assert_eq!(code.code(), numeric);
}

#[test]
fn infrastructure_errors_map_to_internal() {
    assert_eq!(
        Error::database("boom").ipc_code(),
        IpcErrorCode::InternalError
    );
    assert_eq!(Error::codec("bad frame").ipc_code(), IpcErrorCode::InternalError);
    assert_eq!(
        Error::DatabaseBusy {
            message: "upsert".to_owned(),
            attempts: 5
        }
        .ipc_code(),
        IpcErrorCode::InternalError
    );
}

#[test]
fn corrupted_index_has_its_own_code() {
    let error = Error::CorruptedIndex {
        message: "fts check failed".to_owned(),
    };
    assert_eq!(error.ipc_code(), IpcErrorCode::CorruptedIndex);
    assert_eq!(error.ipc_code().code(), 8);
}

#[test]
fn permission_denied_io_is_classified() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
    let error: Error = io.into();
    assert_eq!(error.ipc_code(), IpcErrorCode::PermissionDenied);

    let other = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let error: Error = other.into();
    assert_eq!(error.ipc_code(), IpcErrorCode::InternalError);
}
