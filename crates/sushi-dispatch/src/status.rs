//! External control-plane status codes (§7): deep components return
//! `sushi_core::Error`, the Controller facade is the single place that
//! translates those into this flatter, stable enum a frontend can match on.

use sushi_core::Error;

/// `{OK, ERROR, UNSUPPORTED_OPERATION, NOT_FOUND, OUT_OF_RANGE,
/// INVALID_ARGUMENTS}` (§7). Deliberately smaller than [`sushi_core::Error`] —
/// callers across the control-plane boundary get a taxonomy, not a message,
/// and the message survives only inside `Error(String)` for logging.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Ok,
    Error(String),
    UnsupportedOperation,
    NotFound,
    OutOfRange,
    InvalidArguments,
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::UnknownProcessor(_) | Error::UnknownTrack(_) | Error::UnknownParameter { .. } => {
                Status::NotFound
            }
            Error::OutOfRange(_) => Status::OutOfRange,
            Error::InvalidTempo(_) | Error::InvalidTimeSignature { .. } | Error::InvalidChannelCount(_) => {
                Status::InvalidArguments
            }
            Error::InvalidSampleOffset { .. } => Status::InvalidArguments,
            Error::NotImplemented(_) => Status::UnsupportedOperation,
            Error::InvalidConfig(msg) => Status::Error(msg),
            Error::Io(e) => Status::Error(e.to_string()),
            Error::Device(msg) => Status::Error(msg),
        }
    }
}

/// Collapse a `Result<(), Error>` from an engine mutation into a [`Status`].
pub fn status_of(result: Result<(), Error>) -> Status {
    match result {
        Ok(()) => Status::Ok,
        Err(err) => Status::from(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_ids_map_to_not_found() {
        assert_eq!(Status::from(Error::UnknownTrack(4)), Status::NotFound);
        assert_eq!(Status::from(Error::UnknownProcessor(4)), Status::NotFound);
    }

    #[test]
    fn out_of_range_value_maps_through() {
        assert_eq!(Status::from(Error::OutOfRange(2.0)), Status::OutOfRange);
    }

    #[test]
    fn result_ok_unit_maps_to_status_ok() {
        let result: Result<(), Error> = Ok(());
        assert_eq!(status_of(result), Status::Ok);
    }

    #[test]
    fn result_err_maps_through_from_error() {
        let result: Result<(), Error> = Err(Error::InvalidTempo(5.0));
        assert_eq!(status_of(result), Status::InvalidArguments);
    }
}
