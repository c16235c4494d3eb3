/// Turns tolerated errors into log lines.
pub trait ResultOkLogExt<T, E> {
    /// Logs the error, if any, and discards it.
    fn ok_log(self) -> Option<T>;

    /// Like [`ResultOkLogExt::ok_log`], prefixing the log line with `context`.
    fn ok_log_with<C: std::fmt::Display>(self, context: impl FnOnce() -> C) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log(self) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::error!("{err}");
                None
            }
        }
    }

    fn ok_log_with<C: std::fmt::Display>(self, context: impl FnOnce() -> C) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::error!("{}: {err}", context());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_log() {
        let ok: Result<u8, std::io::Error> = Ok(1);
        assert_eq!(ok.ok_log(), Some(1));
        let err: Result<u8, std::io::Error> = Err(std::io::Error::other("boom"));
        assert_eq!(err.ok_log_with(|| "writing trace"), None);
    }
}
