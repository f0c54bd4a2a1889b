/// Async counterpart to the standard library's `TryFrom<T>` trait.
///
/// Useful when the conversion needs I/O, such as building a node from a path
/// that first has to be stat'ed.
pub trait AsyncTryFrom<T>: Sized {
    /// The error type that can occur during conversion.
    type Error;

    /// Performs the fallible asynchronous conversion from `T` to `Self`.
    async fn async_try_from(value: T) -> Result<Self, Self::Error>;
}

/// Async counterpart to `TryInto<T>`.
pub trait AsyncTryInto<T> {
    /// The error type that can occur during conversion.
    type Error;

    /// Performs the fallible asynchronous conversion from `Self` to `T`.
    async fn async_try_into(self) -> Result<T, Self::Error>;
}

/// Blanket implementation for `AsyncTryInto<U>` when `U` implements `AsyncTryFrom<T>`.
impl<T, U> AsyncTryInto<U> for T
where
    U: AsyncTryFrom<T>,
{
    type Error = U::Error;

    async fn async_try_into(self) -> Result<U, Self::Error> {
        U::async_try_from(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Kind, NodeError};

    #[derive(Debug)]
    struct ParsedKind(Kind);

    impl AsyncTryFrom<&str> for ParsedKind {
        type Error = NodeError;

        async fn async_try_from(value: &str) -> Result<Self, Self::Error> {
            Ok(ParsedKind(value.parse()?))
        }
    }

    #[test]
    fn test_async_try_from_success() {
        futures::executor::block_on(async {
            let parsed = ParsedKind::async_try_from("directory")
                .await
                .expect("Failed to parse kind");
            assert_eq!(parsed.0, Kind::Directory);
        });
    }

    #[test]
    fn test_async_try_into_failure() {
        futures::executor::block_on(async {
            let result: Result<ParsedKind, _> = "symlink".async_try_into().await;
            assert!(matches!(
                result,
                Err(NodeError::UnrecognizedTypeError { .. })
            ));
        });
    }
}
