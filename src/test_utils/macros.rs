//! Assertions over streams of `Result` items, such as the pending event stream.
//!
//! Each waits at most [`STREAM_TIMEOUT`](crate::test_utils::STREAM_TIMEOUT) for the stream.

/// Asserts the next item is `Ok(expected)`.
#[macro_export]
macro_rules! assert_next {
    ($stream:expr, $expected:expr) => {
        match $crate::test_utils::next_within(&mut $stream).await {
            ::std::option::Option::Some(::std::result::Result::Ok(item)) => {
                assert_eq!(item, $expected)
            }
            other => panic!("Expected an item, got {other:?}"),
        }
    };
}

/// Asserts the next item is an `Err` matching `$pattern`.
#[macro_export]
macro_rules! assert_next_err {
    ($stream:expr, $pattern:pat) => {
        match $crate::test_utils::next_within(&mut $stream).await {
            ::std::option::Option::Some(::std::result::Result::Err(e)) => {
                assert!(matches!(e, $pattern), "Unexpected error {e:?}")
            }
            other => panic!("Expected an error, got {other:?}"),
        }
    };
}

/// Asserts the stream has ended.
#[macro_export]
macro_rules! assert_closed {
    ($stream:expr) => {
        let next = $crate::test_utils::next_within(&mut $stream).await;
        assert!(next.is_none(), "Expected the stream to end, got {next:?}");
    };
}
