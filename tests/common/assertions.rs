//! Custom assertion macros
//!
//! Short forms for the checks the engine tests repeat: item states, retry
//! classification and progress sequences.

/// Assert that a result is ok and return the value
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
}

/// Assert that an item exists and is in the given observation state
#[macro_export]
macro_rules! assert_observation_state {
    ($engine:expr, $local_id:expr, $state:ident) => {
        match $engine.get_item($local_id).await {
            Some(item) => assert_eq!(
                item.sync_state,
                fieldsync::shared::SyncState::Observation(fieldsync::shared::ObservationState::$state),
                "item {} has unexpected state (last error: {:?})",
                $local_id,
                item.last_sync_error
            ),
            None => panic!("item {} is not in the queue", $local_id),
        }
    };
}

/// Assert that an error carries the expected retry classification
#[macro_export]
macro_rules! assert_retryable {
    ($error:expr, $retryable:expr) => {
        let error = $error;
        assert_eq!(
            error.is_retryable(),
            $retryable,
            "unexpected retry classification for {:?}",
            error
        );
    };
}

/// Assert that a string contains a substring
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        assert!(
            haystack.contains($needle),
            "Expected '{}' to contain '{}'",
            haystack,
            $needle
        );
    };
}

/// Assert that a sequence never decreases
#[macro_export]
macro_rules! assert_non_decreasing {
    ($values:expr) => {
        let values = &$values;
        for pair in values.windows(2) {
            assert!(pair[0] <= pair[1], "sequence decreased: {:?}", values);
        }
    };
}
