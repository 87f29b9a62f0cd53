//! Runtime invariant checks with contract-test bookkeeping.
//!
//! Production code states an invariant with [`assert_invariant!`]; every
//! check is recorded per thread so a test can prove that the code path it
//! exercised actually evaluated the invariants it depends on.
//!
//! ```rust,ignore
//! assert_invariant!(next >= previous, "Tick schedule never moves backward");
//!
//! #[test]
//! fn contract_tick_schedule() {
//!     contract_test("tick schedule", &["Tick schedule never moves backward"]);
//! }
//! ```

use std::cell::RefCell;
use std::collections::HashSet;
use std::thread_local;

thread_local! {
    static CHECKED: RefCell<HashSet<String>> = RefCell::new(HashSet::new());
}

/// Assert an invariant and record that it was evaluated.
///
/// Panics with the message (and optional context) when the condition is false.
#[macro_export]
macro_rules! assert_invariant {
    ($condition:expr, $message:expr) => {
        $crate::invariant_ppt::__check_invariant($condition, $message, None)
    };
    ($condition:expr, $message:expr, $context:expr) => {
        $crate::invariant_ppt::__check_invariant($condition, $message, Some($context))
    };
}

#[doc(hidden)]
pub fn __check_invariant(condition: bool, message: &str, context: Option<&str>) {
    CHECKED.with(|checked| {
        checked.borrow_mut().insert(message.to_string());
    });

    if !condition {
        panic!(
            "INVARIANT VIOLATION [{}]: {}",
            context.unwrap_or("unknown"),
            message
        );
    }
}

/// Panic unless every invariant in `required` was evaluated on this thread.
pub fn contract_test(test_name: &str, required: &[&str]) {
    let checked = CHECKED.with(|checked| checked.borrow().clone());
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|invariant| !checked.contains(*invariant))
        .collect();

    if !missing.is_empty() {
        panic!(
            "CONTRACT FAILURE [{}]: invariants never checked:\n  - {}",
            test_name,
            missing.join("\n  - ")
        );
    }
}

/// Forget every invariant recorded on this thread
pub fn clear_invariant_log() {
    CHECKED.with(|checked| checked.borrow_mut().clear());
}
