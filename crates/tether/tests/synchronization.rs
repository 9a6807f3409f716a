//! End-to-end synchronization behavior against the in-memory driver.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tether::mock::{MockDriver, MockElement, MockNode};
use tether::prelude::*;

fn config(timeout_ms: u64, interval_ms: u64) -> SyncConfig {
    SyncConfig::new()
        .with_timeout_ms(timeout_ms)
        .with_poll_interval_ms(interval_ms)
        .with_action_retry_delay_ms(1)
}

fn fragment(driver: &MockDriver, css: &str, config: SyncConfig) -> Fragment<MockDriver> {
    Fragment::new(Arc::new(driver.clone()), css).with_config(config)
}

mod resolution {
    use super::*;

    #[test]
    fn find_all_instantly_is_idempotent() {
        let driver = MockDriver::new();
        for text in ["a", "b", "c"] {
            driver.add(MockNode::new("li").text(text));
        }
        let rows = fragment(&driver, "li", config(100, 10));
        let first = rows.find_all_instantly().unwrap();
        let second = rows.find_all_instantly().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn find_all_instantly_never_polls() {
        let driver = MockDriver::new();
        driver.add(MockNode::new("li").appears_after(1));
        let rows = fragment(&driver, "li", config(5_000, 10));
        let start = Instant::now();
        assert!(rows.find_all_instantly().unwrap().is_empty());
        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(driver.lookups(), 1);
    }

    #[test]
    fn narrowing_leaves_original_resolution_unaffected() {
        let driver = MockDriver::new();
        driver.add(MockNode::new("li").text("Paid"));
        driver.add(MockNode::new("li").text("Open"));
        let rows = fragment(&driver, "li", config(100, 10));
        let before = rows.criteria().clone();

        let paid = rows.with_text("Paid");
        let second = rows.with_index(1);
        let _ = rows.child("span");

        assert_eq!(rows.criteria(), &before);
        assert_eq!(rows.count_instantly().unwrap(), 2);
        assert_eq!(paid.count_instantly().unwrap(), 1);
        assert_eq!(second.text().unwrap(), "Open");
    }

    #[test]
    fn first_match_and_union_scopes_differ() {
        let driver = MockDriver::new();
        for _ in 0..2 {
            let section = driver.add(MockNode::new("section"));
            driver.add_child(section, MockNode::new("button"));
        }
        let sections = fragment(&driver, "section", config(100, 10));
        assert_eq!(sections.child("button").count_instantly().unwrap(), 1);
        assert_eq!(sections.child_of_each("button").count_instantly().unwrap(), 2);
    }

    #[test]
    fn child_criteria_keep_their_own_chain() {
        let driver = MockDriver::new();
        let table = driver.add(MockNode::new("table"));
        for text in ["x", "y"] {
            let row = driver.add_child(table, MockNode::new("tr"));
            driver.add_child(row, MockNode::new("td").text(text));
        }
        let _outside = driver.add(MockNode::new("td").text("z"));

        let cells = SearchCriteria::css("tr").child_of_each("td");
        let tables = fragment(&driver, "table", config(100, 10));
        assert_eq!(
            tables.child_criteria(&cells).texts().unwrap(),
            vec!["x".to_string(), "y".to_string()]
        );
    }

    #[test]
    fn one_shot_lookup_reports_transient_failures_as_stale() {
        let driver = MockDriver::new();
        driver.add(MockNode::new("li"));
        driver.fail_next_lookup(DriverError::Disconnected("socket reset".into()));
        let rows = fragment(&driver, "li", config(100, 10));

        let err = rows.find_all_instantly().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StaleElement);
        assert_eq!(err.report().unwrap().attempts, 1);
        assert_eq!(rows.count_instantly().unwrap(), 1);
    }

    #[test]
    fn rerendered_elements_are_found_again() {
        let driver = MockDriver::new();
        let status = driver.add(MockNode::new("status").text("Ready"));
        let fragment = fragment(&driver, "status", config(200, 5));

        let held = fragment.find_all_instantly().unwrap();
        let _ = driver.replace(status);

        assert!(held[0].text().unwrap_err().is_stale());
        fragment.verify_text("Ready").unwrap();
    }
}

mod polling {
    use super::*;

    const APPEARS_AFTER: usize = 5;
    const INTERVAL_MS: u64 = 20;

    #[test]
    fn verify_present_succeeds_when_timeout_covers_the_delay() {
        let driver = MockDriver::new();
        driver.add(MockNode::new("toast").appears_after(APPEARS_AFTER));
        let timeout = INTERVAL_MS * APPEARS_AFTER as u64 + 500;
        fragment(&driver, "toast", config(timeout, INTERVAL_MS))
            .verify_present()
            .unwrap();
        assert_eq!(driver.lookups(), APPEARS_AFTER + 1);
    }

    #[test]
    fn verify_present_fails_when_timeout_is_too_short() {
        let driver = MockDriver::new();
        driver.add(MockNode::new("toast").appears_after(APPEARS_AFTER));
        let err = fragment(&driver, "toast", config(2 * INTERVAL_MS, INTERVAL_MS))
            .verify_present()
            .unwrap_err();
        assert!(matches!(err, TetherError::NotFound(_)));
        assert!(driver.lookups() <= APPEARS_AFTER);
    }

    #[test]
    fn verify_size_timeout_reports_observed_count() {
        let driver = MockDriver::new();
        driver.add(MockNode::new("tr"));
        driver.add(MockNode::new("tr"));
        let timeout = Duration::from_millis(120);

        let err = fragment(&driver, "tr", config(120, 10))
            .verify_size(3)
            .unwrap_err();

        let TetherError::CountMismatch(report) = &err else {
            panic!("expected a count mismatch, got {err}");
        };
        assert_eq!(report.last_observation, Observation::Count(2));
        assert!(report.elapsed >= timeout);
        assert!(report.elapsed < timeout + Duration::from_secs(1));
        assert!(err.to_string().contains("2 matches"));
        assert!(err.to_string().contains("exactly 3"));
    }

    #[test]
    fn out_of_range_index_fails_immediately() {
        let driver = MockDriver::new();
        for _ in 0..3 {
            driver.add(MockNode::new("li"));
        }
        let start = Instant::now();
        let err = fragment(&driver, "li", config(5_000, 50))
            .with_index(5)
            .verify_present()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCriteria);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(driver.lookups(), 1);
    }

    #[test]
    fn transient_lookup_failures_are_absorbed() {
        let driver = MockDriver::new();
        driver.add(MockNode::new("nav"));
        driver.fail_next_lookup(DriverError::Disconnected("socket reset".into()));
        driver.fail_next_lookup(DriverError::Stale("document replaced".into()));
        fragment(&driver, "nav", config(500, 5)).verify_present().unwrap();
    }

    #[test]
    fn deadline_is_not_reset_by_retries() {
        let driver = MockDriver::new();
        for _ in 0..20 {
            driver.fail_next_lookup(DriverError::Stale("churn".into()));
        }
        let start = Instant::now();
        let err = fragment(&driver, "nav", config(100, 10))
            .verify_present()
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(start.elapsed() < Duration::from_millis(600));
    }

    #[test]
    fn unbounded_timeout_still_returns_on_success() {
        let driver = MockDriver::new();
        driver.add(MockNode::new("toast").appears_after(2));
        fragment(&driver, "toast", config(100, 5))
            .with_timeout(Duration::MAX)
            .verify_present()
            .unwrap();
        assert_eq!(driver.lookups(), 3);
    }

    #[test]
    fn oversized_backoff_factor_from_yaml_times_out_cleanly() {
        let yaml = "timeout_ms: 60\npoll_interval_ms: 5\nbackoff:\n  kind: exponential\n  factor: 1.0e300\n  max_interval_ms: 10\n";
        let config = SyncConfig::from_yaml_str(yaml).unwrap();
        let err = fragment(&MockDriver::new(), "toast", config)
            .verify_present()
            .unwrap_err();
        assert!(matches!(err, TetherError::NotFound(_)));
    }

    #[test]
    fn exponential_backoff_makes_fewer_attempts() {
        let fixed_driver = MockDriver::new();
        let _ = fragment(&fixed_driver, "x", config(200, 5)).verify_present();

        let backoff_driver = MockDriver::new();
        let backoff = config(200, 5).with_backoff(Backoff::Exponential {
            factor: 2.0,
            max_interval_ms: 1_000,
        });
        let _ = fragment(&backoff_driver, "x", backoff).verify_present();

        assert!(backoff_driver.lookups() < fixed_driver.lookups());
    }

    #[test]
    fn dom_changes_from_another_thread_are_observed() {
        let driver = MockDriver::new();
        let list = driver.add(MockNode::new("ul"));
        let remote = driver.clone();
        let writer = thread::spawn(move || {
            for i in 0..3 {
                thread::sleep(Duration::from_millis(15));
                remote.add_child(list, MockNode::new("li").text(format!("row {i}")));
            }
        });

        let rows = fragment(&driver, "ul", config(2_000, 5)).child_of_each("li");
        rows.verify_size(3).unwrap();
        rows.verify_texts(["row 0", "row 1", "row 2"]).unwrap();
        writer.join().unwrap();
    }
}

mod actions {
    use super::*;

    #[test]
    fn click_absorbs_a_stale_element() {
        let driver = MockDriver::new();
        let button = driver.add(MockNode::new("button"));
        driver.fail_next_action(button, DriverError::Stale("re-rendered".into()));

        fragment(&driver, "button", config(100, 10))
            .with_action_retries(2)
            .click()
            .unwrap();

        assert_eq!(driver.clicks(button), 1);
        let finds = driver
            .history()
            .iter()
            .filter(|call| call.starts_with("find_all"))
            .count();
        assert_eq!(finds, 2, "the element is re-resolved before the retry");
    }

    #[test]
    fn click_with_single_attempt_surfaces_stale_error() {
        let driver = MockDriver::new();
        let button = driver.add(MockNode::new("button"));
        driver.fail_next_action(button, DriverError::Stale("re-rendered".into()));

        let err = fragment(&driver, "button", config(100, 10))
            .with_action_retries(1)
            .click()
            .unwrap_err();
        assert!(matches!(err, TetherError::StaleElement(_)));
    }

    #[test]
    fn click_does_not_wait_for_presence_by_default() {
        let driver = MockDriver::new();
        driver.add(MockNode::new("button").appears_after(3));
        let start = Instant::now();
        let err = fragment(&driver, "button", config(5_000, 10))
            .click()
            .unwrap_err();
        assert!(matches!(err, TetherError::NotFound(_)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn click_keeps_retrying_through_a_rerender_gap() {
        let driver = MockDriver::new();
        let old = driver.add(MockNode::new("button").disappears_after(1));
        let fresh = driver.add(MockNode::new("button").appears_after(2));
        driver.fail_next_action(old, DriverError::Stale("re-rendered".into()));

        fragment(&driver, "button", config(100, 10))
            .with_action_retries(3)
            .click()
            .unwrap();

        assert_eq!(driver.clicks(fresh), 1);
    }

    #[test]
    fn click_reports_stale_when_the_element_never_returns() {
        let driver = MockDriver::new();
        driver.add(MockNode::new("button").disappears_after(1));

        let err = fragment(&driver, "button", config(100, 10))
            .with_action_retries(3)
            .click()
            .unwrap_err();

        let TetherError::StaleElement(report) = &err else {
            panic!("expected a stale element error, got {err}");
        };
        assert_eq!(report.attempts, 3);
        assert_eq!(report.last_observation, Observation::Count(0));
    }

    #[test]
    fn typing_into_a_scoped_input() {
        let driver = MockDriver::new();
        let form = driver.add(MockNode::new("form"));
        let email = driver.add_child(form, MockNode::new("input").test_id("email"));
        let form = fragment(&driver, "form", config(100, 10));

        form.child(Selector::test_id("email")).clear_and_type("a@b.c").unwrap();
        form.child(Selector::test_id("email"))
            .verify_attribute("value", "a@b.c")
            .unwrap();
        assert_eq!(driver.attribute(email, "value").as_deref(), Some("a@b.c"));
    }
}

mod cancellation {
    use super::*;

    #[test]
    fn cancel_token_aborts_every_waiting_fragment() {
        let driver = MockDriver::new();
        let token = CancelToken::new();
        let waiters: Vec<_> = ["header", "footer"]
            .into_iter()
            .map(|css| {
                let f = fragment(&driver, css, config(30_000, 10_000))
                    .with_cancel_token(token.clone());
                thread::spawn(move || f.verify_present())
            })
            .collect();

        thread::sleep(Duration::from_millis(30));
        let start = Instant::now();
        token.cancel();
        for waiter in waiters {
            let err = waiter.join().unwrap().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Cancelled);
        }
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}

mod custom_driver {
    use super::*;

    /// Delegates to a mock DOM, failing every third lookup with a transient error
    struct FlakyDriver {
        inner: MockDriver,
        calls: AtomicUsize,
    }

    impl Driver for FlakyDriver {
        type Element = MockElement;

        fn find_all(
            &self,
            scope: Option<&MockElement>,
            selector: &Selector,
        ) -> Result<Vec<MockElement>, DriverError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) % 3 == 0 {
                return Err(DriverError::Disconnected("flaky link".into()));
            }
            self.inner.find_all(scope, selector)
        }
    }

    #[test]
    fn third_party_drivers_get_resolution_and_polling() {
        let inner = MockDriver::new();
        let menu = inner.add(MockNode::new("menu"));
        inner.add_child(menu, MockNode::new("item").text("Open"));
        let driver = FlakyDriver {
            inner,
            calls: AtomicUsize::new(0),
        };

        let items = Fragment::from_driver(driver, "menu")
            .with_config(config(500, 5))
            .child("item");
        items.verify_text("Open").unwrap();
        assert!(items.driver().calls.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn screenshot_defaults_to_none() {
        let driver = FlakyDriver {
            inner: MockDriver::new(),
            calls: AtomicUsize::new(0),
        };
        let err = Fragment::from_driver(driver, "missing")
            .with_config(config(30, 5))
            .verify_present()
            .unwrap_err();
        assert!(err.report().unwrap().screenshot.is_none());
    }
}
