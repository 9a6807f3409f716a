//! Example: Login Form with Concrete Fragment Types
//!
//! Demonstrates: derived capabilities, regions, polling verifications and
//! stale-element recovery against the in-memory driver
//!
//! Run with: `cargo run --example login_form`

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tether::mock::{MockDriver, MockNode};
use tether::prelude::*;

#[derive(Fragment)]
#[tether(capabilities(typeable, attributed))]
struct TextInput(Fragment<MockDriver>);

#[derive(Fragment)]
#[tether(name = "submit", capabilities(clickable, texted, displayed))]
struct SubmitButton(Fragment<MockDriver>);

#[derive(Fragment)]
#[tether(capabilities(texted, displayed))]
struct Banner(Fragment<MockDriver>);

struct LoginForm {
    region: Region<MockDriver>,
}

impl LoginForm {
    fn new(page: &Fragment<MockDriver>) -> Self {
        let region = Region::new(page.locate("form"))
            .with_child("username", Selector::test_id("username"))
            .with_child("password", Selector::test_id("password"))
            .with_child("submit", "button")
            .with_optional_child("error", "error");
        Self { region }
    }

    fn input(&self, name: &str) -> TetherResult<TextInput> {
        Ok(TextInput(self.region.expect_child(name)?.clone()))
    }

    fn submit(&self) -> TetherResult<SubmitButton> {
        Ok(SubmitButton(self.region.expect_child("submit")?.clone()))
    }

    fn log_in(&self, user: &str, password: &str) -> TetherResult<()> {
        self.input("username")?.clear_and_type(user)?;
        self.input("password")?.clear_and_type(password)?;
        self.submit()?.click()
    }
}

fn main() -> TetherResult<()> {
    tether::logging::init();
    println!("=== Login Form Example ===\n");

    // 1. Build a page that renders its form late
    println!("1. Rendering a login page (the form shows up after a few lookups)...");
    let driver = MockDriver::new();
    let form = driver.add(MockNode::new("form").appears_after(3));
    driver.add_child(form, MockNode::new("input").test_id("username"));
    driver.add_child(form, MockNode::new("input").test_id("password"));
    let button = driver.add_child(form, MockNode::new("button").text("Sign in"));

    let page = Fragment::new(Arc::new(driver.clone()), "body").with_config(
        SyncConfig::new()
            .with_timeout_ms(2_000)
            .with_poll_interval_ms(10)
            .with_action_retry_delay_ms(5),
    );

    // 2. Wait for the region
    println!("\n2. Waiting for the form region...");
    let login = LoginForm::new(&page);
    login.region.verify_loaded()?;
    println!("   Loaded parts: {:?}", login.region.names());

    // 3. The button re-renders right before the click
    println!("\n3. Logging in while the submit button re-renders...");
    driver.fail_next_action(button, DriverError::Stale("button re-rendered".into()));
    login.submit()?.verify_text("Sign in")?;
    login.log_in("ada", "correct horse")?;
    println!("   Clicks on {}: {}", SubmitButton::fragment_name(), driver.clicks(button));
    println!(
        "   Username value: {:?}",
        login.input("username")?.attribute("value")?
    );

    // 4. A welcome banner arrives from another thread
    println!("\n4. Waiting for the welcome banner...");
    let remote = driver.clone();
    let writer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        remote.add(MockNode::new("banner").text("Welcome back, ada"));
    });
    let banner = Banner(page.locate("banner"));
    banner.verify_text_contains("Welcome")?;
    banner.verify_displayed()?;
    println!("   Banner: {}", banner.text()?);
    let _ = writer.join();

    // 5. What a failure looks like
    println!("\n5. Verifying an error message that never shows up...");
    let error = login.region.expect_child("error")?.with_timeout(Duration::from_millis(100));
    match error.verify_present() {
        Ok(()) => println!("   Unexpected error message"),
        Err(err) => {
            println!("   {err}");
            if let Some(report) = err.report() {
                println!("   Report JSON: {}", report.to_json()?);
            }
        }
    }

    println!("\n=== Login Form Example Complete ===");
    Ok(())
}
