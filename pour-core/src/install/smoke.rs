// pour-core/src/install/smoke.rs
use std::time::Duration;

use pour_common::capability::ProcessRunner;
use pour_common::model::formula::TestCommand;
use pour_common::model::manifest::{InstallLayout, TestOutcome};
use tracing::{debug, warn};

/// Runs the formula's smoke test. Never fails the install: every problem
/// becomes [`TestOutcome::Failed`].
pub async fn run_smoke_test(
    runner: &dyn ProcessRunner,
    test: &TestCommand,
    layout: &InstallLayout,
    timeout: Duration,
) -> TestOutcome {
    let command = layout.expand(&test.command);
    let args: Vec<String> = test.args.iter().map(|a| layout.expand(a)).collect();
    debug!("Running smoke test: {} {:?} (timeout {:?})", command, args, timeout);

    let output = match tokio::time::timeout(timeout, runner.run(&command, &args)).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return failed(format!("could not run {command}: {e}")),
        Err(_) => return failed(format!("{command} timed out after {timeout:?}")),
    };

    match (output.success(), test.expect_success) {
        (true, true) | (false, false) => {
            debug!("Smoke test passed (exit {:?})", output.code);
            TestOutcome::Passed
        }
        (success, _) => {
            let status = match output.code {
                Some(code) => format!("exit status {code}"),
                None => "terminated by signal".to_string(),
            };
            let expectation = if success { "failure" } else { "success" };
            let stderr = output.stderr.trim();
            let reason = if stderr.is_empty() {
                format!("{command} ended with {status}, expected {expectation}")
            } else {
                format!("{command} ended with {status}, expected {expectation}: {stderr}")
            };
            failed(reason)
        }
    }
}

fn failed(reason: String) -> TestOutcome {
    warn!("Smoke test failed: {}", reason);
    TestOutcome::Failed { reason }
}
