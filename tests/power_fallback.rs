#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use shutdown_at::power::{PowerController, PowerMode, PowerPlan, SystemPowerController};

fn write_script(dir: &Path, name: &str, body: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n"))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

// The OS commands are stand-ins that leave a marker file behind instead of
// powering anything down.
fn plan(dir: &Path, primary_script: Option<PathBuf>) -> PowerPlan {
    let marker = |name: &str| {
        vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("echo ran > {}", dir.join(name).display()),
        ]
    };
    PowerPlan {
        primary_script,
        shutdown_command: marker("fallback-shutdown"),
        hibernate_command: marker("hibernate"),
        command_timeout: Some(Duration::from_secs(10)),
        dry_run: false,
    }
}

#[tokio::test]
async fn failing_script_hands_over_to_os_command() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let script = write_script(dir.path(), "store-and-shutdown.sh", "exit 4")?;
    let controller = SystemPowerController::new(plan(dir.path(), Some(script)))?;

    let result = controller.execute(PowerMode::Shutdown).await;

    assert!(result.succeeded);
    assert!(result.used_fallback);
    assert_eq!(result.attempts.len(), 2);
    assert_eq!(result.attempts[0].exit_code, Some(4));
    assert!(dir.path().join("fallback-shutdown").exists());
    Ok(())
}

#[tokio::test]
async fn working_script_is_the_only_command_run() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let marker = dir.path().join("primary-ran");
    let script = write_script(
        dir.path(),
        "store-and-shutdown.sh",
        &format!("echo ran > {}", marker.display()),
    )?;
    let controller = SystemPowerController::new(plan(dir.path(), Some(script)))?;

    let result = controller.execute(PowerMode::Shutdown).await;

    assert!(result.succeeded);
    assert!(!result.used_fallback);
    assert!(marker.exists());
    assert!(!dir.path().join("fallback-shutdown").exists());
    Ok(())
}

#[tokio::test]
async fn hanging_script_is_bounded_by_the_timeout() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let script = write_script(dir.path(), "store-and-shutdown.sh", "sleep 30")?;
    let mut plan = plan(dir.path(), Some(script));
    plan.command_timeout = Some(Duration::from_millis(200));
    let controller = SystemPowerController::new(plan)?;

    let result = controller.execute(PowerMode::Shutdown).await;

    assert!(result.succeeded);
    assert!(result.used_fallback);
    assert!(result.attempts[0].stderr.contains("timed out"));
    Ok(())
}

#[tokio::test]
async fn missing_os_command_is_reported_as_failure() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut plan = plan(dir.path(), None);
    plan.hibernate_command = vec![dir
        .path()
        .join("no-such-hibernate")
        .display()
        .to_string()];
    let controller = SystemPowerController::new(plan)?;

    let result = controller.execute(PowerMode::Hibernate).await;

    assert!(!result.succeeded);
    assert!(!result.used_fallback);
    let detail = result.error_detail.expect("failure detail");
    assert!(detail.contains("no-such-hibernate"));
    Ok(())
}

#[tokio::test]
async fn script_with_non_utf8_name_still_runs() -> anyhow::Result<()> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = tempfile::tempdir()?;
    let marker = dir.path().join("primary-ran");
    let script = dir.path().join(OsStr::from_bytes(b"store-\xff.sh"));
    fs::write(&script, format!("#!/bin/sh\necho ran > {}\n", marker.display()))?;
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;
    let controller = SystemPowerController::new(plan(dir.path(), Some(script)))?;

    let result = controller.execute(PowerMode::Shutdown).await;

    assert!(result.succeeded);
    assert!(!result.used_fallback);
    assert!(marker.exists());
    Ok(())
}
