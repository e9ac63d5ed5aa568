//! Supervisor configuration and boot persistence tests

use std::path::PathBuf;

use tokio_test::{assert_err, assert_ok};

use provisioner::config::settings::Settings;
use provisioner::deploy::artifacts::{deploy, DeploymentTarget};
use provisioner::errors::ProvisionError;
use provisioner::exec::command::CommandOutput;
use provisioner::platform::detect::{detect, CapabilityDescriptor, HostOs};
use provisioner::supervisor::pm2::configure;
use provisioner::supervisor::startup::{detect_init_system, register, BootOutcome, InitSystem};

use crate::support::{Fixture, ScriptedRunner};

async fn deployed(
    fixture: &Fixture,
    runner: &ScriptedRunner,
) -> (Settings, CapabilityDescriptor, DeploymentTarget) {
    let settings = assert_ok!(Settings::load(&fixture.config_path(), &fixture.context()).await);
    let descriptor = assert_ok!(detect(runner, HostOs::Linux).await);
    let target = assert_ok!(deploy(runner, &settings, false).await);
    runner.clear_log();
    (settings, descriptor, target)
}

#[tokio::test]
async fn test_configure_replaces_processes() {
    let fixture = Fixture::new();
    let runner = ScriptedRunner::provisioned();
    let (settings, descriptor, target) = deployed(&fixture, &runner).await;

    let report = assert_ok!(configure(&runner, &settings, &descriptor, &target).await);

    let manifest = fixture.base_dir.join("ecosystem.config.js");
    assert_eq!(report.manifest, manifest);
    assert_eq!(report.pm2_home, PathBuf::from("/home/deploy/.pm2"));
    // invoked as root: the lifecycle runs in the application user's daemon
    let pm2 = "sudo -u deploy --preserve-env=PM2_HOME pm2";
    assert_eq!(
        runner.commands(),
        vec![
            format!("chown deploy {}", manifest.display()),
            "id -un".to_string(),
            format!("{} delete backend", pm2),
            format!("{} delete frontend", pm2),
            format!("{} start {}", pm2, manifest.display()),
            format!("{} save", pm2),
        ]
    );
    assert_eq!(
        runner.env_of("pm2 save", "PM2_HOME").as_deref(),
        Some("/home/deploy/.pm2")
    );

    let js = std::fs::read_to_string(&manifest).unwrap();
    assert!(js.contains("const FRONTEND_PORT = process.env.FRONTEND_PORT || \"3000\";"));
    assert!(js.contains("args: [\"run\", \"start\", \"--\", \"-p\", FRONTEND_PORT],"));
    assert!(js.contains("NODE_ENV: \"production\","));
    // portable: no absolute paths from this host
    assert!(!js.contains(&fixture.base_dir.display().to_string()));
}

#[tokio::test]
async fn test_manifest_is_regenerated() {
    let fixture = Fixture::new();
    let runner = ScriptedRunner::provisioned();
    let (settings, descriptor, target) = deployed(&fixture, &runner).await;
    let manifest = fixture.base_dir.join("ecosystem.config.js");
    std::fs::write(&manifest, "module.exports = { apps: [{ name: \"stale\" }] };\n").unwrap();

    assert_ok!(configure(&runner, &settings, &descriptor, &target).await);

    let js = std::fs::read_to_string(&manifest).unwrap();
    assert!(!js.contains("stale"));
}

#[tokio::test]
async fn test_delete_not_found_is_tolerated() {
    let fixture = Fixture::new();
    let runner = ScriptedRunner::provisioned().respond(
        "pm2 delete",
        CommandOutput::failure(1, "[PM2][ERROR] Process or Namespace backend not found"),
    );
    let (settings, descriptor, target) = deployed(&fixture, &runner).await;

    assert_ok!(configure(&runner, &settings, &descriptor, &target).await);
    assert!(runner.ran("pm2 start"));
}

#[tokio::test]
async fn test_delete_other_failure_is_fatal() {
    let fixture = Fixture::new();
    let runner = ScriptedRunner::provisioned().respond(
        "pm2 delete",
        CommandOutput::failure(1, "connect EACCES /home/deploy/.pm2/rpc.sock"),
    );
    let (settings, descriptor, target) = deployed(&fixture, &runner).await;

    let err = assert_err!(configure(&runner, &settings, &descriptor, &target).await);
    assert!(matches!(err, ProvisionError::SupervisorError(_)));
    assert!(!runner.ran("pm2 start"));
}

#[tokio::test]
async fn test_app_user_runs_pm2_directly() {
    let fixture = Fixture::new();
    let runner =
        ScriptedRunner::provisioned().respond("id -un", CommandOutput::success("deploy\n"));
    let (settings, descriptor, target) = deployed(&fixture, &runner).await;

    assert_ok!(configure(&runner, &settings, &descriptor, &target).await);

    assert!(!runner.ran("sudo"));
    assert!(runner.ran("pm2 save"));
    assert_eq!(
        runner.env_of("pm2 save", "PM2_HOME").as_deref(),
        Some("/home/deploy/.pm2")
    );
}

#[tokio::test]
async fn test_saved_list_is_the_one_registered_for_boot() {
    let fixture = Fixture::new();
    fixture.write_config(&["ENABLE_STARTUP=1", "APP_USER_HOME=/srv/deploy-home"]);
    let runner = ScriptedRunner::provisioned().with_path("/run/systemd/system");
    let (settings, descriptor, target) = deployed(&fixture, &runner).await;

    let report = assert_ok!(configure(&runner, &settings, &descriptor, &target).await);
    assert_ok!(register(&runner, &settings, &descriptor).await);

    // pm2 startup -u U --hp H resurrects H/.pm2 as U
    assert!(runner.ran("sudo -u deploy --preserve-env=PM2_HOME pm2 save"));
    assert_eq!(
        runner.env_of("pm2 save", "PM2_HOME").as_deref(),
        Some("/srv/deploy-home/.pm2")
    );
    assert!(runner.ran("pm2 startup systemd -u deploy --hp /srv/deploy-home"));
    assert_eq!(report.pm2_home, PathBuf::from("/srv/deploy-home/.pm2"));
}

#[tokio::test]
async fn test_manifest_chown_failure_is_fatal() {
    let fixture = Fixture::new();
    let runner = ScriptedRunner::provisioned();
    let (settings, descriptor, target) = deployed(&fixture, &runner).await;
    let runner = runner.respond(
        "chown deploy",
        CommandOutput::failure(1, "chown: invalid user: 'deploy'"),
    );

    let err = assert_err!(configure(&runner, &settings, &descriptor, &target).await);
    assert!(matches!(err, ProvisionError::SupervisorError(_)));
    assert!(!runner.ran("pm2 start"));
}

#[tokio::test]
async fn test_init_system_detection() {
    let runner = ScriptedRunner::new().with_path("/run/systemd/system");
    assert_eq!(detect_init_system(&runner, HostOs::Linux).await, InitSystem::Systemd);
    assert_eq!(detect_init_system(&runner, HostOs::MacOs).await, InitSystem::Launchd);
    assert_eq!(detect_init_system(&runner, HostOs::Other).await, InitSystem::Unsupported);

    let runner = ScriptedRunner::new();
    assert_eq!(detect_init_system(&runner, HostOs::Linux).await, InitSystem::Unsupported);
}

#[tokio::test]
async fn test_register_with_systemd() {
    let fixture = Fixture::new();
    fixture.write_config(&["ENABLE_STARTUP=1"]);
    let runner = ScriptedRunner::provisioned().with_path("/run/systemd/system");
    let settings = assert_ok!(Settings::load(&fixture.config_path(), &fixture.context()).await);
    let descriptor = assert_ok!(detect(&runner, HostOs::Linux).await);

    let outcome = assert_ok!(register(&runner, &settings, &descriptor).await);

    assert_eq!(outcome, BootOutcome::Registered(InitSystem::Systemd));
    assert!(runner.ran("pm2 startup systemd -u deploy --hp /home/deploy"));
}

#[tokio::test]
async fn test_register_with_launchd_uses_configured_home() {
    let fixture = Fixture::new();
    fixture.write_config(&["ENABLE_STARTUP=yes", "APP_USER_HOME=/Users/Shared/deploy"]);
    let runner = ScriptedRunner::new().with_binaries(&["brew", "node", "pm2", "mysql"]);
    let settings = assert_ok!(Settings::load(&fixture.config_path(), &fixture.context()).await);
    assert_eq!(settings.app_user_home, Some(PathBuf::from("/Users/Shared/deploy")));
    let descriptor = assert_ok!(detect(&runner, HostOs::MacOs).await);

    let outcome = assert_ok!(register(&runner, &settings, &descriptor).await);

    assert_eq!(outcome, BootOutcome::Registered(InitSystem::Launchd));
    assert!(runner.ran("pm2 startup launchd -u deploy --hp /Users/Shared/deploy"));
}

#[tokio::test]
async fn test_unsupported_init_system_is_skipped() {
    let fixture = Fixture::new();
    fixture.write_config(&["ENABLE_STARTUP=on"]);
    let runner = ScriptedRunner::provisioned();
    let settings = assert_ok!(Settings::load(&fixture.config_path(), &fixture.context()).await);
    let descriptor = assert_ok!(detect(&runner, HostOs::Linux).await);

    let outcome = assert_ok!(register(&runner, &settings, &descriptor).await);

    assert_eq!(outcome, BootOutcome::Unsupported);
    assert!(!runner.ran("pm2 startup"));
}

#[tokio::test]
async fn test_register_launch_failure_is_degraded() {
    let fixture = Fixture::new();
    fixture.write_config(&["ENABLE_STARTUP=true"]);
    let runner = ScriptedRunner::provisioned()
        .with_path("/run/systemd/system")
        .fail_to_run("pm2 startup", std::io::ErrorKind::PermissionDenied);
    let settings = assert_ok!(Settings::load(&fixture.config_path(), &fixture.context()).await);
    let descriptor = assert_ok!(detect(&runner, HostOs::Linux).await);

    let err = assert_err!(register(&runner, &settings, &descriptor).await);
    match &err {
        ProvisionError::BootPersistenceError(failure) => assert_eq!(failure.status, 126),
        other => panic!("expected BootPersistenceError, got {:?}", other),
    }
    assert_eq!(err.severity(), provisioner::errors::Severity::Degraded);
}

#[tokio::test]
async fn test_register_failure_is_degraded() {
    let fixture = Fixture::new();
    fixture.write_config(&["ENABLE_STARTUP=true"]);
    let runner = ScriptedRunner::provisioned()
        .with_path("/run/systemd/system")
        .respond("pm2 startup", CommandOutput::failure(1, "[PM2] Init system not found"));
    let settings = assert_ok!(Settings::load(&fixture.config_path(), &fixture.context()).await);
    let descriptor = assert_ok!(detect(&runner, HostOs::Linux).await);

    let err = assert_err!(register(&runner, &settings, &descriptor).await);
    assert!(matches!(err, ProvisionError::BootPersistenceError(_)));
    assert_eq!(err.severity(), provisioner::errors::Severity::Degraded);
}
