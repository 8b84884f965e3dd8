// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![cfg(unix)]

mod helpers;

use helpers::*;
use nix::sys::signal::Signal;
use serverpanel::{NewServer, PanelError, ServerStatus, StopOutcome};
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_start_reaches_running_on_readiness_marker() {
    let panel = TestPanel::new(SERVER_SCRIPT);
    panel.create("survival").await;
    assert_eq!(
        panel.supervisor.get_status("survival").await.unwrap(),
        ServerStatus::Stopped
    );

    panel.supervisor.start("survival").await.unwrap();
    assert_eq!(panel.recorded_status("survival"), Some(ServerStatus::Starting));
    let pid = panel.pid("survival").expect("pid recorded after start");
    assert_eq!(panel.store.get("survival").unwrap().pid, Some(pid));
    assert!(panel.wait_for_console("survival", "Loading libraries", DEFAULT_TIMEOUT).await);

    assert!(panel.supervisor.send_command("survival", "ready").await);
    assert!(
        panel
            .wait_for_status("survival", ServerStatus::Running, DEFAULT_TIMEOUT)
            .await
    );
    assert_eq!(panel.store.get("survival").unwrap().status, ServerStatus::Running);

    assert_eq!(
        panel.supervisor.stop("survival").await.unwrap(),
        StopOutcome::Graceful
    );
}

#[tokio::test]
async fn test_start_unknown_server_is_not_found() {
    let panel = TestPanel::new(SERVER_SCRIPT);
    let err = panel.supervisor.start("ghost").await.unwrap_err();
    assert_eq!(err, PanelError::NotFound("ghost".to_string()));
    assert!(panel.supervisor.names().is_empty());
    assert_eq!(panel.fetcher.calls(), 0);
}

#[tokio::test]
async fn test_send_command_to_stopped_server_is_rejected() {
    let panel = TestPanel::new(SERVER_SCRIPT);
    panel.create("survival").await;

    assert!(!panel.supervisor.send_command("survival", "say hi").await);
    assert!(!panel.supervisor.send_command("ghost", "say hi").await);
    assert!(panel.supervisor.get_console_output("survival", 100).is_empty());
}

#[tokio::test]
async fn test_send_command_is_echoed_in_console() {
    let panel = TestPanel::new(SERVER_SCRIPT);
    panel.create("survival").await;
    panel.supervisor.start("survival").await.unwrap();

    assert!(panel.supervisor.send_command("survival", "say hi").await);
    assert!(panel.wait_for_console("survival", "echo: say hi", DEFAULT_TIMEOUT).await);

    // A line break would smuggle a second command.
    assert!(!panel.supervisor.send_command("survival", "say hi\nop me").await);

    panel.supervisor.stop("survival").await.unwrap();
}

#[tokio::test]
async fn test_corrupt_store_is_quarantined_at_startup() {
    let dir = tempfile::tempdir().unwrap();
    let garbage = b"{\"survival\": {\"port\": 25565,";
    fs::write(dir.path().join("servers.json"), garbage).unwrap();

    let panel = PanelBuilder::new(SERVER_SCRIPT).in_dir(dir).build();
    assert!(panel.supervisor.list().is_empty());
    assert_eq!(
        fs::read(panel.dir.path().join("servers.json.backup")).unwrap(),
        garbage
    );
    assert!(panel.store.save(&Default::default()));
    assert!(panel.store.load().is_empty());
}

#[tokio::test]
async fn test_stop_forces_process_that_ignores_stop_command() {
    let grace = Duration::from_secs(1);
    let panel = PanelBuilder::new(STUBBORN_SCRIPT).stop_grace(grace).build();
    panel.create("survival").await;
    panel.supervisor.start("survival").await.unwrap();
    assert!(
        panel
            .wait_for_status("survival", ServerStatus::Running, DEFAULT_TIMEOUT)
            .await
    );
    let pid = panel.pid("survival").unwrap();

    let began = Instant::now();
    let outcome = panel.supervisor.stop("survival").await.unwrap();
    let took = began.elapsed();

    assert_eq!(outcome, StopOutcome::Forced);
    assert!(took >= grace, "stopped after {took:?}, before the grace period");
    assert!(took < grace + Duration::from_secs(5), "stop took {took:?}");
    assert_eq!(panel.recorded_status("survival"), Some(ServerStatus::Stopped));
    assert_eq!(panel.pid("survival"), None);
    assert!(!pid_is_alive(pid));

    let stored = panel.store.get("survival").unwrap();
    assert_eq!(stored.status, ServerStatus::Stopped);
    assert_eq!(stored.pid, None);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let panel = TestPanel::new(SERVER_SCRIPT);
    panel.create("survival").await;

    assert_eq!(
        panel.supervisor.stop("survival").await.unwrap(),
        StopOutcome::AlreadyStopped
    );

    panel.supervisor.start("survival").await.unwrap();
    assert_eq!(
        panel.supervisor.stop("survival").await.unwrap(),
        StopOutcome::Graceful
    );
    let before = fs::metadata(panel.store.path()).unwrap().modified().unwrap();

    assert_eq!(
        panel.supervisor.stop("survival").await.unwrap(),
        StopOutcome::AlreadyStopped
    );
    assert_eq!(panel.recorded_status("survival"), Some(ServerStatus::Stopped));
    let after = fs::metadata(panel.store.path()).unwrap().modified().unwrap();
    assert_eq!(before, after, "second stop must not persist");

    assert!(matches!(
        panel.supervisor.stop("ghost").await,
        Err(PanelError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_status_self_heals_after_external_kill() {
    let panel = TestPanel::new(SERVER_SCRIPT);
    panel.create("survival").await;
    panel.supervisor.start("survival").await.unwrap();
    let pid = panel.pid("survival").unwrap();

    kill_pid(pid, Signal::SIGKILL);

    let healed = wait_for(DEFAULT_TIMEOUT, || {
        panel.recorded_status("survival") == Some(ServerStatus::Stopped)
    })
    .await;
    let status = panel.supervisor.get_status("survival").await.unwrap();
    assert!(healed || status == ServerStatus::Stopped);
    assert_eq!(
        panel.supervisor.get_status("survival").await.unwrap(),
        ServerStatus::Stopped
    );
    assert_eq!(panel.pid("survival"), None);
    assert_eq!(panel.store.get("survival").unwrap().status, ServerStatus::Stopped);
    assert!(!panel.supervisor.send_command("survival", "list").await);
}

#[tokio::test]
async fn test_process_exit_is_detected_from_output_close() {
    let panel = TestPanel::new(SHORT_LIVED_SCRIPT);
    panel.create("survival").await;
    panel.supervisor.start("survival").await.unwrap();

    assert!(
        panel
            .wait_for_status("survival", ServerStatus::Stopped, DEFAULT_TIMEOUT)
            .await
    );
    let console = panel.supervisor.get_console_output("survival", 10);
    assert!(console.iter().any(|l| l.ends_with("] bye")));
    assert_eq!(panel.store.get("survival").unwrap().pid, None);
}

#[tokio::test]
async fn test_console_keeps_only_most_recent_lines() {
    let panel = TestPanel::new(FLOOD_SCRIPT);
    panel.create("survival").await;
    panel.supervisor.start("survival").await.unwrap();

    assert!(panel.wait_for_console("survival", "line 1499", DEFAULT_TIMEOUT).await);
    let all = panel.supervisor.get_console_output("survival", 5000);
    assert_eq!(all.len(), 1000);
    assert!(all[0].ends_with("] line 500"));
    assert!(all[999].ends_with("] line 1499"));

    let tail = panel.supervisor.get_console_output("survival", 3);
    assert_eq!(tail.len(), 3);
    assert!(tail[2].ends_with("] line 1499"));

    panel.supervisor.stop("survival").await.unwrap();
}

#[tokio::test]
async fn test_start_twice_spawns_once() {
    let panel = TestPanel::new(SERVER_SCRIPT);
    panel.create("survival").await;
    panel.supervisor.start("survival").await.unwrap();
    let pid = panel.pid("survival");

    panel.supervisor.start("survival").await.unwrap();
    assert_eq!(panel.pid("survival"), pid);

    panel.supervisor.stop("survival").await.unwrap();
}

#[tokio::test]
async fn test_missing_runtime_blocks_start() {
    for runtime in [StubRuntime::Missing, StubRuntime::Outdated] {
        let panel = PanelBuilder::new(SERVER_SCRIPT).runtime(runtime).build();
        panel.create("survival").await;

        let err = panel.supervisor.start("survival").await.unwrap_err();
        assert!(matches!(err, PanelError::MissingDependency(_)), "got {err:?}");
        assert_eq!(panel.recorded_status("survival"), Some(ServerStatus::Stopped));
        assert_eq!(panel.pid("survival"), None);
    }
}

#[tokio::test]
async fn test_failed_runtime_probe_does_not_block_start() {
    let panel = PanelBuilder::new(SERVER_SCRIPT)
        .runtime(StubRuntime::ProbeFails)
        .build();
    panel.create("survival").await;
    panel.supervisor.start("survival").await.unwrap();
    assert!(panel.pid("survival").is_some());
    panel.supervisor.stop("survival").await.unwrap();
}

#[tokio::test]
async fn test_missing_artifact_is_fetched_once() {
    let panel = TestPanel::new(SERVER_SCRIPT);
    let config = panel.create("survival").await;
    let jar = config.working_dir().join(&config.jar);
    assert!(!jar.exists());

    panel.supervisor.start("survival").await.unwrap();
    assert_eq!(panel.fetcher.calls(), 1);
    assert_eq!(panel.fetcher.last_version().as_deref(), Some("1.20.1"));
    assert!(jar.is_file());
    panel.supervisor.stop("survival").await.unwrap();

    panel.supervisor.start("survival").await.unwrap();
    assert_eq!(panel.fetcher.calls(), 1);
    panel.supervisor.stop("survival").await.unwrap();
}

#[tokio::test]
async fn test_failed_fetch_is_artifact_unavailable() {
    let panel = PanelBuilder::new(SERVER_SCRIPT).fetch_fails().build();
    panel.create("survival").await;

    let err = panel.supervisor.start("survival").await.unwrap_err();
    assert!(matches!(err, PanelError::ArtifactUnavailable(_)), "got {err:?}");
    assert_eq!(panel.fetcher.calls(), 1);
    assert_eq!(panel.recorded_status("survival"), Some(ServerStatus::Stopped));
}

#[tokio::test]
async fn test_spawn_failure_is_launch_failure() {
    let panel = PanelBuilder::new(SERVER_SCRIPT).broken_launcher().build();
    panel.create("survival").await;

    let err = panel.supervisor.start("survival").await.unwrap_err();
    assert!(matches!(err, PanelError::LaunchFailure(_)), "got {err:?}");
    assert_eq!(panel.recorded_status("survival"), Some(ServerStatus::Stopped));
    assert_eq!(panel.store.get("survival").unwrap().pid, None);
}

#[tokio::test]
async fn test_missing_working_directory_is_launch_failure() {
    let panel = TestPanel::new(SERVER_SCRIPT);
    let config = panel.create("survival").await;
    fs::remove_dir_all(config.working_dir()).unwrap();

    let err = panel.supervisor.start("survival").await.unwrap_err();
    assert!(matches!(err, PanelError::LaunchFailure(_)), "got {err:?}");
}

#[tokio::test]
async fn test_create_scaffolds_and_persists() {
    let panel = TestPanel::new(SERVER_SCRIPT);
    let params = NewServer {
        version: "1.21.4".to_string(),
        min_ram: "1g".to_string(),
        max_ram: "2G".to_string(),
        port: 25570,
        ..NewServer::default()
    };
    let config = panel.supervisor.create("creative", params).await.unwrap();

    assert_eq!(config.jar, "paper-1.21.4.jar");
    assert_eq!(config.min_ram, "1G");
    let dir = config.working_dir();
    assert_eq!(dir, panel.dir.path().join("servers").join("creative"));
    for entry in ["plugins", "logs"] {
        assert!(dir.join(entry).is_dir(), "{entry} missing");
    }
    for file in ["start.sh", "server.properties", "eula.txt"] {
        assert!(dir.join(file).is_file(), "{file} missing");
    }
    assert!(
        fs::read_to_string(dir.join("server.properties"))
            .unwrap()
            .contains("server-port=25570")
    );

    let stored = panel.store.get("creative").unwrap();
    assert_eq!(stored, config);
}

#[tokio::test]
async fn test_create_rejects_duplicates_and_bad_input() {
    let panel = TestPanel::new(SERVER_SCRIPT);
    panel.create("survival").await;

    assert_eq!(
        panel
            .supervisor
            .create("survival", NewServer::default())
            .await
            .unwrap_err(),
        PanelError::DuplicateName("survival".to_string())
    );
    assert!(matches!(
        panel.supervisor.create("../escape", NewServer::default()).await,
        Err(PanelError::InvalidName(_))
    ));
    let bad_ram = NewServer {
        max_ram: "lots".to_string(),
        ..NewServer::default()
    };
    assert!(matches!(
        panel.supervisor.create("other", bad_ram).await,
        Err(PanelError::InvalidConfiguration(_))
    ));
    let bad_port = NewServer {
        port: 0,
        ..NewServer::default()
    };
    assert!(matches!(
        panel.supervisor.create("other", bad_port).await,
        Err(PanelError::InvalidConfiguration(_))
    ));
    assert_eq!(panel.supervisor.names(), vec!["survival".to_string()]);
}

#[tokio::test]
async fn test_restart_spawns_a_new_process() {
    let panel = TestPanel::new(SERVER_SCRIPT);
    panel.create("survival").await;
    panel.supervisor.start("survival").await.unwrap();
    assert!(panel.supervisor.send_command("survival", "say before").await);
    assert!(panel.wait_for_console("survival", "say before", DEFAULT_TIMEOUT).await);
    let first = panel.pid("survival").unwrap();

    panel.supervisor.restart("survival").await.unwrap();
    let second = panel.pid("survival").unwrap();
    assert_ne!(first, second);
    assert!(!pid_is_alive(first));
    assert_eq!(panel.recorded_status("survival"), Some(ServerStatus::Starting));
    // The console belongs to the new run.
    assert!(
        !panel
            .supervisor
            .get_console_output("survival", 100)
            .iter()
            .any(|l| l.contains("say before"))
    );

    panel.supervisor.stop("survival").await.unwrap();
}

#[tokio::test]
async fn test_delete_stops_and_keeps_files() {
    let panel = TestPanel::new(SERVER_SCRIPT);
    let config = panel.create("survival").await;
    panel.supervisor.start("survival").await.unwrap();
    let pid = panel.pid("survival").unwrap();

    panel.supervisor.delete("survival").await.unwrap();

    assert!(panel.supervisor.names().is_empty());
    assert!(panel.store.get("survival").is_none());
    assert!(!pid_is_alive(pid));
    assert!(config.working_dir().join("server.properties").is_file());
    assert!(matches!(
        panel.supervisor.delete("survival").await,
        Err(PanelError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_unknown_fields_survive_runtime_updates() {
    let panel = TestPanel::new(SERVER_SCRIPT);
    panel.create("survival").await;

    let mut doc: serde_json::Value =
        serde_json::from_slice(&fs::read(panel.store.path()).unwrap()).unwrap();
    doc["survival"]["tunnel"] = serde_json::json!({"enabled": true, "port": 4000});
    fs::write(panel.store.path(), serde_json::to_vec(&doc).unwrap()).unwrap();

    panel.supervisor.start("survival").await.unwrap();
    panel.supervisor.stop("survival").await.unwrap();

    let stored = panel.store.get("survival").unwrap();
    assert_eq!(stored.extra["tunnel"]["port"], 4000);
}

#[tokio::test]
async fn test_list_and_stats() {
    let panel = TestPanel::new(SERVER_SCRIPT);
    panel.create("b-server").await;
    panel.create("a-server").await;
    panel.supervisor.start("b-server").await.unwrap();

    let list = panel.supervisor.list();
    let names: Vec<_> = list.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["a-server", "b-server"]);
    assert_eq!(list[0].status, ServerStatus::Stopped);
    assert_eq!(list[1].status, ServerStatus::Starting);

    let stats = panel.supervisor.get_stats("b-server").await.unwrap();
    assert!(stats.memory_bytes > 0);
    assert!(panel.supervisor.get_stats("a-server").await.is_none());
    assert!(panel.supervisor.get_stats("ghost").await.is_none());

    panel.supervisor.stop_all().await;
    assert_eq!(panel.recorded_status("b-server"), Some(ServerStatus::Stopped));
}

#[tokio::test]
async fn test_stalled_stdin_does_not_block_stop_or_sweep() {
    let grace = Duration::from_secs(1);
    let panel = PanelBuilder::new(DEAF_SCRIPT).stop_grace(grace).build();
    panel.create("survival").await;
    panel.supervisor.start("survival").await.unwrap();
    assert!(
        panel
            .wait_for_status("survival", ServerStatus::Running, DEFAULT_TIMEOUT)
            .await
    );
    let pid = panel.pid("survival").unwrap();
    let poller = panel.supervisor.liveness_poller(Duration::from_secs(60));

    // Far more than the pipe buffer holds.
    let flood = "x".repeat(200 * 1024);
    let (sent, (swept, stopped)) = tokio::join!(
        panel.supervisor.send_command("survival", &flood),
        async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let swept = tokio::time::timeout(Duration::from_secs(3), poller.poll_once())
                .await
                .is_ok();
            let stopped =
                tokio::time::timeout(Duration::from_secs(15), panel.supervisor.stop("survival"))
                    .await;
            (swept, stopped)
        }
    );

    assert!(!sent);
    assert!(swept, "sweep waited on a stalled stdin write");
    let outcome = stopped.expect("stop waited on a stalled stdin write").unwrap();
    assert_eq!(outcome, StopOutcome::Forced);
    assert_eq!(panel.recorded_status("survival"), Some(ServerStatus::Stopped));
    assert!(!pid_is_alive(pid));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_of_one_name_register_once() {
    let TestPanel {
        dir: _dir,
        store,
        supervisor,
        ..
    } = TestPanel::new(SERVER_SCRIPT);
    let supervisor = Arc::new(supervisor);

    for trial in 0..10 {
        let name = format!("dup-{trial}");
        let tasks: Vec<_> = (0..2u16)
            .map(|offset| {
                let supervisor = supervisor.clone();
                let name = name.clone();
                tokio::spawn(async move {
                    let params = NewServer {
                        port: 25565 + offset,
                        ..NewServer::default()
                    };
                    supervisor.create(&name, params).await
                })
            })
            .collect();

        let mut created = Vec::new();
        for task in tasks {
            match task.await.unwrap() {
                Ok(config) => created.push(config),
                Err(PanelError::DuplicateName(dup)) => assert_eq!(dup, name),
                Err(e) => panic!("unexpected create error: {e}"),
            }
        }
        assert_eq!(created.len(), 1, "trial {trial}");
        assert_eq!(store.get(&name).unwrap().port, created[0].port);
    }
    assert_eq!(supervisor.names().len(), 10);
}

#[tokio::test]
async fn test_abandoned_stop_is_reconciled() {
    let panel = PanelBuilder::new(STUBBORN_SCRIPT)
        .stop_grace(Duration::from_secs(30))
        .build();
    panel.create("survival").await;
    panel.supervisor.start("survival").await.unwrap();
    assert!(
        panel
            .wait_for_status("survival", ServerStatus::Running, DEFAULT_TIMEOUT)
            .await
    );
    let pid = panel.pid("survival").unwrap();

    // Give up on the stop while it waits out the grace period.
    let abandoned =
        tokio::time::timeout(Duration::from_millis(500), panel.supervisor.stop("survival")).await;
    assert!(abandoned.is_err());
    assert_eq!(panel.recorded_status("survival"), Some(ServerStatus::Stopping));
    assert!(matches!(
        panel.supervisor.start("survival").await,
        Err(PanelError::LaunchFailure(_))
    ));

    kill_pid(pid, Signal::SIGKILL);
    assert!(wait_for(DEFAULT_TIMEOUT, || !pid_is_alive(pid)).await);
    assert_eq!(
        panel.supervisor.get_status("survival").await.unwrap(),
        ServerStatus::Stopped
    );
    let stored = panel.store.get("survival").unwrap();
    assert_eq!(stored.status, ServerStatus::Stopped);
    assert_eq!(stored.pid, None);

    panel.launcher.set_script(SERVER_SCRIPT);
    panel.supervisor.start("survival").await.unwrap();
    assert_eq!(
        panel.supervisor.stop("survival").await.unwrap(),
        StopOutcome::Graceful
    );
}
