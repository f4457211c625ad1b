//! End-to-end tests for the filesystem, security wrapper and interpreter.
//!
//! These tests drive the public API the way an embedding application would:
//! - VFS operations over each backend
//! - policy enforcement seen through the shell
//! - configuration-driven shells, including on-disk SQLite

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use vshell::config::SecurityConfig;
use vshell::policy::REASON_READ_ONLY;
use vshell::storage::{MemoryStorageProvider, ProviderArgs};
use vshell::{SecurityPolicy, SecurityProfile, Shell, ShellConfig, VirtualFileSystem};

fn limited_fs(max_file_size: u64) -> VirtualFileSystem {
    VirtualFileSystem::with_security(
        Arc::new(MemoryStorageProvider::new()),
        SecurityPolicy::unrestricted().with_max_file_size(max_file_size),
    )
    .unwrap()
}

// =============================================================================
// Filesystem scenarios
// =============================================================================

mod filesystem {
    use super::*;

    #[test]
    fn test_mkdir_write_ls() {
        let fs = VirtualFileSystem::new().unwrap();
        assert!(fs.mkdir("/a").unwrap());
        assert!(!fs.mkdir("/a").unwrap());
        assert!(fs.write_file("/a/f.txt", "hi").unwrap());
        assert_eq!(fs.ls(Some("/a")).unwrap(), vec!["f.txt"]);
        assert_eq!(fs.read_file("/a/f.txt").unwrap().as_deref(), Some("hi"));
    }

    #[test]
    fn test_oversized_write_leaves_no_trace() {
        let fs = limited_fs(500);
        let before = fs.security_violations().len();
        assert!(!fs.write_file("/big.txt", &"x".repeat(1000)).unwrap());
        assert_eq!(fs.security_violations().len(), before + 1);
        assert_eq!(fs.read_file("/big.txt").unwrap(), None);
        assert!(!fs.exists("/big.txt").unwrap());
    }

    #[test]
    fn test_quota_boundary() {
        let fs = limited_fs(8);
        assert!(!fs.write_file("/tmp/over", "123456789").unwrap());
        assert_eq!(fs.security_violations().len(), 1);
        assert!(fs.write_file("/tmp/exact", "12345678").unwrap());
        assert_eq!(fs.security_violations().len(), 1);
    }

    #[test]
    fn test_cp_then_mv_into_directory() {
        let fs = VirtualFileSystem::new().unwrap();
        fs.mkdir("/a").unwrap();
        fs.mkdir("/b").unwrap();
        fs.write_file("/a/f.txt", "payload").unwrap();

        assert!(fs.cp("/a/f.txt", "/b").unwrap());
        assert_eq!(fs.read_file("/b/f.txt").unwrap().as_deref(), Some("payload"));
        assert!(fs.exists("/a/f.txt").unwrap());

        fs.rm("/b/f.txt").unwrap();
        assert!(fs.mv("/a/f.txt", "/b").unwrap());
        assert_eq!(fs.read_file("/b/f.txt").unwrap().as_deref(), Some("payload"));
        assert!(!fs.exists("/a/f.txt").unwrap());
    }

    #[test]
    fn test_non_empty_directory_survives_until_emptied() {
        let fs = VirtualFileSystem::new().unwrap();
        fs.mkdir_all("/d/e").unwrap();
        assert!(!fs.rm("/d").unwrap());
        assert!(!fs.rmdir("/d").unwrap());
        assert!(fs.rmdir("/d/e").unwrap());
        assert!(fs.rmdir("/d").unwrap());
        assert!(!fs.rm("/").unwrap());
    }

    #[test]
    fn test_resolve_path_is_idempotent() {
        let mut fs = VirtualFileSystem::new().unwrap();
        fs.mkdir_all("/home/user/src").unwrap();
        assert!(fs.cd("/home/user").unwrap());
        for input in ["src/../src/./main.rs", "..", "../../../..", "/tmp//x/", ".", ""] {
            let once = fs.resolve_path(input);
            assert_eq!(fs.resolve_path(&once), once, "input {:?}", input);
        }
        assert_eq!(fs.resolve_path("../../../.."), "/");
    }

    #[test]
    fn test_read_only_policy_keeps_reads() {
        let mut fs = VirtualFileSystem::new().unwrap();
        fs.write_file("/etc/motd", "welcome").unwrap();
        fs.apply_security(SecurityProfile::ReadOnly.policy()).unwrap();

        assert!(fs.is_read_only());
        assert!(!fs.write_file("/etc/motd", "changed").unwrap());
        assert!(!fs.mkdir("/new").unwrap());
        assert!(!fs.rm("/etc/motd").unwrap());
        assert_eq!(fs.read_file("/etc/motd").unwrap().as_deref(), Some("welcome"));
        assert!(fs.get_node_info("/etc/motd").unwrap().is_some());
        assert!(
            fs.security_violations()
                .iter()
                .all(|v| v.reason == REASON_READ_ONLY)
        );
    }
}

// =============================================================================
// Interpreter sessions
// =============================================================================

mod session {
    use super::*;

    #[test]
    fn test_basic_session() {
        let mut shell = Shell::new().unwrap();
        assert_eq!(shell.execute("mkdir -p /home/user/notes"), "");
        assert_eq!(shell.execute("cd /home/user/notes"), "");
        assert_eq!(shell.execute("pwd"), "/home/user/notes");
        assert_eq!(shell.get_env("PWD"), Some("/home/user/notes"));

        assert_eq!(shell.execute("echo remember the milk > todo"), "");
        assert_eq!(shell.execute("echo and eggs >> todo"), "");
        assert_eq!(
            shell.execute("cat /home/user/notes/todo"),
            "remember the milk\nand eggs\n"
        );
        assert_eq!(shell.execute("ls"), "todo");

        assert_eq!(shell.execute("cp todo ../todo.bak"), "");
        assert_eq!(shell.execute("rm todo"), "");
        assert_eq!(shell.execute("ls /home/user"), "notes todo.bak");
        assert_eq!(shell.execute("frobnicate"), "frobnicate: command not found");
        assert_eq!(shell.history().len(), 11);
    }

    #[test]
    fn test_errors_are_unix_style_lines() {
        let mut shell = Shell::new().unwrap();
        shell.execute("mkdir /a");
        assert_eq!(
            shell.execute("mkdir /a"),
            "mkdir: cannot create directory '/a'"
        );
        assert_eq!(
            shell.execute("cat /missing"),
            "cat: /missing: No such file or directory"
        );
        assert_eq!(
            shell.execute("cd /nowhere"),
            "cd: /nowhere: No such file or directory"
        );
        assert_eq!(shell.execute("pwd"), "/");
    }

    #[test]
    fn test_exit_stops_the_loop() {
        let mut shell = Shell::new().unwrap();
        assert!(shell.is_running());
        assert_eq!(shell.execute("exit"), "Goodbye!");
        assert!(!shell.is_running());
    }

    #[test]
    fn test_policy_rejection_through_shell() {
        let config = ShellConfig {
            security: Some(SecurityConfig {
                profile: SecurityProfile::Strict,
                ..SecurityConfig::default()
            }),
            ..ShellConfig::default()
        };
        let mut shell = Shell::from_config(&config).unwrap();
        assert_eq!(shell.execute("pwd"), "/home/user");
        assert_eq!(shell.execute("touch ok.txt"), "");
        assert_eq!(shell.execute("touch /etc/evil"), "touch: cannot touch '/etc/evil'");
        assert_eq!(shell.execute("touch .hidden"), "touch: cannot touch '.hidden'");

        let violations = shell.fs().security_violations();
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].path, "/etc/evil");
        assert_eq!(violations[1].path, "/home/user/.hidden");
    }

    #[test]
    fn test_read_only_shell_starts_at_root() {
        let config = ShellConfig::from_yaml_str("security:\n  profile: readonly\n").unwrap();
        let mut shell = Shell::from_config(&config).unwrap();
        assert!(shell.fs().is_read_only());
        assert_eq!(shell.execute("pwd"), "/");
        assert_eq!(shell.execute("mkdir /tmp/x"), "mkdir: cannot create directory '/tmp/x'");
        assert_eq!(shell.execute("ls /"), "bin etc home tmp var");
    }

    #[test]
    fn test_sqlite_session_persists_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("vshell.db");
        let mut args = ProviderArgs::new();
        args.insert(
            "db_path".to_string(),
            db_path.to_string_lossy().into_owned().into(),
        );
        let mut config = ShellConfig::default();
        config.provider.name = "sqlite".to_string();
        config.provider.args = args;

        {
            let mut shell = Shell::from_config(&config).unwrap();
            assert_eq!(shell.fs().provider_name(), "sqlite");
            assert_eq!(shell.execute("echo persisted > keep.txt"), "");
        }

        let mut shell = Shell::from_config(&config).unwrap();
        assert_eq!(shell.execute("cat keep.txt"), "persisted\n");
    }

    #[test]
    fn test_unknown_provider_is_a_construction_error() {
        let mut config = ShellConfig::default();
        config.provider.name = "floppy".to_string();
        let err = Shell::from_config(&config).unwrap_err();
        assert_eq!(err.to_string(), "unknown storage provider: floppy");
    }
}
