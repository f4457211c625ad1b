//! Behaviour every storage backend must share.
//!
//! `provider_conformance_tests!(expr)` expands to a set of `#[test]`s that
//! build a fresh, initialized provider from `expr` each time.

macro_rules! provider_conformance_tests {
    ($make:expr) => {
        mod conformance {
            #[allow(unused_imports)]
            use super::*;
            use $crate::storage::{NodeInfo, StorageProvider};

            #[test]
            fn root_exists_after_initialize() {
                let provider = $make;
                let root = provider.get_node_info("/").unwrap().expect("root");
                assert_eq!(root.name, "");
                assert!(root.is_dir);
            }

            #[test]
            fn initialize_is_idempotent() {
                let provider = $make;
                assert!(provider.initialize().unwrap());
                assert!(provider.initialize().unwrap());
                assert!(provider.get_node_info("/").unwrap().is_some());
            }

            #[test]
            fn create_file_under_directory() {
                let provider = $make;
                assert!(provider.create_node(&NodeInfo::directory("home", "/")).unwrap());
                assert!(provider.create_node(&NodeInfo::file("test.txt", "/home")).unwrap());

                let created = provider
                    .get_node_info("/home/test.txt")
                    .unwrap()
                    .expect("created");
                assert_eq!(created.name, "test.txt");
                assert_eq!(created.parent_path, "/home");
                assert!(!created.is_dir);
                assert_eq!(provider.read_file("/home/test.txt").unwrap().as_deref(), Some(""));
            }

            #[test]
            fn create_fails_without_parent() {
                let provider = $make;
                let orphan = NodeInfo::file("orphan", "/nonexistent");
                assert!(!provider.create_node(&orphan).unwrap());
            }

            #[test]
            fn create_fails_under_file() {
                let provider = $make;
                assert!(provider.create_node(&NodeInfo::file("f", "/")).unwrap());
                assert!(!provider.create_node(&NodeInfo::file("g", "/f")).unwrap());
            }

            #[test]
            fn create_fails_when_present() {
                let provider = $make;
                assert!(provider.create_node(&NodeInfo::directory("a", "/")).unwrap());
                assert!(!provider.create_node(&NodeInfo::directory("a", "/")).unwrap());
                assert!(!provider.create_node(&NodeInfo::file("a", "/")).unwrap());
            }

            #[test]
            fn list_directory_returns_sorted_children() {
                let provider = $make;
                provider.create_node(&NodeInfo::directory("docs", "/")).unwrap();
                provider.create_node(&NodeInfo::file("b.txt", "/docs")).unwrap();
                provider.create_node(&NodeInfo::file("a.txt", "/docs")).unwrap();
                provider.create_node(&NodeInfo::directory("sub", "/docs")).unwrap();
                provider.create_node(&NodeInfo::file("deep.txt", "/docs/sub")).unwrap();

                assert_eq!(
                    provider.list_directory("/docs").unwrap(),
                    vec!["a.txt".to_string(), "b.txt".to_string(), "sub".to_string()]
                );
                assert!(provider.list_directory("/docs/a.txt").unwrap().is_empty());
                assert!(provider.list_directory("/missing").unwrap().is_empty());
            }

            #[test]
            fn write_then_read() {
                let provider = $make;
                provider.create_node(&NodeInfo::directory("logs", "/")).unwrap();
                provider.create_node(&NodeInfo::file("log.txt", "/logs")).unwrap();

                assert!(provider.write_file("/logs/log.txt", "This is a test log.").unwrap());
                assert_eq!(
                    provider.read_file("/logs/log.txt").unwrap().as_deref(),
                    Some("This is a test log.")
                );
                let info = provider.get_node_info("/logs/log.txt").unwrap().expect("info");
                assert_eq!(info.size, Some(19));
            }

            #[test]
            fn write_requires_existing_file() {
                let provider = $make;
                provider.create_node(&NodeInfo::directory("dir", "/")).unwrap();
                assert!(!provider.write_file("/dir", "nope").unwrap());
                assert!(!provider.write_file("/absent.txt", "nope").unwrap());
                assert!(provider.read_file("/dir").unwrap().is_none());
                assert!(provider.read_file("/absent.txt").unwrap().is_none());
            }

            #[test]
            fn delete_file() {
                let provider = $make;
                provider.create_node(&NodeInfo::directory("temp", "/")).unwrap();
                provider.create_node(&NodeInfo::file("delete_me.txt", "/temp")).unwrap();

                assert!(provider.delete_node("/temp/delete_me.txt").unwrap());
                assert!(provider.get_node_info("/temp/delete_me.txt").unwrap().is_none());
                assert!(!provider.delete_node("/temp/delete_me.txt").unwrap());
            }

            #[test]
            fn delete_refuses_non_empty_directory() {
                let provider = $make;
                provider.create_node(&NodeInfo::directory("nonempty", "/")).unwrap();
                provider.create_node(&NodeInfo::file("child.txt", "/nonempty")).unwrap();

                assert!(!provider.delete_node("/nonempty").unwrap());
                assert!(provider.delete_node("/nonempty/child.txt").unwrap());
                assert!(provider.delete_node("/nonempty").unwrap());
            }

            #[test]
            fn delete_refuses_root() {
                let provider = $make;
                assert!(!provider.delete_node("/").unwrap());
                assert!(provider.get_node_info("/").unwrap().is_some());
            }

            #[test]
            fn touch_updates_modified_time_only() {
                let provider = $make;
                provider.create_node(&NodeInfo::file("t.txt", "/")).unwrap();
                provider.write_file("/t.txt", "keep").unwrap();
                let before = provider.get_node_info("/t.txt").unwrap().expect("info");

                std::thread::sleep(std::time::Duration::from_millis(5));
                assert!(provider.touch("/t.txt").unwrap());

                let after = provider.get_node_info("/t.txt").unwrap().expect("info");
                assert!(after.modified_at > before.modified_at);
                assert_eq!(provider.read_file("/t.txt").unwrap().as_deref(), Some("keep"));
                assert!(!provider.touch("/missing").unwrap());
            }

            #[test]
            fn storage_stats_count_nodes_and_bytes() {
                let provider = $make;
                provider.create_node(&NodeInfo::directory("data", "/")).unwrap();
                provider.create_node(&NodeInfo::file("file1.txt", "/")).unwrap();
                provider.write_file("/file1.txt", "Hello World").unwrap();

                let stats = provider.get_storage_stats().unwrap();
                assert_eq!(stats.provider, provider.name());
                assert_eq!(stats.file_count, 1);
                assert_eq!(stats.directory_count, 2);
                assert_eq!(stats.total_size_bytes, 11);
            }

            #[test]
            fn cleanup_purges_tmp() {
                let provider = $make;
                provider.create_node(&NodeInfo::directory("tmp", "/")).unwrap();
                provider.create_node(&NodeInfo::file("junk.txt", "/tmp")).unwrap();
                provider.write_file("/tmp/junk.txt", "temporary data").unwrap();
                provider.create_node(&NodeInfo::directory("nested", "/tmp")).unwrap();
                provider.create_node(&NodeInfo::file("more.txt", "/tmp/nested")).unwrap();
                provider.write_file("/tmp/nested/more.txt", "abc").unwrap();
                provider.create_node(&NodeInfo::file("keep.txt", "/")).unwrap();

                let result = provider.cleanup().unwrap();
                assert_eq!(result.files_removed, 2);
                assert_eq!(result.bytes_freed, 17);

                assert!(provider.get_node_info("/tmp/junk.txt").unwrap().is_none());
                assert!(provider.get_node_info("/tmp/nested").unwrap().is_none());
                assert!(provider.get_node_info("/tmp").unwrap().is_some());
                assert!(provider.get_node_info("/keep.txt").unwrap().is_some());
            }

            #[test]
            fn paths_are_normalized() {
                let provider = $make;
                provider.create_node(&NodeInfo::directory("a", "/")).unwrap();
                provider.create_node(&NodeInfo::file("f", "/a")).unwrap();
                assert!(provider.get_node_info("/a/./f").unwrap().is_some());
                assert!(provider.get_node_info("/a/").unwrap().is_some());
                assert!(provider.write_file("//a//f", "x").unwrap());
            }
        }
    };
}
